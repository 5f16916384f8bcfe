//! Differential testing oracle: compares the engine's architectural state
//! against a trusted reference model after every retired instruction.
//!
//! The driver steps both models in lockstep, takes a [`Snapshot`] of each,
//! and asks the [`Oracle`] for a [`Verdict`]. Two categories of divergence
//! are deliberately treated differently:
//!
//! - a pc divergence fails the step, since the two models are about to
//!   execute different instruction streams and every later comparison would
//!   be noise;
//! - register and CSR divergences are surfaced as diagnostics but do not
//!   fail the step on their own, so a long run can report every stale
//!   register instead of stopping at the first.

use log::warn;

use crate::registers::{Specifier, LEN};

/// The architectural state compared per retired instruction: the full
/// register file, the pc, and the trap-related CSRs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Snapshot {
    pub x: [u32; LEN as usize],
    pub pc: u32,
    pub mstatus: u32,
    pub mtvec: u32,
    pub mepc: u32,
    pub mcause: u32,
}

/// The mstatus value that marks the end of machine bootstrap (MPP set to
/// machine mode, everything else clear).
///
/// Reference models differ in the mstatus reset value they report, so CSR
/// comparison only switches on once the model under test reaches this value,
/// and then stays on.
pub const CSR_COMPARE_SENTINEL: u32 = 0x1800;

/// One general-purpose register on which the models disagree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RegMismatch {
    pub specifier: Specifier,
    pub reference: u32,
    pub dut: u32,
}

/// One CSR on which the models disagree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CsrMismatch {
    pub name: &'static str,
    pub reference: u32,
    pub dut: u32,
}

/// The outcome of comparing one retired instruction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Verdict {
    /// The pc at which the comparison was made (the next fetch address).
    pub checked_pc: u32,
    pub pc_matched: bool,
    pub registers: Vec<RegMismatch>,
    pub csrs: Vec<CsrMismatch>,
}

impl Verdict {
    /// Whether the run may continue. Only a pc divergence is fatal;
    /// register and CSR mismatches are diagnostics.
    pub fn passed(&self) -> bool {
        self.pc_matched
    }

    pub fn is_clean(&self) -> bool {
        self.pc_matched && self.registers.is_empty() && self.csrs.is_empty()
    }
}

/// Stateful comparator; the only state it keeps is the CSR-compare latch.
#[derive(Debug, Default)]
pub struct Oracle {
    csr_compare: bool,
}

impl Oracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether CSR comparison has been latched on yet.
    pub fn csr_compare_enabled(&self) -> bool {
        self.csr_compare
    }

    /// Compares the two snapshots taken after the same retired instruction.
    ///
    /// `next_pc` is where the instruction sent the model under test; it tags
    /// the diagnostics so a mismatch can be traced back to the fetch that
    /// exposed it.
    pub fn check(&mut self, reference: &Snapshot, dut: &Snapshot, next_pc: u32) -> Verdict {
        if !self.csr_compare && dut.mstatus == CSR_COMPARE_SENTINEL {
            self.csr_compare = true;
        }

        let pc_matched = reference.pc == dut.pc;
        if !pc_matched {
            warn!(
                target: "difftest",
                pc = next_pc,
                reference = reference.pc,
                dut = dut.pc;
                "pc diverged"
            );
        }

        let mut registers = Vec::new();
        for specifier in Specifier::iter_all() {
            let index = usize::from(specifier);
            if reference.x[index] != dut.x[index] {
                warn!(
                    target: "difftest",
                    pc = next_pc,
                    register = specifier.name(),
                    reference = reference.x[index],
                    dut = dut.x[index];
                    "register diverged"
                );
                registers.push(RegMismatch {
                    specifier,
                    reference: reference.x[index],
                    dut: dut.x[index],
                });
            }
        }

        let mut csrs = Vec::new();
        if self.csr_compare {
            let pairs = [
                ("mstatus", reference.mstatus, dut.mstatus),
                ("mtvec", reference.mtvec, dut.mtvec),
                ("mepc", reference.mepc, dut.mepc),
                ("mcause", reference.mcause, dut.mcause),
            ];
            for (name, reference, dut) in pairs {
                if reference != dut {
                    warn!(
                        target: "difftest",
                        pc = next_pc,
                        csr = name,
                        reference,
                        dut;
                        "csr diverged"
                    );
                    csrs.push(CsrMismatch {
                        name,
                        reference,
                        dut,
                    });
                }
            }
        }

        Verdict {
            checked_pc: next_pc,
            pc_matched,
            registers,
            csrs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            x: [0; LEN as usize],
            pc: 0x8000_0004,
            mstatus: 0,
            mtvec: 0,
            mepc: 0,
            mcause: 0,
        }
    }

    #[test]
    fn test_identical_snapshots_are_clean() {
        let mut oracle = Oracle::new();
        let reference = snapshot();
        let verdict = oracle.check(&reference, &reference.clone(), 0x8000_0004);
        assert!(verdict.passed());
        assert!(verdict.is_clean());
    }

    #[test]
    fn test_pc_divergence_fails() {
        let mut oracle = Oracle::new();
        let reference = snapshot();
        let mut dut = snapshot();
        dut.pc = 0x8000_0008;
        let verdict = oracle.check(&reference, &dut, 0x8000_0008);
        assert!(!verdict.passed());
        assert!(verdict.registers.is_empty());
    }

    #[test]
    fn test_register_divergence_is_diagnostic_only() {
        let mut oracle = Oracle::new();
        let reference = snapshot();
        let mut dut = snapshot();
        dut.x[5] = 0xDEAD_BEEF;
        let verdict = oracle.check(&reference, &dut, 0x8000_0004);
        assert!(verdict.passed());
        assert!(!verdict.is_clean());
        assert_eq!(1, verdict.registers.len());
        assert_eq!(Specifier::from_u5(5), verdict.registers[0].specifier);
        assert_eq!(0, verdict.registers[0].reference);
        assert_eq!(0xDEAD_BEEF, verdict.registers[0].dut);
    }

    #[test]
    fn test_csr_compare_latches_on_sentinel() {
        let mut oracle = Oracle::new();
        let reference = snapshot();
        let mut dut = snapshot();
        // CSRs differ from the start, but the gate is still off.
        dut.mtvec = 0x8000_0100;
        assert!(oracle.check(&reference, &dut, 0x8000_0004).csrs.is_empty());
        assert!(!oracle.csr_compare_enabled());
        // Bootstrap completes; the gate latches on...
        dut.mstatus = CSR_COMPARE_SENTINEL;
        let verdict = oracle.check(&reference, &dut, 0x8000_0008);
        assert!(oracle.csr_compare_enabled());
        assert!(verdict.csrs.iter().any(|m| m.name == "mstatus"));
        assert!(verdict.csrs.iter().any(|m| m.name == "mtvec"));
        // ...and stays on even if mstatus moves off the sentinel.
        dut.mstatus = 0;
        dut.mtvec = 0;
        let verdict = oracle.check(&reference, &dut, 0x8000_000C);
        assert!(oracle.csr_compare_enabled());
        assert!(verdict.csrs.is_empty());
    }
}
