//! The fetch/decode/execute engine for a single RV32IM hart.
//!
//! [`Core`] owns the full architectural state (register file, CSR bank,
//! privilege level) plus the bus it fetches and loads/stores through, and
//! advances it one instruction per [`step`](Core::step) call. Nothing here is
//! shared or global; drivers that want several harts construct several cores.

pub mod csr;
mod execute;
mod trap;

pub use trap::{Exception, Interrupt};

use log::trace;
use thiserror::Error;

use crate::bus::{Bus, Width};
use crate::registers::Registers;
use crate::PrivilegeLevel;
use csr::Csr;
use execute::{Executor, Progress};

/// Construction-time parameters of a core.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// The address the pc starts at, out of reset.
    pub reset_vector: u32,
}

/// A single simulated RV32IM hart.
#[derive(Debug)]
pub struct Core<B: Bus> {
    config: Config,
    registers: Registers,
    csr: Csr,
    privilege: PrivilegeLevel,
    bus: B,
    /// Monotonic count of traps taken, for correlating trace records.
    trap_seq: u64,
}

/// The result of successfully advancing the core by one instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepOutcome {
    /// An instruction retired and the pc moved to `next_pc`.
    Retired {
        pc: u32,
        next_pc: u32,
        /// The differential check must skip this instruction. Set exactly
        /// when the instruction diverted into the monitor instead of
        /// executing architecturally.
        difftest_skip: bool,
    },
    /// The guest executed `ebreak`; `code` is the value of `a0`, reported as
    /// the guest's exit status. The pc stays at the breakpoint.
    Halted { pc: u32, code: u32 },
}

/// Fatal conditions that end a run. The core is left intact for post-mortem
/// inspection, but stepping further is not meaningful.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CoreError {
    #[error("illegal instruction {instruction:#010X} at pc {pc:#010X}")]
    IllegalInstruction { pc: u32, instruction: u32 },
    #[error("trap raised at pc {pc:#010X} before software configured mtvec")]
    TrapVectorNotConfigured { pc: u32 },
}

impl<B: Bus> Core<B> {
    /// Creates a core out of reset, connected to `bus`.
    pub fn new(config: Config, bus: B) -> Self {
        let registers = Registers::new(config.reset_vector);
        Self {
            config,
            registers,
            csr: Csr::new(),
            privilege: PrivilegeLevel::Machine,
            bus,
            trap_seq: 0,
        }
    }

    /// Forces the core back to its reset state.
    ///
    /// The bus is left alone; memory contents surviving reset is the
    /// driver's choice to make.
    pub fn reset(&mut self) {
        self.registers = Registers::new(self.config.reset_vector);
        self.csr.reset();
        self.privilege = PrivilegeLevel::Machine;
        self.trap_seq = 0;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn csr(&self) -> &Csr {
        &self.csr
    }

    pub fn csr_mut(&mut self) -> &mut Csr {
        &mut self.csr
    }

    /// The current privilege level of the hart.
    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    /// Overrides the current privilege level.
    ///
    /// Normal execution only changes level through trap entry and return;
    /// this is for test harnesses and loaders that start guests below
    /// machine mode.
    pub fn set_privilege(&mut self, level: PrivilegeLevel) {
        self.privilege = level;
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Fetches, decodes, and executes a single instruction.
    ///
    /// On retirement `x0` is forced back to zero, the cycle counter is
    /// bumped, and the next pc is committed. Errors are fatal; the state the
    /// core had when the error was detected stays readable.
    pub fn step(&mut self) -> Result<StepOutcome, CoreError> {
        // Interrupts would preempt the fetch here; no sources are wired up
        // to mip yet, so delivery is not implemented.
        if let Some(interrupt) = self.pending_interrupt() {
            trace!(target: "etrace", cause = interrupt as u32; "pending interrupt left undelivered");
        }
        let pc = self.registers.pc();
        let word = self.bus.read(pc, Width::Word) as u32;
        let (progress, difftest_skip) = Executor { core: self }.execute(pc, word)?;
        self.registers.reset_x0();
        self.csr.increment_mcycle();
        let next_pc = match progress {
            Progress::Step => pc.wrapping_add(4),
            Progress::Jump(target) => target,
            Progress::Halt(code) => return Ok(StepOutcome::Halted { pc, code }),
        };
        *self.registers.pc_mut() = next_pc;
        Ok(StepOutcome::Retired {
            pc,
            next_pc,
            difftest_skip,
        })
    }

    /// Captures the architectural state the differential oracle compares.
    pub fn snapshot(&self) -> crate::difftest::Snapshot {
        crate::difftest::Snapshot {
            x: std::array::from_fn(|i| {
                self.registers.x(crate::registers::Specifier::from_u5(i as u8))
            }),
            pc: self.registers.pc(),
            mstatus: self.csr.status().read(),
            mtvec: self.csr.mtvec().read(),
            mepc: self.csr.mepc(),
            mcause: self.csr.mcause().read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Ram;
    use crate::registers::Specifier;

    fn core_with_program(words: &[u32]) -> Core<Ram> {
        let mut ram = Ram::new(0x8000_0000, 0x1000).unwrap();
        for (i, &word) in words.iter().enumerate() {
            ram.write(0x8000_0000 + 4 * i as u32, Width::Word, word as u64);
        }
        Core::new(
            Config {
                reset_vector: 0x8000_0000,
            },
            ram,
        )
    }

    #[test]
    fn test_step_retires_and_advances() {
        // addi x1, x0, 5
        let mut core = core_with_program(&[0x0050_0093]);
        let outcome = core.step().unwrap();
        assert_eq!(
            StepOutcome::Retired {
                pc: 0x8000_0000,
                next_pc: 0x8000_0004,
                difftest_skip: false,
            },
            outcome
        );
        assert_eq!(5, core.registers().x(Specifier::from_u5(1)));
        assert_eq!(1, core.csr().mcycle());
    }

    #[test]
    fn test_write_to_x0_stays_zero_after_step() {
        // addi x0, x0, 5
        let mut core = core_with_program(&[0x0050_0013]);
        core.step().unwrap();
        assert_eq!(0, core.registers().x(Specifier::X0));
    }

    #[test]
    fn test_halt_keeps_pc() {
        // ebreak
        let mut core = core_with_program(&[0x0010_0073]);
        core.registers_mut().set_x(Specifier::A0, 7);
        let outcome = core.step().unwrap();
        assert_eq!(
            StepOutcome::Halted {
                pc: 0x8000_0000,
                code: 7,
            },
            outcome
        );
        assert_eq!(0x8000_0000, core.registers().pc());
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut core = core_with_program(&[0x0050_0093]);
        core.step().unwrap();
        core.reset();
        assert_eq!(0x8000_0000, core.registers().pc());
        assert_eq!(0, core.registers().x(Specifier::from_u5(1)));
        assert_eq!(0, core.csr().mcycle());
        assert_eq!(PrivilegeLevel::Machine, core.privilege());
    }

    #[test]
    fn test_fetch_of_garbage_is_illegal_instruction() {
        let mut core = core_with_program(&[0xFFFF_FFFF]);
        assert_eq!(
            Err(CoreError::IllegalInstruction {
                pc: 0x8000_0000,
                instruction: 0xFFFF_FFFF,
            }),
            core.step()
        );
    }
}
