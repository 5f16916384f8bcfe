//! Synchronous trap entry and return for machine mode.
//!
//! All traps are taken in M-mode with direct vectoring: the pc is redirected
//! to the mtvec base address, and `mret` restores the interrupted context
//! from mstatus/mepc.

use log::trace;

use super::{Core, CoreError};
use crate::bus::Bus;
use crate::registers::Specifier;
use crate::{PrivilegeLevel, RawPrivilegeLevel};

/// Synchronous exception causes, as recorded in mcause.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    IllegalInstruction,
    Breakpoint,
    /// An `ecall` executed at the given privilege level. The cause code
    /// encodes the originating level, so a handler can tell system calls from
    /// user code apart from machine-level environment calls.
    EnvironmentCall(PrivilegeLevel),
}

impl Exception {
    /// The mcause exception code (interrupt bit clear).
    pub fn code(self) -> u32 {
        match self {
            Self::IllegalInstruction => 2,
            Self::Breakpoint => 3,
            Self::EnvironmentCall(PrivilegeLevel::User) => 8,
            Self::EnvironmentCall(PrivilegeLevel::Supervisor) => 9,
            Self::EnvironmentCall(PrivilegeLevel::Machine) => 11,
        }
    }
}

/// Machine-level interrupt causes, by mip/mie bit position.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Interrupt {
    MachineSoftware = 3,
    MachineTimer = 7,
    MachineExternal = 11,
}

impl<B: Bus> Core<B> {
    /// Enters a trap handler for `exception`, raised at `pc`.
    ///
    /// Performs the full M-mode trap entry sequence: mepc and mcause record
    /// where and why, the interrupt-enable stack in mstatus is pushed (MPIE
    /// takes MIE's value, MIE clears), MPP records the interrupted privilege
    /// level, and the hart enters M-mode. Returns the handler address.
    ///
    /// Taking a trap before software has programmed mtvec would send the pc
    /// to address zero and almost certainly run the hart into garbage, so
    /// that case is reported as a fatal [`CoreError`] instead.
    pub(super) fn raise_exception(
        &mut self,
        pc: u32,
        exception: Exception,
    ) -> Result<u32, CoreError> {
        if !self.csr.mtvec().is_configured() {
            return Err(CoreError::TrapVectorNotConfigured { pc });
        }
        self.trap_seq += 1;
        // a7 carries the syscall number under the common calling convention;
        // it does not exist on the 16-register file.
        let a7 = Specifier::new(17).map_or(0, |specifier| self.registers.x(specifier));
        trace!(
            target: "etrace",
            seq = self.trap_seq,
            cause = exception.code(),
            pc,
            level = self.privilege.to_string(),
            mstatus = self.csr.status().read(),
            a7;
            "taking trap"
        );
        self.csr.set_mepc(pc);
        self.csr.mcause_mut().set_exception_code(exception.code());
        let interrupted_level = self.privilege;
        let status = self.csr.status_mut();
        let mie = status.mie();
        status.set_mpie(mie);
        status.set_mie(false);
        status.set_mpp(interrupted_level.into());
        self.privilege = PrivilegeLevel::Machine;
        Ok(self.csr.mtvec().base())
    }

    /// Returns from the most recent trap, undoing [`raise_exception`](Self::raise_exception).
    ///
    /// The interrupt-enable stack is popped (MIE takes MPIE's value, MPIE
    /// sets), the hart drops to the privilege level saved in MPP, and MPP
    /// resets to the least-privileged level. Returns the resume address from
    /// mepc.
    pub(super) fn trap_return(&mut self) -> u32 {
        let status = self.csr.status_mut();
        let mpie = status.mpie();
        status.set_mie(mpie);
        status.set_mpie(true);
        let resume_level = status.mpp();
        status.set_mpp(RawPrivilegeLevel::User);
        self.privilege = resume_level;
        trace!(
            target: "etrace",
            seq = self.trap_seq,
            pc = self.csr.mepc(),
            level = resume_level.to_string();
            "returning from trap"
        );
        self.csr.mepc()
    }

    /// Returns the highest-priority interrupt that is pending, enabled, and
    /// deliverable at the current privilege level, if any.
    ///
    /// No interrupt sources are wired up to mip yet, so in practice this is
    /// always `None`; the engine polls it before every fetch so sources can
    /// be added without touching the step loop.
    pub(super) fn pending_interrupt(&self) -> Option<Interrupt> {
        if !self.csr.status().mie() && self.privilege == PrivilegeLevel::Machine {
            return None;
        }
        let pending = self.csr.read(super::csr::specifier::MIP, PrivilegeLevel::Machine);
        let enabled = self.csr.read(super::csr::specifier::MIE, PrivilegeLevel::Machine);
        let deliverable = pending.unwrap_or(0) & enabled.unwrap_or(0);
        [
            Interrupt::MachineExternal,
            Interrupt::MachineSoftware,
            Interrupt::MachineTimer,
        ]
        .into_iter()
        .find(|&interrupt| deliverable & (1 << interrupt as u32) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Ram;
    use crate::core::{Config, Core};

    fn core() -> Core<Ram> {
        Core::new(
            Config {
                reset_vector: 0x8000_0000,
            },
            Ram::new(0x8000_0000, 0x1000).unwrap(),
        )
    }

    #[test]
    fn test_trap_requires_configured_mtvec() {
        let mut core = core();
        let result = core.raise_exception(
            0x8000_0000,
            Exception::EnvironmentCall(PrivilegeLevel::Machine),
        );
        assert_eq!(
            Err(CoreError::TrapVectorNotConfigured { pc: 0x8000_0000 }),
            result
        );
    }

    #[test]
    fn test_trap_entry_sequence() {
        let mut core = core();
        core.csr_mut().mtvec_mut().write(0x8000_0100, !0);
        core.csr_mut().status_mut().set_mie(true);

        let target = core
            .raise_exception(0x8000_0008, Exception::EnvironmentCall(PrivilegeLevel::Machine))
            .unwrap();
        assert_eq!(0x8000_0100, target);
        assert_eq!(0x8000_0008, core.csr().mepc());
        assert_eq!(11, core.csr().mcause().read());
        assert!(!core.csr().status().mie());
        assert!(core.csr().status().mpie());
        assert_eq!(PrivilegeLevel::Machine, core.csr().status().mpp());
        assert_eq!(PrivilegeLevel::Machine, core.privilege());
    }

    #[test]
    fn test_trap_round_trip_restores_context() {
        let mut core = core();
        core.csr_mut().mtvec_mut().write(0x8000_0100, !0);
        core.csr_mut().status_mut().set_mie(true);

        core.raise_exception(0x8000_0008, Exception::Breakpoint)
            .unwrap();
        let resume = core.trap_return();
        assert_eq!(0x8000_0008, resume);
        assert!(core.csr().status().mie());
        assert!(core.csr().status().mpie());
        assert_eq!(PrivilegeLevel::User, core.csr().status().mpp());
        assert_eq!(PrivilegeLevel::Machine, core.privilege());
    }

    #[test]
    fn test_exception_codes() {
        assert_eq!(2, Exception::IllegalInstruction.code());
        assert_eq!(3, Exception::Breakpoint.code());
        assert_eq!(8, Exception::EnvironmentCall(PrivilegeLevel::User).code());
        assert_eq!(
            9,
            Exception::EnvironmentCall(PrivilegeLevel::Supervisor).code()
        );
        assert_eq!(
            11,
            Exception::EnvironmentCall(PrivilegeLevel::Machine).code()
        );
    }

    #[test]
    fn test_no_pending_interrupts_by_default() {
        let core = core();
        assert_eq!(None, core.pending_interrupt());
    }
}
