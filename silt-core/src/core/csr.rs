//! The machine-mode Control and Status Register bank.
//!
//! Part of the "Zicsr" extension.

use bitvec::{field::BitField, order::Lsb0, view::BitView};
use thiserror::Error;

use crate::{PrivilegeLevel, RawPrivilegeLevel};

/// Provides the mstatus register.
///
/// > The mstatus register is an MXLEN-bit read/write register [...]. The mstatus register keeps
/// > track of and controls the hart’s current operating state.
///
/// Stored as a single integer word; the named fields are pure mask-and-shift
/// accessors over that word, non-overlapping and total over the bits the
/// engine interprets. Bits outside the named fields are stored verbatim on
/// whole-word writes and carry no semantics here.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Status(u32);

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

impl Status {
    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    /// Reads the register as a whole word.
    pub fn read(&self) -> u32 {
        self.0
    }

    /// Whole-word masked write.
    ///
    /// The MPP field is **WARL**: writing the reserved privilege level keeps
    /// the previous (always legal) value.
    pub fn write(&mut self, value: u32, mask: u32) {
        let old_mpp = self.mpp_raw();
        self.0 = self.0 & !mask | value & mask;
        if self.mpp_raw().is_reserved() {
            self.set_mpp(old_mpp);
        }
    }

    /// Returns `true` if the MIE (M-mode Interrupt Enable) bit is set.
    pub fn mie(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::MIE]
    }

    /// Sets the MIE (M-mode Interrupt Enable) bit to `value`.
    pub fn set_mie(&mut self, value: bool) {
        self.0.view_bits_mut::<Lsb0>().set(idx::MIE, value);
    }

    /// Returns `true` if the MPIE (M-mode Previous Interrupt Enable) bit is set.
    pub fn mpie(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::MPIE]
    }

    /// Sets the MPIE (M-mode Previous Interrupt Enable) bit to `value`.
    pub fn set_mpie(&mut self, value: bool) {
        self.0.view_bits_mut::<Lsb0>().set(idx::MPIE, value);
    }

    /// Returns the privilege level encoded by the MPP (M-mode Previous Privilege level) field.
    ///
    /// The stored value is always a defined level; the WARL write paths never
    /// store the reserved encoding.
    pub fn mpp(&self) -> PrivilegeLevel {
        self.mpp_raw().try_into().unwrap()
    }

    /// Sets the privilege level encoded by the MPP (M-mode Previous Privilege level) field to
    /// `value`.
    ///
    /// The MPP field is **WARL**.
    pub fn set_mpp(&mut self, value: RawPrivilegeLevel) {
        let Ok(value) = PrivilegeLevel::try_from(value) else {
            // MPP is a WARL field, so ignore illegal values.
            return;
        };
        self.0.view_bits_mut::<Lsb0>()[idx::MPP..(idx::MPP + 2)].store_le(value as u8);
    }

    fn mpp_raw(&self) -> RawPrivilegeLevel {
        RawPrivilegeLevel::from_u2(self.0.view_bits::<Lsb0>()[idx::MPP..(idx::MPP + 2)].load_le())
    }
}

/// Bit indices into the mstatus register.
mod idx {
    pub const MIE: usize = 3;
    pub const MPIE: usize = 7;
    pub const MPP: usize = 11;
}

/// Trap Vector Base Address Register (mtvec).
///
/// > The mtvec register is an MXLEN-bit WARL read/write register that holds trap vector
/// > configuration, consisting of a vector base address (BASE) and a vector mode (MODE).
///
/// Only MODE=Direct is modeled: all traps set the pc to the BASE address.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Tvec(u32);

impl Default for Tvec {
    fn default() -> Self {
        Self::new()
    }
}

impl Tvec {
    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        let new_value = self.0 & !mask | value & mask;
        if new_value & 0b11 >= 2 {
            // Reserved MODE.
            // Since this is a WARL register, we can set the register to any legal value here.
            // Choose to preserve the old value, matching the behavior of QEMU's implementation.
        } else {
            self.0 = new_value;
        }
    }

    /// Returns the vector base address (stored in BASE field).
    ///
    /// Note that the address is encoded in the field right shifted by 2 bits.
    pub fn base(&self) -> u32 {
        self.0 & !0b11
    }

    /// Returns `true` once software has programmed a non-zero trap vector.
    ///
    /// Taking a trap while this is `false` is a fatal setup error.
    pub fn is_configured(&self) -> bool {
        self.0 != 0
    }
}

/// Machine Cause Register (mcause).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Cause(u32);

impl Default for Cause {
    fn default() -> Self {
        Self::new()
    }
}

impl Cause {
    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32, mask: u32) {
        self.0 = self.0 & !mask | value & mask;
    }

    /// Records a synchronous exception code (interrupt bit clear).
    pub fn set_exception_code(&mut self, code: u32) {
        self.0 = code;
    }
}

/// Control and Status Registers for a single hart, as a named collection.
///
/// Note that access control is applied only on the specifier-addressed
/// [`read`](Csr::read)/[`write`](Csr::write) paths used by Zicsr
/// instructions; the named accessors are for the trap controller and
/// tooling, which operate with full machine credentials.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Csr {
    status: Status,
    mtvec: Tvec,
    mepc: u32,
    mcause: Cause,
    mie: u32,
    mip: u32,
    mscratch: u32,
    mcycle: u64,
}

impl Default for Csr {
    fn default() -> Self {
        Self::new()
    }
}

impl Csr {
    /// Creates a fresh bank with all registers at their reset values.
    pub fn new() -> Self {
        Self {
            status: Status::new(),
            mtvec: Tvec::new(),
            mepc: 0,
            mcause: Cause::new(),
            mie: 0,
            mip: 0,
            mscratch: 0,
            mcycle: 0,
        }
    }

    /// Force all Control and Status registers to their reset state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }

    pub fn mtvec(&self) -> &Tvec {
        &self.mtvec
    }

    pub fn mtvec_mut(&mut self) -> &mut Tvec {
        &mut self.mtvec
    }

    pub fn mepc(&self) -> u32 {
        self.mepc
    }

    /// Sets mepc. The two low bits are hard-wired to zero.
    pub fn set_mepc(&mut self, value: u32) {
        self.mepc = value & !0b11;
    }

    pub fn mcause(&self) -> &Cause {
        &self.mcause
    }

    pub fn mcause_mut(&mut self) -> &mut Cause {
        &mut self.mcause
    }

    pub fn mcycle(&self) -> u64 {
        self.mcycle
    }

    /// Bumps the cycle counter; called once per retired instruction.
    pub fn increment_mcycle(&mut self) {
        self.mcycle = self.mcycle.wrapping_add(1);
    }

    /// Read the value of a CSR by its specifier.
    ///
    /// `privilege_level` indicates at what privilege level the read is performed. If the CSR that
    /// is being read requires a higher privilege level, an [`AccessError::Privileged`] is given.
    pub fn read(
        &self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, AccessError> {
        Self::check_access(specifier, privilege_level)?;
        Ok(match specifier {
            specifier::MSTATUS => self.status.read(),
            specifier::MIE => self.mie,
            specifier::MTVEC => self.mtvec.read(),
            specifier::MSCRATCH => self.mscratch,
            specifier::MEPC => self.mepc,
            specifier::MCAUSE => self.mcause.read(),
            specifier::MIP => self.mip,
            specifier::MCYCLE => self.mcycle as u32,
            specifier::MCYCLEH => (self.mcycle >> 32) as u32,
            _ => unreachable!("check_access rejects unsupported specifiers"),
        })
    }

    /// Write `value & mask` to the CSR addressed by `specifier`, leaving the
    /// bits outside `mask` untouched.
    pub fn write(
        &mut self,
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
        value: u32,
        mask: u32,
    ) -> Result<(), AccessError> {
        Self::check_access(specifier, privilege_level)?;
        if specifier::is_read_only(specifier) {
            return Err(AccessError::WriteToReadOnly(specifier));
        }
        match specifier {
            specifier::MSTATUS => self.status.write(value, mask),
            specifier::MIE => self.mie = self.mie & !mask | value & mask,
            specifier::MTVEC => self.mtvec.write(value, mask),
            specifier::MSCRATCH => self.mscratch = self.mscratch & !mask | value & mask,
            specifier::MEPC => self.set_mepc(self.mepc & !mask | value & mask),
            specifier::MCAUSE => self.mcause.write(value, mask),
            specifier::MIP => self.mip = self.mip & !mask | value & mask,
            specifier::MCYCLE => {
                let low = self.mcycle as u32 & !mask | value & mask;
                self.mcycle = self.mcycle & !0xFFFF_FFFF | low as u64;
            }
            specifier::MCYCLEH => {
                let high = (self.mcycle >> 32) as u32 & !mask | value & mask;
                self.mcycle = self.mcycle & 0xFFFF_FFFF | (high as u64) << 32;
            }
            _ => unreachable!("check_access rejects unsupported specifiers"),
        }
        Ok(())
    }

    fn check_access(
        specifier: CsrSpecifier,
        privilege_level: PrivilegeLevel,
    ) -> Result<(), AccessError> {
        if !specifier::is_valid(specifier) {
            return Err(AccessError::CsrUnsupported(specifier));
        }
        let required_level = specifier::required_privilege_level(specifier);
        if privilege_level < required_level {
            return Err(AccessError::Privileged {
                specifier,
                required_level,
                actual_level: privilege_level,
            });
        }
        Ok(())
    }
}

/// Errors that can occur when attempting to access a CSR.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AccessError {
    #[error("unsupported CSR: {0:#05X}")]
    CsrUnsupported(CsrSpecifier),
    #[error(
        "cannot access CSR {specifier:#05X} from privilege level {actual_level}, \
         since it requires privilege level {required_level}"
    )]
    Privileged {
        specifier: CsrSpecifier,
        required_level: RawPrivilegeLevel,
        actual_level: PrivilegeLevel,
    },
    #[error("cannot write to read-only CSR {0:#05X}")]
    WriteToReadOnly(CsrSpecifier),
}

/// General 12-bit value representing a CSR specifier. Note that this can hold any 12-bit value,
/// even if the value represents an unsupported or non-existent CSR.
pub type CsrSpecifier = u16;

/// Specifiers for all supported CSRs.
pub mod specifier {
    use super::CsrSpecifier;
    use crate::RawPrivilegeLevel;

    /// Machine status register.
    pub const MSTATUS: CsrSpecifier = 0x300;
    /// Machine interrupt-enable register.
    pub const MIE: CsrSpecifier = 0x304;
    /// Machine trap-handler base address.
    pub const MTVEC: CsrSpecifier = 0x305;
    /// Scratch register for machine trap handlers.
    pub const MSCRATCH: CsrSpecifier = 0x340;
    /// Machine exception program counter.
    pub const MEPC: CsrSpecifier = 0x341;
    /// Machine trap cause.
    pub const MCAUSE: CsrSpecifier = 0x342;
    /// Machine interrupt pending.
    pub const MIP: CsrSpecifier = 0x344;
    /// Machine cycle counter.
    pub const MCYCLE: CsrSpecifier = 0xB00;
    /// Upper 32 bits of mcycle.
    pub const MCYCLEH: CsrSpecifier = 0xB80;

    /// Returns `true` for specifiers of CSRs this bank implements.
    pub fn is_valid(specifier: CsrSpecifier) -> bool {
        matches!(
            specifier,
            MSTATUS | MIE | MTVEC | MSCRATCH | MEPC | MCAUSE | MIP | MCYCLE | MCYCLEH
        )
    }

    /// Returns `true` if the CSR address space marks this specifier read-only.
    ///
    /// > The top two bits (csr\[11:10]) indicate whether the register is read/write
    /// > (00, 01, or 10) or read-only (11).
    pub fn is_read_only(specifier: CsrSpecifier) -> bool {
        specifier >> 10 == 0b11
    }

    /// Returns the lowest privilege level allowed to access this CSR.
    ///
    /// > The next two bits (csr\[9:8]) encode the lowest privilege level that can access the CSR.
    pub fn required_privilege_level(specifier: CsrSpecifier) -> RawPrivilegeLevel {
        RawPrivilegeLevel::from_u2((specifier >> 8) as u8 & 0b11)
    }
}
