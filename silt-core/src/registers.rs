//! General purpose registers, plus the `pc` register.

use core::fmt;
use std::fmt::Formatter;

/// The type of a single `x` register.
pub type X = u32;

/// The bit width of the `x` registers.
pub const XLEN: u32 = X::BITS;

/// The number of `x` registers available (indices start at `0` for `x0`).
///
/// RV32E halves the register file; everything else about the encodings stays
/// the same.
pub const LEN: u8 = if cfg!(feature = "rv32e") { 16 } else { 32 };

/// ABI names of the `x` registers, in register-file order.
///
/// The table is exposed so external tooling (debuggers, expression
/// evaluators) can resolve symbolic register references against the same
/// layout the core uses.
pub const NAMES: [&str; 32] = [
    "$0", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5",
    "t6",
];

/// A RISC-V core's general purpose registers.
///
/// There are [`LEN`] `x` word-size (32 bit) registers, named `x0` up to `x31`.
/// The register `x0` (aka `zero`) is always zero. Writes to it are ignored.
/// There is also the `pc` register which holds the Program Counter (also 32 bits).
///
/// > For RV32I, the 32 x registers are each 32 bits wide, i.e., XLEN=32. Register x0 is hardwired
/// > with all bits equal to 0. General purpose registers x1–x31 hold values that various
/// > instructions interpret as a collection of Boolean values, or as two’s complement signed binary
/// > integers or unsigned binary integers.
/// >
/// > There is one additional unprivileged register: the program counter pc holds the address of the
/// > current instruction.
///
/// It is not possible to get a mutable reference to an `x` register, since that would allow
/// unchecked writes to register `x0`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Registers {
    x_registers: [X; LEN as usize],
    pc: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Registers {
    /// Returns a fresh set of all-zero registers.
    pub fn new(initial_pc: u32) -> Self {
        Self {
            x_registers: [0; LEN as usize],
            pc: initial_pc,
        }
    }

    /// Returns the value of an `x` register.
    pub fn x(&self, specifier: Specifier) -> u32 {
        self.x_registers[usize::from(specifier)]
    }

    /// Sets the value of an `x` register.
    ///
    /// Writes to register `x0` are ignored.
    pub fn set_x(&mut self, specifier: Specifier, value: u32) {
        self.replace_x(specifier, value);
    }

    /// Replaces the value of an `x` register, returning its old value.
    ///
    /// Writes to register `x0` are ignored.
    pub fn replace_x(&mut self, specifier: Specifier, value: u32) -> u32 {
        if specifier.0 == 0 {
            0 // Ignore writes to register `x0`
        } else {
            std::mem::replace(&mut self.x_registers[specifier.0 as usize], value)
        }
    }

    /// Forces register `x0` back to zero.
    ///
    /// The write path already ignores `x0`, but the engine also clears it
    /// after every retired instruction so the "reads as zero" invariant holds
    /// even if the backing array is ever touched through another route.
    pub fn reset_x0(&mut self) {
        self.x_registers[0] = 0;
    }

    /// Returns the value of the `pc` register.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Returns a mutable reference to the `pc` register value.
    pub fn pc_mut(&mut self) -> &mut u32 {
        &mut self.pc
    }
}

/// An `x` register specifier. Can take values in the range `0..LEN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `x0`, a.k.a. register `zero`, always returns `0` on read, and ignores any writes.
    pub const X0: Self = Specifier(0);

    /// Register `x10`, a.k.a. register `a0`: first argument/return value in
    /// the standard calling convention, and by monitor convention the status
    /// value reported on a breakpoint trap.
    pub const A0: Self = Specifier(10);

    /// Create a register specifier from its index, returning `None` if `index >= LEN`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < LEN).then_some(Self(index))
    }

    /// Convert a 5-bit value into a register specifier.
    /// Panics if the value doesn't fit the register file (`0..LEN`).
    pub fn from_u5(value_u5: u8) -> Self {
        const_assert!(LEN == 16 || LEN == 32);
        if value_u5 >= LEN {
            panic!("out of range register specifier used");
        }
        Self(value_u5)
    }

    /// Returns the ABI name for this register (`"ra"`, `"sp"`, ...).
    pub fn name(self) -> &'static str {
        NAMES[self.0 as usize]
    }

    /// Resolve an ABI name (`"a0"`) or numeric name (`"x10"`) to a specifier.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(position) = NAMES[..LEN as usize].iter().position(|&n| n == name) {
            return Specifier::new(position);
        }
        let index = name.strip_prefix('x')?.parse::<u8>().ok()?;
        Specifier::new(index)
    }

    /// Return an iterator over all register specifiers, starting at x0.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..LEN).map(Self)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        value.0 as u32
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(32, XLEN);
        const_assert!(LEN > 1);
    }

    #[test]
    fn test_write_to_zero() {
        let mut registers = Registers::default();
        assert_eq!(0, registers.x(Specifier::X0));
        assert_eq!(0, registers.pc());
        registers.set_x(Specifier::X0, 0xDEADBEEF);
        assert_eq!(0, registers.x(Specifier::X0));
        assert_eq!(0, registers.pc());
    }

    #[test]
    fn test_write_to_pc() {
        let mut registers = Registers::default();
        assert_eq!(0, registers.pc());
        *registers.pc_mut() = 0xDEADBEEF;
        assert_eq!(0xDEADBEEF, registers.pc());
        assert_eq!(0, registers.x(Specifier::X0));
    }

    #[test]
    fn test_set_x() {
        let mut registers = Registers::default();
        registers.set_x(Specifier::X0, 1);
        for i in 1..LEN {
            registers.set_x(Specifier::from_u5(i), i as u32 + 1);
        }
        assert_eq!(0, registers.x(Specifier::X0));
        for i in 1..LEN {
            assert_eq!(i as u32 + 1, registers.x(Specifier::from_u5(i)));
        }
    }

    #[test]
    fn test_replace_x() {
        let mut registers = Registers::default();
        assert_eq!(0, registers.replace_x(Specifier::X0, 1));
        for i in 1..LEN {
            assert_eq!(0, registers.replace_x(Specifier::from_u5(i), i as u32));
        }
        assert_eq!(0, registers.x(Specifier::X0));
        for i in 1..LEN {
            assert_eq!(
                i as u32,
                registers.replace_x(Specifier::from_u5(i), i as u32 + 1)
            );
        }
    }

    #[test]
    fn test_reset_x0() {
        let mut registers = Registers::default();
        registers.reset_x0();
        assert_eq!(0, registers.x(Specifier::X0));
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!("a0", Specifier::A0.name());
        assert_eq!(Some(Specifier::A0), Specifier::from_name("a0"));
        assert_eq!(Some(Specifier::A0), Specifier::from_name("x10"));
        assert_eq!(Some(Specifier::X0), Specifier::from_name("$0"));
        assert_eq!(None, Specifier::from_name("a99"));
        assert_eq!(None, Specifier::from_name("x32"));
    }

    #[test]
    fn test_names_match_layout() {
        for specifier in Specifier::iter_all() {
            assert_eq!(Some(specifier), Specifier::from_name(specifier.name()));
        }
    }
}
