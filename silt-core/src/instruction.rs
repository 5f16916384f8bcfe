//! Instruction encodings: the ordered pattern table and operand extraction.
//!
//! Decoding happens in two steps that stay logically separate:
//!
//! 1. [`decode`] scans the ordered [`ENCODINGS`] table and returns the first
//!    matching [`Pattern`], which names the operation and its encoding
//!    [`Format`].
//! 2. [`Decoded::extract`] pulls the destination specifier, source operand
//!    values, and sign-extended immediate out of the word according to that
//!    format.
//!
//! Both steps are pure: the same word (and register-file contents) always
//! produce the same result.

use crate::registers::{Registers, Specifier};

/// Instruction encoding formats of the RV32 base ISA.
///
/// `N` covers no-operand system instructions (`ecall`, `ebreak`, `mret`) and
/// the invalid-instruction fallback.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Format {
    I,
    U,
    S,
    J,
    B,
    R,
    N,
}

/// Every operation the executor knows how to perform.
///
/// [`Op::Invalid`] is the semantic action of the universal wildcard pattern
/// that terminates the encoding table; it never executes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Op {
    Lui,
    Auipc,
    Jal,
    Jalr,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
    Ld,
    Sb,
    Sh,
    Sw,
    Sd,
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    Mul,
    Mulh,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
    Csrrw,
    Csrrs,
    Ecall,
    Ebreak,
    Mret,
    Invalid,
}

/// One row of the encoding table: a bit-pattern template plus the format and
/// semantic action of the words it matches.
///
/// A word matches iff `word & mask == value`; positions outside `mask` are
/// wildcards.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Pattern {
    pub mask: u32,
    pub value: u32,
    pub format: Format,
    pub op: Op,
    pub mnemonic: &'static str,
}

/// Parses a 32-bit encoding template into a `(mask, value)` pair.
///
/// Templates are written MSB first. `0` and `1` fix a bit position, `?`
/// leaves it as a wildcard, and spaces/underscores are ignored. Evaluated at
/// compile time; a malformed template fails the build.
const fn template(encoding: &str) -> (u32, u32) {
    let bytes = encoding.as_bytes();
    let mut mask = 0u32;
    let mut value = 0u32;
    let mut bits = 0u32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'_' => {}
            b'?' => {
                mask <<= 1;
                value <<= 1;
                bits += 1;
            }
            b'0' => {
                mask = mask << 1 | 1;
                value <<= 1;
                bits += 1;
            }
            b'1' => {
                mask = mask << 1 | 1;
                value = value << 1 | 1;
                bits += 1;
            }
            _ => panic!("invalid character in encoding template"),
        }
        i += 1;
    }
    assert!(bits == 32, "encoding template must specify exactly 32 bits");
    (mask, value)
}

const fn pattern(encoding: &str, mnemonic: &'static str, format: Format, op: Op) -> Pattern {
    let (mask, value) = template(encoding);
    Pattern {
        mask,
        value,
        format,
        op,
        mnemonic,
    }
}

/// The encoding table, scanned in order; the first matching template wins.
///
/// Order matters where templates overlap: `ecall`, `ebreak`, and `mret` fix
/// all 32 bits and must precede any I-type template on the SYSTEM opcode,
/// and the universal wildcard mapping to [`Op::Invalid`] must come last.
#[rustfmt::skip]
pub const ENCODINGS: &[Pattern] = &[
    pattern("??????? ????? ????? ??? ????? 01101 11", "lui"   , Format::U, Op::Lui),
    pattern("??????? ????? ????? ??? ????? 00101 11", "auipc" , Format::U, Op::Auipc),

    pattern("??????? ????? ????? ??? ????? 11011 11", "jal"   , Format::J, Op::Jal),
    pattern("??????? ????? ????? 000 ????? 11001 11", "jalr"  , Format::I, Op::Jalr),

    pattern("??????? ????? ????? 000 ????? 11000 11", "beq"   , Format::B, Op::Beq),
    pattern("??????? ????? ????? 001 ????? 11000 11", "bne"   , Format::B, Op::Bne),
    pattern("??????? ????? ????? 100 ????? 11000 11", "blt"   , Format::B, Op::Blt),
    pattern("??????? ????? ????? 101 ????? 11000 11", "bge"   , Format::B, Op::Bge),
    pattern("??????? ????? ????? 110 ????? 11000 11", "bltu"  , Format::B, Op::Bltu),
    pattern("??????? ????? ????? 111 ????? 11000 11", "bgeu"  , Format::B, Op::Bgeu),

    pattern("??????? ????? ????? 000 ????? 00000 11", "lb"    , Format::I, Op::Lb),
    pattern("??????? ????? ????? 001 ????? 00000 11", "lh"    , Format::I, Op::Lh),
    pattern("??????? ????? ????? 010 ????? 00000 11", "lw"    , Format::I, Op::Lw),
    pattern("??????? ????? ????? 011 ????? 00000 11", "ld"    , Format::I, Op::Ld),
    pattern("??????? ????? ????? 100 ????? 00000 11", "lbu"   , Format::I, Op::Lbu),
    pattern("??????? ????? ????? 101 ????? 00000 11", "lhu"   , Format::I, Op::Lhu),

    pattern("??????? ????? ????? 000 ????? 01000 11", "sb"    , Format::S, Op::Sb),
    pattern("??????? ????? ????? 001 ????? 01000 11", "sh"    , Format::S, Op::Sh),
    pattern("??????? ????? ????? 010 ????? 01000 11", "sw"    , Format::S, Op::Sw),
    pattern("??????? ????? ????? 011 ????? 01000 11", "sd"    , Format::S, Op::Sd),

    pattern("??????? ????? ????? 000 ????? 00100 11", "addi"  , Format::I, Op::Addi),
    pattern("??????? ????? ????? 010 ????? 00100 11", "slti"  , Format::I, Op::Slti),
    pattern("??????? ????? ????? 011 ????? 00100 11", "sltiu" , Format::I, Op::Sltiu),
    pattern("??????? ????? ????? 100 ????? 00100 11", "xori"  , Format::I, Op::Xori),
    pattern("??????? ????? ????? 110 ????? 00100 11", "ori"   , Format::I, Op::Ori),
    pattern("??????? ????? ????? 111 ????? 00100 11", "andi"  , Format::I, Op::Andi),
    pattern("0000000 ????? ????? 001 ????? 00100 11", "slli"  , Format::I, Op::Slli),
    pattern("0000000 ????? ????? 101 ????? 00100 11", "srli"  , Format::I, Op::Srli),
    pattern("0100000 ????? ????? 101 ????? 00100 11", "srai"  , Format::I, Op::Srai),

    pattern("0000000 ????? ????? 000 ????? 01100 11", "add"   , Format::R, Op::Add),
    pattern("0100000 ????? ????? 000 ????? 01100 11", "sub"   , Format::R, Op::Sub),
    pattern("0000000 ????? ????? 001 ????? 01100 11", "sll"   , Format::R, Op::Sll),
    pattern("0000000 ????? ????? 010 ????? 01100 11", "slt"   , Format::R, Op::Slt),
    pattern("0000000 ????? ????? 011 ????? 01100 11", "sltu"  , Format::R, Op::Sltu),
    pattern("0000000 ????? ????? 100 ????? 01100 11", "xor"   , Format::R, Op::Xor),
    pattern("0000000 ????? ????? 101 ????? 01100 11", "srl"   , Format::R, Op::Srl),
    pattern("0100000 ????? ????? 101 ????? 01100 11", "sra"   , Format::R, Op::Sra),
    pattern("0000000 ????? ????? 110 ????? 01100 11", "or"    , Format::R, Op::Or),
    pattern("0000000 ????? ????? 111 ????? 01100 11", "and"   , Format::R, Op::And),

    pattern("0000001 ????? ????? 000 ????? 01100 11", "mul"   , Format::R, Op::Mul),
    pattern("0000001 ????? ????? 001 ????? 01100 11", "mulh"  , Format::R, Op::Mulh),
    pattern("0000001 ????? ????? 011 ????? 01100 11", "mulhu" , Format::R, Op::Mulhu),
    pattern("0000001 ????? ????? 100 ????? 01100 11", "div"   , Format::R, Op::Div),
    pattern("0000001 ????? ????? 101 ????? 01100 11", "divu"  , Format::R, Op::Divu),
    pattern("0000001 ????? ????? 110 ????? 01100 11", "rem"   , Format::R, Op::Rem),
    pattern("0000001 ????? ????? 111 ????? 01100 11", "remu"  , Format::R, Op::Remu),

    pattern("0000000 00000 00000 000 00000 11100 11", "ecall" , Format::N, Op::Ecall),
    pattern("0000000 00001 00000 000 00000 11100 11", "ebreak", Format::N, Op::Ebreak),
    pattern("0011000 00010 00000 000 00000 11100 11", "mret"  , Format::N, Op::Mret),
    pattern("??????? ????? ????? 001 ????? 11100 11", "csrrw" , Format::I, Op::Csrrw),
    pattern("??????? ????? ????? 010 ????? 11100 11", "csrrs" , Format::I, Op::Csrrs),

    pattern("??????? ????? ????? ??? ????? ????? ??", "inv"   , Format::N, Op::Invalid),
];

/// Returns the first entry of [`ENCODINGS`] matching `word`.
///
/// Total over all 32-bit words: the final table entry is a universal
/// wildcard, so the scan always produces exactly one match.
pub fn decode(word: u32) -> &'static Pattern {
    for pattern in ENCODINGS {
        if word & pattern.mask == pattern.value {
            return pattern;
        }
    }
    // The final table entry has mask 0 and matches any word.
    &ENCODINGS[ENCODINGS.len() - 1]
}

/// Operands of a single decoded instruction, consumed immediately by the
/// executor and never retained.
///
/// `src1`/`src2` are already resolved from the register file; `imm` is the
/// sign-extended immediate assembled per the instruction's [`Format`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Decoded {
    pub rd: Specifier,
    pub src1: u32,
    pub src2: u32,
    pub imm: i32,
}

impl Decoded {
    /// Extracts the operands of `word` according to `format`, resolving
    /// source registers against `registers`.
    ///
    /// The destination field is always bits 11:7; for formats that never
    /// write a register it is reported as `x0`, whose writes are ignored
    /// anyway.
    pub fn extract(word: u32, format: Format, registers: &Registers) -> Self {
        let rd = match format {
            Format::I | Format::U | Format::J | Format::R => rd(word),
            Format::S | Format::B | Format::N => Specifier::X0,
        };
        let src1 = registers.x(rs1(word));
        let src2 = registers.x(rs2(word));
        match format {
            Format::I => Self {
                rd,
                src1,
                src2: 0,
                imm: i_imm(word),
            },
            Format::U => Self {
                rd,
                src1: 0,
                src2: 0,
                imm: u_imm(word),
            },
            Format::S => Self {
                rd,
                src1,
                src2,
                imm: s_imm(word),
            },
            Format::J => Self {
                rd,
                src1: 0,
                src2: 0,
                imm: j_imm(word),
            },
            Format::B => Self {
                rd,
                src1,
                src2,
                imm: b_imm(word),
            },
            Format::R => Self {
                rd,
                src1,
                src2,
                imm: 0,
            },
            Format::N => Self {
                rd,
                src1: 0,
                src2: 0,
                imm: 0,
            },
        }
    }
}

/// Returns the 12-bit CSR specifier of a Zicsr instruction (bits 31:20,
/// zero-extended).
pub fn csr_specifier(word: u32) -> u16 {
    (word >> 20) as u16 & 0xFFF
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type instructions.
fn rd(word: u32) -> Specifier {
    Specifier::from_u5(((word >> 7) & 0x1F) as u8)
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type instructions.
fn rs1(word: u32) -> Specifier {
    Specifier::from_u5(((word >> 15) & 0x1F) as u8)
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(word: u32) -> Specifier {
    Specifier::from_u5(((word >> 20) & 0x1F) as u8)
}

/// Returns the 12-bit I-immediate sign-extended to 32 bits.
fn i_imm(word: u32) -> i32 {
    word as i32 >> 20
}

/// Returns the 12-bit S-immediate sign-extended to 32 bits.
fn s_imm(word: u32) -> i32 {
    let imm_11_5 = word & 0xFE00_0000;
    let imm_4_0 = word & 0x0000_0F80;
    (imm_11_5 | (imm_4_0 << 13)) as i32 >> 20
}

/// Returns the 13-bit B-immediate sign-extended to 32 bits.
///
/// Bit 0 of the result is always zero; branch offsets are in multiples of
/// two bytes.
fn b_imm(word: u32) -> i32 {
    let imm_12 = word & 0x8000_0000;
    let imm_10_5 = word & 0x7E00_0000;
    let imm_4_1 = word & 0x0000_0F00;
    let imm_11 = word & 0x0000_0080;
    (imm_12 | (imm_11 << 23) | (imm_10_5 >> 1) | (imm_4_1 << 12)) as i32 >> 19
}

/// Returns the signed 32-bit U-immediate (bits 31:12 of the word, low 12
/// bits zero).
fn u_imm(word: u32) -> i32 {
    (word & 0xFFFF_F000) as i32
}

/// Returns the 21-bit J-immediate sign-extended to 32 bits.
///
/// Bit 0 of the result is always zero.
fn j_imm(word: u32) -> i32 {
    let imm_20 = word & 0x8000_0000;
    let imm_10_1 = word & 0x7FE0_0000;
    let imm_11 = word & 0x0010_0000;
    let imm_19_12 = word & 0x000F_F000;
    (imm_20 | (imm_19_12 << 11) | (imm_11 << 2) | (imm_10_1 >> 9)) as i32 >> 11
}
