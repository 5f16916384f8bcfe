//! Instruction semantics: one function application per decoded operation.

use log::{debug, trace};

use super::trap::Exception;
use super::{Core, CoreError};
use crate::bus::{Bus, Width};
use crate::instruction::{self, Decoded, Op};
use crate::registers::Specifier;

/// How a retired instruction moves the pc, decided by the executor and
/// committed by the step loop.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum Progress {
    /// Fall through to the next sequential instruction (`pc + 4`).
    Step,
    /// Redirect the pc to the given address.
    Jump(u32),
    /// Stop the run; the guest reported the given status code.
    Halt(u32),
}

/// Borrows a core to execute a single instruction against its state.
pub(super) struct Executor<'c, B: Bus> {
    pub core: &'c mut Core<B>,
}

impl<B: Bus> Executor<'_, B> {
    /// Executes the instruction `word`, fetched from `pc`.
    ///
    /// On success also reports whether the differential check must be
    /// suppressed for this instruction (true only for `ebreak`, which diverts
    /// into the monitor rather than architectural execution).
    pub fn execute(&mut self, pc: u32, word: u32) -> Result<(Progress, bool), CoreError> {
        let pattern = instruction::decode(word);
        if pattern.op == Op::Invalid {
            return Err(CoreError::IllegalInstruction {
                pc,
                instruction: word,
            });
        }
        let Decoded {
            rd,
            src1,
            src2,
            imm,
        } = Decoded::extract(word, pattern.format, self.core.registers());
        trace!(target: "itrace", pc, word, mnemonic = pattern.mnemonic; "retiring");

        let progress = match pattern.op {
            Op::Lui => self.write_x(rd, imm as u32),
            Op::Auipc => self.write_x(rd, pc.wrapping_add(imm as u32)),

            Op::Jal => {
                self.write_x(rd, pc.wrapping_add(4));
                Progress::Jump(pc.wrapping_add(imm as u32))
            }
            Op::Jalr => {
                // The target drops its low bit before the link register is
                // written, so `jalr rd, rd, imm` still links correctly.
                let target = src1.wrapping_add(imm as u32) & !1;
                self.write_x(rd, pc.wrapping_add(4));
                Progress::Jump(target)
            }

            Op::Beq => branch(src1 == src2, pc, imm),
            Op::Bne => branch(src1 != src2, pc, imm),
            Op::Blt => branch((src1 as i32) < (src2 as i32), pc, imm),
            Op::Bge => branch(src1 as i32 >= src2 as i32, pc, imm),
            Op::Bltu => branch(src1 < src2, pc, imm),
            Op::Bgeu => branch(src1 >= src2, pc, imm),

            Op::Lb => self.load(rd, src1, imm, Width::Byte, true),
            Op::Lh => self.load(rd, src1, imm, Width::Half, true),
            Op::Lw => self.load(rd, src1, imm, Width::Word, true),
            Op::Lbu => self.load(rd, src1, imm, Width::Byte, false),
            Op::Lhu => self.load(rd, src1, imm, Width::Half, false),
            // Doubleword requests go to the bus unchanged; the destination
            // register only keeps the low word.
            Op::Ld => self.load(rd, src1, imm, Width::Double, false),

            Op::Sb | Op::Sh | Op::Sw | Op::Sd => {
                let width = match pattern.op {
                    Op::Sb => Width::Byte,
                    Op::Sh => Width::Half,
                    Op::Sw => Width::Word,
                    _ => Width::Double,
                };
                let address = src1.wrapping_add(imm as u32);
                self.core.bus_mut().write(address, width, src2 as u64);
                Progress::Step
            }

            Op::Addi => self.write_x(rd, src1.wrapping_add(imm as u32)),
            Op::Slti => self.write_x(rd, ((src1 as i32) < imm) as u32),
            Op::Sltiu => self.write_x(rd, (src1 < imm as u32) as u32),
            Op::Xori => self.write_x(rd, src1 ^ imm as u32),
            Op::Ori => self.write_x(rd, src1 | imm as u32),
            Op::Andi => self.write_x(rd, src1 & imm as u32),
            Op::Slli => self.write_x(rd, src1 << (imm as u32 & 0x1F)),
            Op::Srli => self.write_x(rd, src1 >> (imm as u32 & 0x1F)),
            Op::Srai => self.write_x(rd, (src1 as i32 >> (imm as u32 & 0x1F)) as u32),

            Op::Add => self.write_x(rd, src1.wrapping_add(src2)),
            Op::Sub => self.write_x(rd, src1.wrapping_sub(src2)),
            Op::Sll => self.write_x(rd, src1 << (src2 & 0x1F)),
            Op::Slt => self.write_x(rd, ((src1 as i32) < (src2 as i32)) as u32),
            Op::Sltu => self.write_x(rd, (src1 < src2) as u32),
            Op::Xor => self.write_x(rd, src1 ^ src2),
            Op::Srl => self.write_x(rd, src1 >> (src2 & 0x1F)),
            Op::Sra => self.write_x(rd, (src1 as i32 >> (src2 & 0x1F)) as u32),
            Op::Or => self.write_x(rd, src1 | src2),
            Op::And => self.write_x(rd, src1 & src2),

            Op::Mul => self.write_x(rd, src1.wrapping_mul(src2)),
            Op::Mulh => {
                let product = src1 as i32 as i64 * src2 as i32 as i64;
                self.write_x(rd, (product >> 32) as u32)
            }
            Op::Mulhu => {
                let product = src1 as u64 * src2 as u64;
                self.write_x(rd, (product >> 32) as u32)
            }
            // Division never traps: zero divisors and signed overflow produce
            // the architectural sentinel results.
            Op::Div => self.write_x(
                rd,
                if src2 == 0 {
                    u32::MAX
                } else {
                    (src1 as i32).wrapping_div(src2 as i32) as u32
                },
            ),
            Op::Divu => self.write_x(rd, if src2 == 0 { u32::MAX } else { src1 / src2 }),
            Op::Rem => self.write_x(
                rd,
                if src2 == 0 {
                    src1
                } else {
                    (src1 as i32).wrapping_rem(src2 as i32) as u32
                },
            ),
            Op::Remu => self.write_x(rd, if src2 == 0 { src1 } else { src1 % src2 }),

            Op::Csrrw => self.csr_swap(pc, word, rd, src1)?,
            Op::Csrrs => self.csr_set_bits(pc, word, rd, src1)?,

            Op::Ecall => {
                let level = self.core.privilege();
                let target = self
                    .core
                    .raise_exception(pc, Exception::EnvironmentCall(level))?;
                Progress::Jump(target)
            }
            Op::Ebreak => Progress::Halt(self.core.registers().x(Specifier::A0)),
            Op::Mret => Progress::Jump(self.core.trap_return()),

            Op::Invalid => unreachable!("rejected before operand extraction"),
        };
        Ok((progress, pattern.op == Op::Ebreak))
    }

    fn write_x(&mut self, rd: Specifier, value: u32) -> Progress {
        self.core.registers_mut().set_x(rd, value);
        Progress::Step
    }

    fn load(
        &mut self,
        rd: Specifier,
        src1: u32,
        imm: i32,
        width: Width,
        sign_extend: bool,
    ) -> Progress {
        let address = src1.wrapping_add(imm as u32);
        let raw = self.core.bus_mut().read(address, width);
        let value = match (width, sign_extend) {
            (Width::Byte, true) => raw as u8 as i8 as i32 as u32,
            (Width::Byte, false) => raw as u8 as u32,
            (Width::Half, true) => raw as u16 as i16 as i32 as u32,
            (Width::Half, false) => raw as u16 as u32,
            _ => raw as u32,
        };
        self.write_x(rd, value)
    }

    /// `csrrw`: atomically swap the CSR with `src1`, old value to `rd`.
    fn csr_swap(
        &mut self,
        pc: u32,
        word: u32,
        rd: Specifier,
        src1: u32,
    ) -> Result<Progress, CoreError> {
        let specifier = instruction::csr_specifier(word);
        let level = self.core.privilege();
        let old = self
            .core
            .csr()
            .read(specifier, level)
            .map_err(|error| csr_rejected(pc, word, error))?;
        self.core
            .csr_mut()
            .write(specifier, level, src1, !0)
            .map_err(|error| csr_rejected(pc, word, error))?;
        Ok(self.write_x(rd, old))
    }

    /// `csrrs`: read the CSR into `rd` and set the bits of `src1` in it.
    ///
    /// A zero `src1` (in particular `rs1 == x0`, the plain `csrr` idiom)
    /// performs no write at all, so read-only counters stay readable.
    fn csr_set_bits(
        &mut self,
        pc: u32,
        word: u32,
        rd: Specifier,
        src1: u32,
    ) -> Result<Progress, CoreError> {
        let specifier = instruction::csr_specifier(word);
        let level = self.core.privilege();
        let old = self
            .core
            .csr()
            .read(specifier, level)
            .map_err(|error| csr_rejected(pc, word, error))?;
        if src1 != 0 {
            self.core
                .csr_mut()
                .write(specifier, level, src1, src1)
                .map_err(|error| csr_rejected(pc, word, error))?;
        }
        Ok(self.write_x(rd, old))
    }
}

/// CSR accesses the bank refuses surface as illegal instructions.
fn csr_rejected(pc: u32, word: u32, error: crate::core::csr::AccessError) -> CoreError {
    debug!("csr access rejected: {error}");
    CoreError::IllegalInstruction {
        pc,
        instruction: word,
    }
}

fn branch(taken: bool, pc: u32, imm: i32) -> Progress {
    if taken {
        Progress::Jump(pc.wrapping_add(imm as u32))
    } else {
        Progress::Step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Ram;
    use crate::core::Config;

    fn core() -> Core<Ram> {
        Core::new(
            Config {
                reset_vector: 0x8000_0000,
            },
            Ram::new(0x8000_0000, 0x1000).unwrap(),
        )
    }

    fn execute(core: &mut Core<Ram>, word: u32) -> (Progress, bool) {
        let pc = core.registers().pc();
        Executor { core }.execute(pc, word).unwrap()
    }

    fn set(core: &mut Core<Ram>, index: u8, value: u32) {
        core.registers_mut().set_x(Specifier::from_u5(index), value);
    }

    fn get(core: &Core<Ram>, index: u8) -> u32 {
        core.registers().x(Specifier::from_u5(index))
    }

    #[test]
    fn test_addi_and_add() {
        let mut core = core();
        // addi x1, x0, 5
        assert_eq!((Progress::Step, false), execute(&mut core, 0x0050_0093));
        assert_eq!(5, get(&core, 1));
        // add x2, x1, x1 = 0x001080B3 with rd=2 -> 0x00108133
        execute(&mut core, 0x0010_8133);
        assert_eq!(10, get(&core, 2));
    }

    #[test]
    fn test_lui_auipc() {
        let mut core = core();
        // lui x1, 0x12345
        execute(&mut core, 0x1234_50B7);
        assert_eq!(0x1234_5000, get(&core, 1));
        // auipc x2, 0x1000
        let (progress, _) = execute(&mut core, 0x0100_0117);
        assert_eq!(Progress::Step, progress);
        assert_eq!(0x8000_0000 + 0x0100_0000, get(&core, 2));
    }

    #[test]
    fn test_jal_links_and_jumps() {
        let mut core = core();
        // jal x1, +8
        let (progress, _) = execute(&mut core, 0x0080_00EF);
        assert_eq!(Progress::Jump(0x8000_0008), progress);
        assert_eq!(0x8000_0004, get(&core, 1));
    }

    #[test]
    fn test_jalr_clears_low_bit() {
        let mut core = core();
        set(&mut core, 1, 0x8000_0101);
        // jalr x2, x1, 0
        let (progress, _) = execute(&mut core, 0x0000_8167);
        assert_eq!(Progress::Jump(0x8000_0100), progress);
        assert_eq!(0x8000_0004, get(&core, 2));
    }

    #[test]
    fn test_branches() {
        let mut core = core();
        set(&mut core, 1, 7);
        set(&mut core, 2, 7);
        // beq x1, x2, +16
        let (progress, _) = execute(&mut core, 0x0020_8863);
        assert_eq!(Progress::Jump(0x8000_0010), progress);
        // bne x1, x2, +16 not taken
        let (progress, _) = execute(&mut core, 0x0020_9863);
        assert_eq!(Progress::Step, progress);
        // blt: -1 < 1 signed, but not unsigned
        set(&mut core, 1, u32::MAX);
        set(&mut core, 2, 1);
        let (progress, _) = execute(&mut core, 0x0020_C863); // blt x1, x2, +16
        assert_eq!(Progress::Jump(0x8000_0010), progress);
        let (progress, _) = execute(&mut core, 0x0020_E863); // bltu x1, x2, +16
        assert_eq!(Progress::Step, progress);
    }

    #[test]
    fn test_load_store_round_trip() {
        let mut core = core();
        set(&mut core, 1, 0x8000_0100);
        set(&mut core, 2, 0xDEAD_BEEF);
        // sw x2, 0(x1)
        execute(&mut core, 0x0020_A023);
        // lw x3, 0(x1)
        execute(&mut core, 0x0000_A183);
        assert_eq!(0xDEAD_BEEF, get(&core, 3));
        // lb x3, 0(x1) sign-extends 0xEF
        execute(&mut core, 0x0000_8183);
        assert_eq!(0xFFFF_FFEF, get(&core, 3));
        // lbu x3, 0(x1) zero-extends
        execute(&mut core, 0x0000_C183);
        assert_eq!(0x0000_00EF, get(&core, 3));
    }

    #[test]
    fn test_shift_amounts_masked() {
        let mut core = core();
        set(&mut core, 1, 1);
        set(&mut core, 2, 33); // effective shift amount 1
        // sll x3, x1, x2
        execute(&mut core, 0x0020_91B3);
        assert_eq!(2, get(&core, 3));
        // sra keeps the sign
        set(&mut core, 1, 0x8000_0000);
        set(&mut core, 2, 31);
        execute(&mut core, 0x4020_D1B3); // sra x3, x1, x2
        assert_eq!(u32::MAX, get(&core, 3));
    }

    #[test]
    fn test_division_sentinels() {
        let mut core = core();
        set(&mut core, 1, 42);
        set(&mut core, 2, 0);
        execute(&mut core, 0x0220_C1B3); // div x3, x1, x2
        assert_eq!(u32::MAX, get(&core, 3));
        execute(&mut core, 0x0220_D1B3); // divu x3, x1, x2
        assert_eq!(u32::MAX, get(&core, 3));
        execute(&mut core, 0x0220_E1B3); // rem x3, x1, x2
        assert_eq!(42, get(&core, 3));
        execute(&mut core, 0x0220_F1B3); // remu x3, x1, x2
        assert_eq!(42, get(&core, 3));
        // Signed overflow: i32::MIN / -1
        set(&mut core, 1, i32::MIN as u32);
        set(&mut core, 2, -1i32 as u32);
        execute(&mut core, 0x0220_C1B3);
        assert_eq!(i32::MIN as u32, get(&core, 3));
        execute(&mut core, 0x0220_E1B3);
        assert_eq!(0, get(&core, 3));
    }

    #[test]
    fn test_mul_high_halves() {
        let mut core = core();
        set(&mut core, 1, u32::MAX); // -1 signed
        set(&mut core, 2, u32::MAX);
        execute(&mut core, 0x0220_81B3); // mul x3, x1, x2
        assert_eq!(1, get(&core, 3));
        execute(&mut core, 0x0220_91B3); // mulh: (-1 * -1) >> 32 = 0
        assert_eq!(0, get(&core, 3));
        execute(&mut core, 0x0220_B1B3); // mulhu: high half of 0xFFFF_FFFE...
        assert_eq!(0xFFFF_FFFE, get(&core, 3));
    }

    #[test]
    fn test_ebreak_halts_with_a0() {
        let mut core = core();
        set(&mut core, 10, 42);
        let (progress, skip) = execute(&mut core, 0x0010_0073);
        assert_eq!(Progress::Halt(42), progress);
        assert!(skip);
    }

    #[test]
    fn test_illegal_instruction_is_fatal() {
        let mut core = core();
        let pc = core.registers().pc();
        let result = Executor { core: &mut core }.execute(pc, 0x0000_0000);
        assert_eq!(
            Err(CoreError::IllegalInstruction {
                pc: 0x8000_0000,
                instruction: 0,
            }),
            result
        );
    }

    #[test]
    fn test_csrrw_swaps() {
        let mut core = core();
        set(&mut core, 1, 0x8000_0100);
        // csrrw x2, mtvec, x1
        execute(&mut core, 0x3050_9173);
        assert_eq!(0, get(&core, 2));
        assert_eq!(0x8000_0100, core.csr().mtvec().base());
    }

    #[test]
    fn test_csrrs_reads_without_writing() {
        let mut core = core();
        // csrr x1, mcycle = csrrs x1, mcycle, x0; the zero source must not
        // turn the read into a write.
        let (progress, _) = execute(&mut core, 0xB000_20F3);
        assert_eq!(Progress::Step, progress);
        assert_eq!(0, get(&core, 1));
    }

    #[test]
    fn test_csr_access_from_user_mode_is_illegal() {
        let mut core = core();
        core.set_privilege(crate::PrivilegeLevel::User);
        let result = Executor { core: &mut core }.execute(0x8000_0000, 0x3050_9173);
        assert!(matches!(
            result,
            Err(CoreError::IllegalInstruction { .. })
        ));
    }
}
