//! Execution: turns a decoded `Instr` into register/memory effects on a
//! `Cpu` + `Miu` pair. Control-flow instructions report their own next-PC;
//! everything else falls through to the caller's default PC advance.

use super::alu;
use super::decode::{AluOp3, ExtBitOp, ImmOp3, ImmRegOp3, Instr, MemOp, MulDivOp, ShiftOp};
use super::flags::eval_cc;
use super::{Cause, Cpu};
use crate::miu::Miu;

/// What the dispatched instruction did to control flow. `Fallthrough` means
/// the caller should advance PC by the instruction's own width.
pub enum Flow {
    Fallthrough,
    Jump(u32),
    Trap(Cause),
}

fn mem_read(miu: &mut Miu, addr: u32, kind: MemOp) -> u32 {
    match kind {
        MemOp::Lb => (miu.read8(addr) as i8) as i32 as u32,
        MemOp::Lbu => miu.read8(addr) as u32,
        MemOp::Lh => (miu.read16(addr) as i16) as i32 as u32,
        MemOp::Lhu => miu.read16(addr) as u32,
        MemOp::Lw => miu.read32(addr),
        _ => 0,
    }
}

fn mem_write(miu: &mut Miu, addr: u32, kind: MemOp, value: u32) {
    match kind {
        MemOp::Sb => miu.write8(addr, value as u8),
        MemOp::Sh => miu.write16(addr, value as u16),
        MemOp::Sw => miu.write32(addr, value),
        _ => {}
    }
}

fn is_store(kind: MemOp) -> bool {
    matches!(kind, MemOp::Sb | MemOp::Sh | MemOp::Sw)
}

/// Execute one already-decoded instruction. `pc` is the address the
/// instruction was fetched from (needed for PC-relative jumps and link
/// values); `next_pc` is the address of the instruction immediately after
/// (the normal fallthrough and the `link` target for subroutine calls).
pub fn execute(cpu: &mut Cpu, miu: &mut Miu, instr: Instr, pc: u32, next_pc: u32) -> Flow {
    match instr {
        Instr::Alu3 { op, rd, ra, rb, cu } => {
            let a = cpu.gpr(ra);
            let b = cpu.gpr(rb);
            let carry_in = cpu.flags.c;
            let r = match op {
                AluOp3::Add => alu::add(a, b),
                AluOp3::Addc => alu::addc(a, b, carry_in),
                AluOp3::Sub => alu::sub(a, b),
                AluOp3::Subc => alu::subc(a, b, carry_in),
                AluOp3::Neg => alu::neg(a),
                AluOp3::And => alu::and(a, b),
                AluOp3::Or => alu::or(a, b),
                AluOp3::Xor => alu::xor(a, b),
                AluOp3::Not => alu::not(a),
            };
            cpu.set_gpr(rd, r.value);
            if cu {
                cpu.flags = r.flags;
            }
            Flow::Fallthrough
        }
        Instr::Cmp { ra, rb, cc } => {
            let r = alu::sub(cpu.gpr(ra), cpu.gpr(rb));
            cpu.flags = r.flags;
            cpu.flags.t = eval_cc(cc as u32, r.flags);
            Flow::Fallthrough
        }
        Instr::CmpZ { ra, cc } => {
            let r = alu::sub(cpu.gpr(ra), 0);
            cpu.flags = r.flags;
            cpu.flags.t = eval_cc(cc as u32, r.flags);
            Flow::Fallthrough
        }
        Instr::Shift { op, rd, ra, rb, cu } => {
            let a = cpu.gpr(ra);
            let amount = cpu.gpr(rb);
            let carry_in = cpu.flags.c;
            let r = match op {
                ShiftOp::Sll => alu::sll(a, amount),
                ShiftOp::Srl => alu::srl(a, amount),
                ShiftOp::Sra => alu::sra(a, amount),
                ShiftOp::Ror => alu::ror(a, amount),
                ShiftOp::Rol => alu::rol(a, amount),
                ShiftOp::Rorc => alu::rorc(a, amount, carry_in),
                ShiftOp::Rolc => alu::rolc(a, amount, carry_in),
            };
            cpu.set_gpr(rd, r.value);
            if cu {
                cpu.flags = r.flags;
            }
            Flow::Fallthrough
        }
        Instr::ExtOrBit { op, rd, ra, rb } => {
            let a = cpu.gpr(ra);
            let bit = cpu.gpr(rb);
            match op {
                ExtBitOp::Extsb => cpu.set_gpr(rd, alu::extsb(a).value),
                ExtBitOp::Extsh => cpu.set_gpr(rd, alu::extsh(a).value),
                ExtBitOp::Extzb => cpu.set_gpr(rd, alu::extzb(a).value),
                ExtBitOp::Extzh => cpu.set_gpr(rd, alu::extzh(a).value),
                ExtBitOp::Bitclr => cpu.set_gpr(rd, alu::bitclr(a, bit).value),
                ExtBitOp::Bitset => cpu.set_gpr(rd, alu::bitset(a, bit).value),
                ExtBitOp::Bittgl => cpu.set_gpr(rd, alu::bittgl(a, bit).value),
                ExtBitOp::Bittst => cpu.flags = alu::bittst(a, bit),
            }
            Flow::Fallthrough
        }
        Instr::MulDiv { op, ra, rb } => {
            let a = cpu.gpr(ra);
            let b = cpu.gpr(rb);
            match op {
                MulDivOp::Mul => {
                    let (lo, hi) = alu::mul_signed(a, b);
                    cpu.cel = lo;
                    cpu.ceh = hi;
                }
                MulDivOp::Mulu => {
                    let (lo, hi) = alu::mul_unsigned(a, b);
                    cpu.cel = lo;
                    cpu.ceh = hi;
                }
                MulDivOp::Div => {
                    if let Some((q, r)) = alu::div_signed(a, b) {
                        cpu.cel = q;
                        cpu.ceh = r;
                    } else {
                        log::warn!("cpu: div by zero at pc={pc:#010x}, CEL/CEH unchanged");
                    }
                }
                MulDivOp::Divu => {
                    if let Some((q, r)) = alu::div_unsigned(a, b) {
                        cpu.cel = q;
                        cpu.ceh = r;
                    } else {
                        log::warn!("cpu: div by zero at pc={pc:#010x}, CEL/CEH unchanged");
                    }
                }
            }
            Flow::Fallthrough
        }
        Instr::Mv { rd, ra } => {
            cpu.set_gpr(rd, cpu.gpr(ra));
            Flow::Fallthrough
        }
        Instr::Mfce { rd, sel } => {
            // sel: 1 = CEL, 2 = CEH, 3 = both (CEL -> rd, CEH -> rd+1).
            match sel {
                1 => cpu.set_gpr(rd, cpu.cel),
                2 => cpu.set_gpr(rd, cpu.ceh),
                3 => {
                    cpu.set_gpr(rd, cpu.cel);
                    cpu.set_gpr(rd.wrapping_add(1), cpu.ceh);
                }
                _ => log::warn!("cpu: mfce with reserved selector {sel}"),
            }
            Flow::Fallthrough
        }
        Instr::Mtce { ra, sel } => {
            // sel: 1 = CEL, 2 = CEH, 3 = both (ra -> CEL, ra+1 -> CEH).
            match sel {
                1 => cpu.cel = cpu.gpr(ra),
                2 => cpu.ceh = cpu.gpr(ra),
                3 => {
                    cpu.cel = cpu.gpr(ra);
                    cpu.ceh = cpu.gpr(ra.wrapping_add(1));
                }
                _ => log::warn!("cpu: mtce with reserved selector {sel}"),
            }
            Flow::Fallthrough
        }
        Instr::BrReg { cc, ra, link } => {
            if eval_cc(cc as u32, cpu.flags) {
                let target = cpu.gpr(ra);
                if link {
                    cpu.set_gpr(3, next_pc);
                }
                Flow::Jump(target)
            } else {
                Flow::Fallthrough
            }
        }
        Instr::ImmOp { op, rd, imm, upper } => {
            let a = cpu.gpr(rd);
            let imm = imm as u32;
            match op {
                ImmOp3::Ldi => {
                    cpu.set_gpr(
                        rd,
                        if upper { imm | (a & 0xFFFF) } else { imm },
                    );
                }
                ImmOp3::Addi => cpu.set_gpr(rd, alu::add(a, imm).value),
                ImmOp3::Andi => cpu.set_gpr(rd, alu::and(a, imm).value),
                ImmOp3::Ori => cpu.set_gpr(rd, alu::or(a, imm).value),
                ImmOp3::Xori => cpu.set_gpr(rd, alu::xor(a, imm).value),
            }
            Flow::Fallthrough
        }
        Instr::CmpImm { rd_as_imm: rd, imm, cc } => {
            let r = alu::sub(cpu.gpr(rd), imm as u32);
            cpu.flags = r.flags;
            cpu.flags.t = eval_cc(cc as u32, r.flags);
            Flow::Fallthrough
        }
        Instr::Jump { disp24, link, absolute } => {
            // 32-bit J-form: target pages off PC's own top 7 bits per §4.7's
            // Target = (PC & 0xFE000000) | (disp24 << 1). The 16-bit compact
            // jump has no such page restriction and is plain PC-relative.
            let target = if absolute {
                (pc & 0xFE00_0000) | ((disp24 as u32) << 1)
            } else {
                pc.wrapping_add(disp24 as u32)
            };
            if link {
                cpu.set_gpr(3, next_pc);
            }
            Flow::Jump(target)
        }
        Instr::MemRix { rd, ra, disp, kind, writeback } => {
            let base = cpu.gpr(ra);
            let addr = base.wrapping_add(disp as u32);
            if is_store(kind) {
                mem_write(miu, addr, kind, cpu.gpr(rd));
            } else {
                let v = mem_read(miu, addr, kind);
                cpu.set_gpr(rd, v);
            }
            if writeback {
                cpu.set_gpr(ra, addr);
            }
            Flow::Fallthrough
        }
        Instr::Branch { cc, disp22, link } => {
            if eval_cc(cc as u32, cpu.flags) {
                let target = pc.wrapping_add(disp22 as u32);
                if link {
                    cpu.set_gpr(3, next_pc);
                }
                Flow::Jump(target)
            } else {
                Flow::Fallthrough
            }
        }
        Instr::Mfcr { rd, cra } => {
            cpu.set_gpr(rd, cpu.cr(cra));
            Flow::Fallthrough
        }
        Instr::Mtcr { rd, cra } => {
            cpu.set_cr(cra, cpu.gpr(rd));
            Flow::Fallthrough
        }
        Instr::Rte => Flow::Trap(Cause::ReturnFromException),
        Instr::ImmRegOp { op, rd, ra, imm } => {
            let a = cpu.gpr(ra);
            let imm = imm as u32;
            let value = match op {
                ImmRegOp3::Addri => alu::add(a, imm).value,
                ImmRegOp3::Andri => alu::and(a, imm).value,
                ImmRegOp3::Orri => alu::or(a, imm).value,
            };
            cpu.set_gpr(rd, value);
            Flow::Fallthrough
        }
        Instr::Mem { rd, ra, imm, kind } => {
            let addr = cpu.gpr(ra).wrapping_add(imm as u32);
            if is_store(kind) {
                mem_write(miu, addr, kind, cpu.gpr(rd));
            } else {
                let v = mem_read(miu, addr, kind);
                cpu.set_gpr(rd, v);
            }
            Flow::Fallthrough
        }
        Instr::Mfsr { rd, srb } => {
            let value = if srb == 0 { cpu.flags.pack() } else { cpu.sr(srb) };
            cpu.set_gpr(rd, value);
            Flow::Fallthrough
        }
        Instr::Mtsr { srb, ra } => {
            let v = cpu.gpr(ra);
            if srb == 0 {
                cpu.flags = super::flags::Flags::unpack(v);
            } else {
                cpu.set_sr(srb, v);
            }
            Flow::Fallthrough
        }
        Instr::Invalid => Flow::Trap(Cause::InvalidInstruction),
        Instr::Nop16 => Flow::Fallthrough,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::decode32;
    use crate::miu::Miu;

    fn new_cpu() -> Cpu {
        Cpu::new()
    }

    #[test]
    fn ldi_then_addi_accumulate() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();

        let ldi = decode32((0x01u32 << 27) | (22u32 << 22) | 0x21);
        execute(&mut cpu, &mut miu, ldi, 0, 4);
        assert_eq!(cpu.gpr(22), 0x21);

        let addi = decode32((0x01u32 << 27) | (22u32 << 22) | (1u32 << 19) | 0x21);
        execute(&mut cpu, &mut miu, addi, 4, 8);
        assert_eq!(cpu.gpr(22), 0x42);
    }

    #[test]
    fn branch_link_stores_return_address() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        let instr = Instr::Jump { disp24: 0x100, link: true, absolute: true };
        match execute(&mut cpu, &mut miu, instr, 0x1000, 0x1004) {
            // absolute target: (0x1000 & 0xFE000000) | (0x100 << 1) == 0x200
            Flow::Jump(target) => assert_eq!(target, 0x200),
            _ => panic!("expected jump"),
        }
        assert_eq!(cpu.gpr(3), 0x1004);
    }

    #[test]
    fn compact_jump_is_pc_relative_not_page_absolute() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        let instr = Instr::Jump { disp24: -0x10, link: false, absolute: false };
        match execute(&mut cpu, &mut miu, instr, 0x9E00_1000, 0x9E00_1002) {
            Flow::Jump(target) => assert_eq!(target, 0x9E00_0FF0),
            _ => panic!("expected jump"),
        }
    }

    #[test]
    fn invalid_instruction_traps() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        match execute(&mut cpu, &mut miu, Instr::Invalid, 0, 4) {
            Flow::Trap(Cause::InvalidInstruction) => {}
            _ => panic!("expected trap"),
        }
    }

    #[test]
    fn gpr_zero_writes_are_discarded() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        let instr = Instr::ImmOp { op: ImmOp3::Ldi, rd: 0, imm: 0x42, upper: false };
        execute(&mut cpu, &mut miu, instr, 0, 4);
        assert_eq!(cpu.gpr(0), 0);
    }

    #[test]
    fn mfce_sel_1_reads_cel() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        cpu.cel = 0x1111_1111;
        cpu.ceh = 0x2222_2222;
        execute(&mut cpu, &mut miu, Instr::Mfce { rd: 4, sel: 1 }, 0, 4);
        assert_eq!(cpu.gpr(4), 0x1111_1111);
    }

    #[test]
    fn mfce_sel_2_reads_ceh() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        cpu.cel = 0x1111_1111;
        cpu.ceh = 0x2222_2222;
        execute(&mut cpu, &mut miu, Instr::Mfce { rd: 4, sel: 2 }, 0, 4);
        assert_eq!(cpu.gpr(4), 0x2222_2222);
    }

    #[test]
    fn mfce_sel_3_reads_both_into_d_and_d_plus_1() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        cpu.cel = 0x1111_1111;
        cpu.ceh = 0x2222_2222;
        execute(&mut cpu, &mut miu, Instr::Mfce { rd: 4, sel: 3 }, 0, 4);
        assert_eq!(cpu.gpr(4), 0x1111_1111);
        assert_eq!(cpu.gpr(5), 0x2222_2222);
    }

    #[test]
    fn mtce_sel_1_writes_cel() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        cpu.set_gpr(4, 0x3333_3333);
        execute(&mut cpu, &mut miu, Instr::Mtce { ra: 4, sel: 1 }, 0, 4);
        assert_eq!(cpu.cel, 0x3333_3333);
        assert_eq!(cpu.ceh, 0);
    }

    #[test]
    fn mtce_sel_2_writes_ceh() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        cpu.set_gpr(4, 0x3333_3333);
        execute(&mut cpu, &mut miu, Instr::Mtce { ra: 4, sel: 2 }, 0, 4);
        assert_eq!(cpu.ceh, 0x3333_3333);
        assert_eq!(cpu.cel, 0);
    }

    #[test]
    fn mtce_sel_3_writes_both_from_ra_and_ra_plus_1() {
        let mut cpu = new_cpu();
        let mut miu = Miu::new();
        cpu.set_gpr(4, 0x3333_3333);
        cpu.set_gpr(5, 0x4444_4444);
        execute(&mut cpu, &mut miu, Instr::Mtce { ra: 4, sel: 3 }, 0, 4);
        assert_eq!(cpu.cel, 0x3333_3333);
        assert_eq!(cpu.ceh, 0x4444_4444);
    }
}
