//! Instruction decode for both the 32-bit and 16-bit S+core encodings.
//!
//! The bit layout chosen for each 32-bit form is this implementation's
//! resolution of the open question the distilled spec leaves unpinned (see
//! DESIGN.md): every form packs its fields contiguously, MSB-first, into the
//! 27 bits remaining after the 5-bit `OP` field, which keeps decode and the
//! (non-normative) disassembler reading the same layout. The 16-bit compact
//! forms (`OP` 0x18..0x1F) are decoded as two independent half-instructions,
//! low half first, exactly as DESIGN.md records.

/// A fully decoded instruction, independent of its original encoding width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    // ---- SP-form (OP=0x00) ----
    Alu3 { op: AluOp3, rd: u8, ra: u8, rb: u8, cu: bool },
    Cmp { ra: u8, rb: u8, cc: u8 },
    CmpZ { ra: u8, cc: u8 },
    Shift { op: ShiftOp, rd: u8, ra: u8, rb: u8, cu: bool },
    ExtOrBit { op: ExtBitOp, rd: u8, ra: u8, rb: u8 },
    MulDiv { op: MulDivOp, ra: u8, rb: u8 },
    Mv { rd: u8, ra: u8 },
    Mfce { rd: u8, sel: u8 },
    Mtce { ra: u8, sel: u8 },
    BrReg { cc: u8, ra: u8, link: bool },

    // ---- I-form (OP=0x01 sign-extend / 0x05 shift-left-16) ----
    ImmOp { op: ImmOp3, rd: u8, imm: i32, upper: bool },
    CmpImm { rd_as_imm: u8, imm: i32, cc: u8 },

    // ---- J-form (OP=0x02) ----
    // `absolute` distinguishes the 32-bit J-form's page-relative absolute
    // target ((PC & 0xFE000000) | (disp24 << 1)) from the 16-bit compact
    // jump's PC-relative target (disp carries a sign, `absolute` is false).
    Jump { disp24: i32, link: bool, absolute: bool },

    // ---- RIX-form (OP=0x03 writeback / 0x07 no writeback) ----
    MemRix { rd: u8, ra: u8, disp: i32, kind: MemOp, writeback: bool },

    // ---- B-form (OP=0x04) ----
    Branch { cc: u8, disp22: i32, link: bool },

    // ---- CR-form (OP=0x06) ----
    Mfcr { rd: u8, cra: u8 },
    Mtcr { rd: u8, cra: u8 },
    Rte,

    // ---- ADDRI/ANDRI/ORRI-form (OP=0x08..0x0F) ----
    ImmRegOp { op: ImmRegOp3, rd: u8, ra: u8, imm: i32 },

    // ---- Memory-form (OP=0x10..0x17) ----
    Mem { rd: u8, ra: u8, imm: i32, kind: MemOp },

    // ---- State registers (via CR-form's sibling mfsr/mtsr encoding) ----
    Mfsr { rd: u8, srb: u8 },
    Mtsr { srb: u8, ra: u8 },

    /// Unrecognized OP or sub-function: raises the invalid-instruction trap.
    Invalid,

    /// A legal 16-bit NOP-shaped half (used for the all-zero instruction).
    Nop16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp3 { Add, Addc, Sub, Subc, Neg, And, Or, Xor, Not }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp { Sll, Srl, Sra, Ror, Rol, Rorc, Rolc }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtBitOp { Extsb, Extsh, Extzb, Extzh, Bitclr, Bitset, Bittgl, Bittst }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulDivOp { Mul, Mulu, Div, Divu }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmOp3 { Ldi, Addi, Andi, Ori, Xori }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmRegOp3 { Addri, Andri, Orri }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp { Lb, Lbu, Lh, Lhu, Lw, Sb, Sh, Sw }

/// SP-form function-code assignment (func6, 6 bits).
mod func6 {
    pub const ADD: u32 = 0x00;
    pub const ADDC: u32 = 0x01;
    pub const SUB: u32 = 0x02;
    pub const SUBC: u32 = 0x03;
    pub const NEG: u32 = 0x04;
    pub const CMP: u32 = 0x05;
    pub const CMPZ: u32 = 0x06;
    pub const AND: u32 = 0x07;
    pub const OR: u32 = 0x08;
    pub const XOR: u32 = 0x09;
    pub const NOT: u32 = 0x0A;
    pub const SLL: u32 = 0x0B;
    pub const SRL: u32 = 0x0C;
    pub const SRA: u32 = 0x0D;
    pub const ROR: u32 = 0x0E;
    pub const ROL: u32 = 0x0F;
    pub const RORC: u32 = 0x10;
    pub const ROLC: u32 = 0x11;
    pub const MUL: u32 = 0x12;
    pub const MULU: u32 = 0x13;
    pub const DIV: u32 = 0x14;
    pub const DIVU: u32 = 0x15;
    pub const EXTSB: u32 = 0x16;
    pub const EXTSH: u32 = 0x17;
    pub const EXTZB: u32 = 0x18;
    pub const EXTZH: u32 = 0x19;
    pub const BITCLR: u32 = 0x1A;
    pub const BITSET: u32 = 0x1B;
    pub const BITTGL: u32 = 0x1C;
    pub const BITTST: u32 = 0x1D;
    pub const MV: u32 = 0x1E;
    pub const MFCE: u32 = 0x1F;
    pub const MTCE: u32 = 0x20;
    pub const BR: u32 = 0x21;
    pub const MFSR: u32 = 0x22;
    pub const MTSR: u32 = 0x23;
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

fn field(word: u32, hi: u32, lo: u32) -> u32 {
    let width = hi - lo + 1;
    (word >> lo) & ((1u32 << width) - 1)
}

fn mem_op_from_bits(bits: u32) -> Option<MemOp> {
    Some(match bits & 0x7 {
        0 => MemOp::Lb,
        1 => MemOp::Lbu,
        2 => MemOp::Lh,
        3 => MemOp::Lhu,
        4 => MemOp::Lw,
        5 => MemOp::Sb,
        6 => MemOp::Sh,
        7 => MemOp::Sw,
        _ => return None,
    })
}

/// Decode one 32-bit instruction word.
pub fn decode32(word: u32) -> Instr {
    let op = field(word, 31, 27);
    match op {
        0x00 => decode_sp(word),
        0x01 | 0x05 => decode_i(word, op == 0x05),
        0x02 => {
            let link = field(word, 26, 26) != 0;
            // Raw, unsigned: the target formula masks in PC's own high bits
            // rather than sign-extending this field.
            let disp24 = field(word, 25, 2) as i32;
            Instr::Jump { disp24, link, absolute: true }
        }
        0x03 | 0x07 => {
            let rd = field(word, 26, 22) as u8;
            let ra = field(word, 21, 17) as u8;
            let func3 = field(word, 16, 14);
            let disp = sign_extend(field(word, 13, 2), 12);
            match mem_op_from_bits(func3) {
                Some(kind) => Instr::MemRix { rd, ra, disp, kind, writeback: op == 0x03 },
                None => Instr::Invalid,
            }
        }
        0x04 => {
            let cc = field(word, 26, 23) as u8;
            let disp22 = sign_extend(field(word, 22, 1), 22);
            let link = field(word, 0, 0) != 0;
            Instr::Branch { cc, disp22, link }
        }
        0x06 => decode_cr(word),
        0x08..=0x0F => {
            let rd = field(word, 26, 22) as u8;
            let ra = field(word, 21, 17) as u8;
            let imm = sign_extend(field(word, 16, 3), 14);
            let sub = op & 0x7;
            let op3 = match sub {
                0 => ImmRegOp3::Addri,
                1 => ImmRegOp3::Andri,
                2 => ImmRegOp3::Orri,
                _ => return Instr::Invalid,
            };
            Instr::ImmRegOp { op: op3, rd, ra, imm }
        }
        0x10..=0x17 => {
            let rd = field(word, 26, 22) as u8;
            let ra = field(word, 21, 17) as u8;
            let imm = sign_extend(field(word, 16, 2), 15);
            match mem_op_from_bits(op & 0x7) {
                Some(kind) => Instr::Mem { rd, ra, imm, kind },
                None => Instr::Invalid,
            }
        }
        0x18..=0x1F => {
            // Handled by the caller via decode16 on each half; decode32 is
            // never asked to produce a single Instr for this range.
            Instr::Invalid
        }
        _ => Instr::Invalid,
    }
}

fn decode_sp(word: u32) -> Instr {
    let rd = field(word, 26, 22) as u8;
    let ra = field(word, 21, 17) as u8;
    let rb = field(word, 16, 12) as u8;
    let func = field(word, 11, 6);
    let cu = field(word, 5, 5) != 0;
    match func {
        func6::ADD => Instr::Alu3 { op: AluOp3::Add, rd, ra, rb, cu },
        func6::ADDC => Instr::Alu3 { op: AluOp3::Addc, rd, ra, rb, cu },
        func6::SUB => Instr::Alu3 { op: AluOp3::Sub, rd, ra, rb, cu },
        func6::SUBC => Instr::Alu3 { op: AluOp3::Subc, rd, ra, rb, cu },
        func6::NEG => Instr::Alu3 { op: AluOp3::Neg, rd, ra, rb, cu },
        func6::AND => Instr::Alu3 { op: AluOp3::And, rd, ra, rb, cu },
        func6::OR => Instr::Alu3 { op: AluOp3::Or, rd, ra, rb, cu },
        func6::XOR => Instr::Alu3 { op: AluOp3::Xor, rd, ra, rb, cu },
        func6::NOT => Instr::Alu3 { op: AluOp3::Not, rd, ra, rb, cu },
        func6::CMP => Instr::Cmp { ra, rb, cc: rd & 0xF },
        func6::CMPZ => Instr::CmpZ { ra, cc: rd & 0xF },
        func6::SLL => Instr::Shift { op: ShiftOp::Sll, rd, ra, rb, cu },
        func6::SRL => Instr::Shift { op: ShiftOp::Srl, rd, ra, rb, cu },
        func6::SRA => Instr::Shift { op: ShiftOp::Sra, rd, ra, rb, cu },
        func6::ROR => Instr::Shift { op: ShiftOp::Ror, rd, ra, rb, cu },
        func6::ROL => Instr::Shift { op: ShiftOp::Rol, rd, ra, rb, cu },
        func6::RORC => Instr::Shift { op: ShiftOp::Rorc, rd, ra, rb, cu },
        func6::ROLC => Instr::Shift { op: ShiftOp::Rolc, rd, ra, rb, cu },
        func6::MUL => Instr::MulDiv { op: MulDivOp::Mul, ra, rb },
        func6::MULU => Instr::MulDiv { op: MulDivOp::Mulu, ra, rb },
        func6::DIV => Instr::MulDiv { op: MulDivOp::Div, ra, rb },
        func6::DIVU => Instr::MulDiv { op: MulDivOp::Divu, ra, rb },
        func6::EXTSB => Instr::ExtOrBit { op: ExtBitOp::Extsb, rd, ra, rb },
        func6::EXTSH => Instr::ExtOrBit { op: ExtBitOp::Extsh, rd, ra, rb },
        func6::EXTZB => Instr::ExtOrBit { op: ExtBitOp::Extzb, rd, ra, rb },
        func6::EXTZH => Instr::ExtOrBit { op: ExtBitOp::Extzh, rd, ra, rb },
        func6::BITCLR => Instr::ExtOrBit { op: ExtBitOp::Bitclr, rd, ra, rb },
        func6::BITSET => Instr::ExtOrBit { op: ExtBitOp::Bitset, rd, ra, rb },
        func6::BITTGL => Instr::ExtOrBit { op: ExtBitOp::Bittgl, rd, ra, rb },
        func6::BITTST => Instr::ExtOrBit { op: ExtBitOp::Bittst, rd, ra, rb },
        func6::MV => Instr::Mv { rd, ra },
        func6::MFCE => Instr::Mfce { rd, sel: rb as u8 & 0x3 },
        func6::MTCE => Instr::Mtce { ra, sel: rb as u8 & 0x3 },
        func6::BR => Instr::BrReg { cc: rd & 0xF, ra, link: (rd >> 4) & 1 != 0 },
        func6::MFSR => Instr::Mfsr { rd, srb: rb },
        func6::MTSR => Instr::Mtsr { srb: rb, ra },
        _ => Instr::Invalid,
    }
}

fn decode_i(word: u32, upper: bool) -> Instr {
    let rd = field(word, 26, 22) as u8;
    let func3 = field(word, 21, 19);
    let imm16 = field(word, 15, 0);
    let imm = if upper {
        (imm16 << 16) as i32
    } else {
        sign_extend(imm16, 16)
    };
    match func3 {
        0 => Instr::ImmOp { op: ImmOp3::Ldi, rd, imm, upper },
        1 => Instr::ImmOp { op: ImmOp3::Addi, rd, imm, upper },
        2 => Instr::ImmOp { op: ImmOp3::Andi, rd, imm, upper },
        3 => Instr::ImmOp { op: ImmOp3::Ori, rd, imm, upper },
        4 => Instr::ImmOp { op: ImmOp3::Xori, rd, imm, upper },
        5 => Instr::CmpImm { rd_as_imm: rd, imm, cc: field(word, 18, 16) as u8 },
        _ => Instr::Invalid,
    }
}

fn decode_cr(word: u32) -> Instr {
    let rd = field(word, 26, 22) as u8;
    let cra = field(word, 21, 17) as u8;
    let subop = field(word, 16, 9);
    match subop {
        0x00 => Instr::Mfcr { rd, cra },
        0x01 => Instr::Mtcr { rd, cra },
        0x84 => Instr::Rte,
        _ => Instr::Invalid,
    }
}

/// Decode one 16-bit half-instruction. The top 3 bits select one of eight
/// formats (§4.7): move/branch, CE-transfer, ALU/stack, direct jump,
/// conditional branch, load-immediate, shift/bit, stack-pointer-relative
/// load/store.
pub fn decode16(half: u16) -> Instr {
    let h = half as u32;
    let fmt = field(h, 15, 13);
    match fmt {
        0 => {
            // move/branch
            if h == 0 {
                return Instr::Nop16;
            }
            let is_branch = field(h, 12, 12) != 0;
            if is_branch {
                let cc = field(h, 11, 8) as u8;
                let ra = field(h, 7, 4) as u8;
                Instr::BrReg { cc, ra, link: false }
            } else {
                let rd = field(h, 11, 8) as u8;
                let ra = field(h, 7, 4) as u8;
                Instr::Mv { rd, ra }
            }
        }
        1 => {
            // CE-transfer: mfce16 (bit12=0) / mtce16 (bit12=1)
            let to_ce = field(h, 12, 12) != 0;
            let reg = field(h, 11, 7) as u8;
            let sel = field(h, 6, 5) as u8;
            if to_ce {
                Instr::Mtce { ra: reg, sel }
            } else {
                Instr::Mfce { rd: reg, sel }
            }
        }
        2 => {
            // ALU/stack: op2[11:9] in {add=0,sub=1,cmp=2}, rd[8:4], imm4[3:0]
            let op2 = field(h, 12, 11);
            let rd = field(h, 8, 4) as u8;
            let imm = sign_extend(field(h, 3, 0), 4);
            match op2 {
                0 => Instr::ImmOp { op: ImmOp3::Addi, rd, imm, upper: false },
                1 => Instr::ImmOp { op: ImmOp3::Addi, rd, imm: -imm, upper: false },
                _ => Instr::CmpImm { rd_as_imm: 0xF, imm, cc: 0xF },
            }
        }
        3 => {
            // direct jump16: disp13 << 1, no link
            let disp13 = sign_extend(field(h, 12, 0), 13);
            Instr::Jump { disp24: disp13, link: false, absolute: false }
        }
        4 => {
            // conditional branch16: cc[12:9] disp9[8:0]
            let cc = field(h, 12, 9) as u8;
            let disp9 = sign_extend(field(h, 8, 0), 9);
            Instr::Branch { cc, disp22: disp9, link: false }
        }
        5 => {
            // load-immediate16: rd[12:8] imm8[7:0] zero-extended
            let rd = field(h, 12, 8) as u8;
            let imm = field(h, 7, 0) as i32;
            Instr::ImmOp { op: ImmOp3::Ldi, rd, imm, upper: false }
        }
        6 => {
            // shift/bit16: rd[11:7] amt[6:2] op2[1:0]
            let rd = field(h, 11, 7) as u8;
            let amt = field(h, 6, 2) as u8;
            let op2 = field(h, 1, 0);
            let op = match op2 {
                0 => ShiftOp::Sll,
                1 => ShiftOp::Srl,
                2 => ShiftOp::Sra,
                _ => ShiftOp::Ror,
            };
            Instr::Shift { op, rd, ra: rd, rb: amt, cu: true }
        }
        7 => {
            // stack-pointer-relative load/store16: ls[12] rd[11:7] imm7[6:0]
            let is_store = field(h, 12, 12) != 0;
            let rd = field(h, 11, 7) as u8;
            let imm = (field(h, 6, 0) as i32) * 4;
            let kind = if is_store { MemOp::Sw } else { MemOp::Lw };
            Instr::MemRix { rd, ra: 29, disp: imm, kind, writeback: false }
        }
        _ => Instr::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(rd: u32, ra: u32, rb: u32, func6: u32, cu: bool) -> u32 {
        (rd << 22) | (ra << 17) | (rb << 12) | (func6 << 6) | (u32::from(cu) << 5)
    }

    #[test]
    fn all_zero_word_is_harmless_add() {
        match decode32(0) {
            Instr::Alu3 { op: AluOp3::Add, rd: 0, ra: 0, rb: 0, cu: false } => {}
            other => panic!("expected inert ADD r0,r0,r0, got {other:?}"),
        }
    }

    #[test]
    fn decodes_add_with_flags() {
        let w = sp(1, 2, 3, func6::ADD, true);
        assert_eq!(decode32(w), Instr::Alu3 { op: AluOp3::Add, rd: 1, ra: 2, rb: 3, cu: true });
    }

    #[test]
    fn decodes_cmp_with_condition_in_rd_field() {
        let w = sp(0xF, 5, 6, func6::CMP, false);
        assert_eq!(decode32(w), Instr::Cmp { ra: 5, rb: 6, cc: 0xF });
    }

    #[test]
    fn decodes_i_form_ldi_and_addi() {
        let ldi = (0x01u32 << 27) | (22u32 << 22) | (0u32 << 19) | 0x21;
        assert_eq!(decode32(ldi), Instr::ImmOp { op: ImmOp3::Ldi, rd: 22, imm: 0x21, upper: false });

        let addi = (0x01u32 << 27) | (22u32 << 22) | (1u32 << 19) | 0x21;
        assert_eq!(decode32(addi), Instr::ImmOp { op: ImmOp3::Addi, rd: 22, imm: 0x21, upper: false });
    }

    #[test]
    fn decodes_jump_target_formula_operands() {
        let w = (0x02u32 << 27) | (1u32 << 26) | (0x10u32 << 2);
        match decode32(w) {
            Instr::Jump { disp24, link, absolute } => {
                assert_eq!(disp24, 0x10);
                assert!(link);
                assert!(absolute);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn decodes_branch_form() {
        let w = (0x04u32 << 27) | (0xFu32 << 23) | (0x10u32 << 1) | 0;
        assert_eq!(decode32(w), Instr::Branch { cc: 0xF, disp22: 0x10, link: false });
    }

    #[test]
    fn decodes_memory_form_load_word() {
        let w = (0x14u32 << 27) | (3u32 << 22) | (4u32 << 17) | ((8i32 as u32 & 0x7FFF) << 2);
        assert_eq!(decode32(w), Instr::Mem { rd: 3, ra: 4, imm: 8, kind: MemOp::Lw });
    }

    #[test]
    fn decodes_cr_form_mtcr_and_rte() {
        let mtcr = (0x06u32 << 27) | (1u32 << 22) | (3u32 << 17) | (0x01 << 9);
        assert_eq!(decode32(mtcr), Instr::Mtcr { rd: 1, cra: 3 });
        let rte = (0x06u32 << 27) | (0x84 << 9);
        assert_eq!(decode32(rte), Instr::Rte);
    }

    #[test]
    fn invalid_func6_is_invalid() {
        let w = sp(0, 0, 0, 0x3F, false);
        assert_eq!(decode32(w), Instr::Invalid);
    }

    #[test]
    fn decode16_zero_half_is_nop() {
        assert_eq!(decode16(0), Instr::Nop16);
    }

    #[test]
    fn decode16_load_immediate_format() {
        // fmt=5 (101), rd=3, imm=0x21
        let half: u16 = (0b101 << 13) | (3 << 8) | 0x21;
        assert_eq!(decode16(half), Instr::ImmOp { op: ImmOp3::Ldi, rd: 3, imm: 0x21, upper: false });
    }
}
