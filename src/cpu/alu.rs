//! Flag-computing arithmetic. Every operation here works entirely in the
//! unsigned-32 domain (invariant I1) and returns both the result and the
//! flags it would set; callers decide whether the flags are actually
//! committed (the `CU` bit, or "always" for compares).

use super::flags::Flags;

/// Result of an ALU operation paired with the flags it implies.
#[derive(Debug, Clone, Copy)]
pub struct AluResult {
    pub value: u32,
    pub flags: Flags,
}

fn nz(value: u32) -> (bool, bool) {
    (value >> 31 != 0, value == 0)
}

/// ADD with carry/overflow per §4.7: C = unsigned overflow, V = signed
/// overflow computed from the classic `~(a^b) & (a^result)` formula.
pub fn add(a: u32, b: u32) -> AluResult {
    let (value, carry) = a.overflowing_add(b);
    let (n, z) = nz(value);
    let v = ((!(a ^ b)) & (a ^ value)) >> 31 & 1 != 0;
    AluResult { value, flags: Flags { n, z, c: carry, v, t: false } }
}

/// ADDC: add with the incoming carry folded into the addend.
pub fn addc(a: u32, b: u32, carry_in: bool) -> AluResult {
    let (sum1, c1) = a.overflowing_add(b);
    let (value, c2) = sum1.overflowing_add(u32::from(carry_in));
    let (n, z) = nz(value);
    let v = ((!(a ^ b)) & (a ^ value)) >> 31 & 1 != 0;
    AluResult { value, flags: Flags { n, z, c: c1 || c2, v, t: false } }
}

/// SUB per §4.7: C = (a >= b) (no borrow), V from the subtract overflow
/// formula.
pub fn sub(a: u32, b: u32) -> AluResult {
    let value = a.wrapping_sub(b);
    let (n, z) = nz(value);
    let c = a >= b;
    let v = ((a ^ b) & !(value ^ b)) >> 31 & 1 != 0;
    AluResult { value, flags: Flags { n, z, c, v, t: false } }
}

/// SUBC: subtract with borrow = !C.
pub fn subc(a: u32, b: u32, carry_in: bool) -> AluResult {
    let borrow = u32::from(!carry_in);
    let value = a.wrapping_sub(b).wrapping_sub(borrow);
    let (n, z) = nz(value);
    let c = (a as u64) >= (b as u64) + (borrow as u64);
    let v = ((a ^ b) & !(value ^ b)) >> 31 & 1 != 0;
    AluResult { value, flags: Flags { n, z, c, v, t: false } }
}

/// NEG(a) is specified as SUB(0, a).
pub fn neg(a: u32) -> AluResult {
    sub(0, a)
}

/// AND/OR/XOR/NOT set N/Z only; C and V are left false (these are logical,
/// not arithmetic, ops).
pub fn and(a: u32, b: u32) -> AluResult {
    logical(a & b)
}
pub fn or(a: u32, b: u32) -> AluResult {
    logical(a | b)
}
pub fn xor(a: u32, b: u32) -> AluResult {
    logical(a ^ b)
}
pub fn not(a: u32) -> AluResult {
    logical(!a)
}
fn logical(value: u32) -> AluResult {
    let (n, z) = nz(value);
    AluResult { value, flags: Flags { n, z, c: false, v: false, t: false } }
}

/// SLL: logical shift left, zero fill. Shift amount masked to 5 bits.
pub fn sll(a: u32, shift: u32) -> AluResult {
    logical(a.wrapping_shl(shift & 0x1F))
}

/// SRL: logical shift right, zero fill.
pub fn srl(a: u32, shift: u32) -> AluResult {
    logical(a.wrapping_shr(shift & 0x1F))
}

/// SRA: arithmetic shift right, sign-preserving.
pub fn sra(a: u32, shift: u32) -> AluResult {
    logical(((a as i32).wrapping_shr(shift & 0x1F)) as u32)
}

/// ROR: rotate right.
pub fn ror(a: u32, shift: u32) -> AluResult {
    logical(a.rotate_right(shift & 0x1F))
}

/// ROL: rotate left.
pub fn rol(a: u32, shift: u32) -> AluResult {
    logical(a.rotate_left(shift & 0x1F))
}

/// RORC: rotate right through the carry flag (33-bit rotation).
pub fn rorc(a: u32, shift: u32, carry_in: bool) -> AluResult {
    let s = shift & 0x1F;
    if s == 0 {
        return logical(a);
    }
    let wide = ((u64::from(carry_in) << 32) | u64::from(a)) & 0x1_FFFF_FFFF;
    let rotated = (wide >> s) | (wide << (33 - s));
    let rotated = rotated & 0x1_FFFF_FFFF;
    logical((rotated & 0xFFFF_FFFF) as u32)
}

/// ROLC: rotate left through the carry flag (33-bit rotation).
pub fn rolc(a: u32, shift: u32, carry_in: bool) -> AluResult {
    let s = shift & 0x1F;
    if s == 0 {
        return logical(a);
    }
    let wide = ((u64::from(carry_in) << 32) | u64::from(a)) & 0x1_FFFF_FFFF;
    let rotated = (wide << s) | (wide >> (33 - s));
    let rotated = rotated & 0x1_FFFF_FFFF;
    logical((rotated & 0xFFFF_FFFF) as u32)
}

/// Sign-extend the low 8 bits of `a` into a full 32-bit value.
pub fn extsb(a: u32) -> AluResult {
    logical((a as i8) as i32 as u32)
}
/// Sign-extend the low 16 bits of `a`.
pub fn extsh(a: u32) -> AluResult {
    logical((a as i16) as i32 as u32)
}
/// Zero-extend the low 8 bits of `a`.
pub fn extzb(a: u32) -> AluResult {
    logical(a & 0xFF)
}
/// Zero-extend the low 16 bits of `a`.
pub fn extzh(a: u32) -> AluResult {
    logical(a & 0xFFFF)
}

/// BITCLR/BITSET/BITTGL modify bit `b[bit & 0x1F]` of `a`.
pub fn bitclr(a: u32, bit: u32) -> AluResult {
    logical(a & !(1u32 << (bit & 0x1F)))
}
pub fn bitset(a: u32, bit: u32) -> AluResult {
    logical(a | (1u32 << (bit & 0x1F)))
}
pub fn bittgl(a: u32, bit: u32) -> AluResult {
    logical(a ^ (1u32 << (bit & 0x1F)))
}

/// BITTST: T = bit set, Z = !T. Value is unchanged (test-only, no write).
pub fn bittst(a: u32, bit: u32) -> Flags {
    let set = (a & (1u32 << (bit & 0x1F))) != 0;
    Flags { n: false, z: !set, c: false, v: false, t: set }
}

/// Signed 32x32 multiply into a 64-bit product, split CEH:CEL.
pub fn mul_signed(a: u32, b: u32) -> (u32, u32) {
    let product = (a as i32 as i64).wrapping_mul(b as i32 as i64) as u64;
    ((product & 0xFFFF_FFFF) as u32, (product >> 32) as u32)
}

/// Unsigned 32x32 multiply into a 64-bit product, split CEH:CEL.
pub fn mul_unsigned(a: u32, b: u32) -> (u32, u32) {
    let product = u64::from(a) * u64::from(b);
    ((product & 0xFFFF_FFFF) as u32, (product >> 32) as u32)
}

/// Signed division truncating toward zero. Returns `None` for division by
/// zero (caller leaves CEL/CEH unchanged, per §7/§4.7).
pub fn div_signed(a: u32, b: u32) -> Option<(u32, u32)> {
    if b == 0 {
        return None;
    }
    let (a, b) = (a as i32, b as i32);
    if a == i32::MIN && b == -1 {
        // overflow case; wrapping semantics keep this total.
        return Some((a as u32, 0));
    }
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    Some((q as u32, r as u32))
}

/// Unsigned division. Returns `None` for division by zero.
pub fn div_unsigned(a: u32, b: u32) -> Option<(u32, u32)> {
    if b == 0 {
        return None;
    }
    Some((a / b, a % b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_basic_flags() {
        let r = add(1, 1);
        assert_eq!(r.value, 2);
        assert!(!r.flags.c);
        assert!(!r.flags.z);
        assert!(!r.flags.n);
    }

    #[test]
    fn add_unsigned_overflow_sets_carry() {
        let r = add(0xFFFF_FFFF, 1);
        assert_eq!(r.value, 0);
        assert!(r.flags.c);
        assert!(r.flags.z);
    }

    #[test]
    fn add_signed_overflow_sets_v() {
        // INT_MAX + 1 overflows signed range but not unsigned.
        let r = add(0x7FFF_FFFF, 1);
        assert_eq!(r.value, 0x8000_0000);
        assert!(!r.flags.c);
        assert!(r.flags.v);
        assert!(r.flags.n);
    }

    #[test]
    fn sub_equal_operands_yields_p2_invariant() {
        for u in [0u32, 1, 0xFFFF_FFFF, 0x8000_0000, 42] {
            let r = sub(u, u);
            assert_eq!(r.value, 0);
            assert!(r.flags.z);
            assert!(!r.flags.n);
            assert!(r.flags.c);
            assert!(!r.flags.v);
        }
    }

    #[test]
    fn sll_matches_wrapping_shift() {
        for s in 0..32u32 {
            let u = 0x1234_5678u32;
            let r = sll(u, s);
            assert_eq!(r.value, u.wrapping_shl(s));
        }
    }

    #[test]
    fn sra_preserves_sign_bit() {
        let r = sra(0x8000_0000, 4);
        assert_eq!(r.value, 0xF800_0000);
        assert_eq!(r.value >> 31, 1);
    }

    #[test]
    fn ror_rol_are_inverses() {
        for s in 0..32u32 {
            let u = 0xDEAD_BEEFu32;
            let rolled = rol(u, s).value;
            assert_eq!(ror(rolled, s).value, u);
        }
    }

    #[test]
    fn div_by_zero_is_none() {
        assert!(div_signed(10, 0).is_none());
        assert!(div_unsigned(10, 0).is_none());
    }

    #[test]
    fn div_signed_truncates_toward_zero() {
        assert_eq!(div_signed((-7i32) as u32, 2), Some(((-3i32) as u32, (-1i32) as u32)));
    }

    #[test]
    fn mul_signed_splits_64_bit_product() {
        let (lo, hi) = mul_signed((-2i32) as u32, 3);
        let product = ((hi as u64) << 32 | lo as u64) as i64;
        assert_eq!(product, -6);
    }

    #[test]
    fn bittst_sets_t_and_inverse_z() {
        let f = bittst(0b100, 2);
        assert!(f.t);
        assert!(!f.z);
        let f2 = bittst(0b100, 1);
        assert!(!f2.t);
        assert!(f2.z);
    }
}
