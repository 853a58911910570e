//! Instruction-word field access.
//!
//! Encodings are documented as inclusive bit fields written high bit first,
//! `inst[15:13]` or `imm[10:5]`, and the immediates are reassembled from
//! scattered fields followed by a sign extension from whatever bit ends up
//! topmost. ['Bits'] follows that notation directly so a decoder or encoder
//! reads like the field diagram it implements.

/// Field extraction and construction over integer instruction words.
pub trait Bits: Sized {
    /// Extract a single bit.
    fn bit(self, n: usize) -> bool;

    /// Extract the inclusive field `[hi:lo]`, right-aligned.
    #[must_use]
    fn bits(self, hi: usize, lo: usize) -> Self;

    /// Set or clear a single bit.
    #[must_use]
    fn set_bit(self, n: usize, val: bool) -> Self;

    /// Place the low bits of `val` into the inclusive field `[hi:lo]`.
    #[must_use]
    fn set_bits(self, hi: usize, lo: usize, val: Self) -> Self;

    /// Sign-extend downward from `sign`, the top bit of a reassembled
    /// immediate.
    #[must_use]
    fn sign_extend(self, sign: usize) -> Self;
}

macro_rules! impl_bits {
    ($t:ty, $signed:ty) => {
        impl Bits for $t {
            fn bit(self, n: usize) -> bool {
                self >> n & 1 == 1
            }

            fn bits(self, hi: usize, lo: usize) -> Self {
                debug_assert!(lo <= hi && hi < <$t>::BITS as usize);
                self >> lo & !(!0 << (hi - lo + 1))
            }

            fn set_bit(self, n: usize, val: bool) -> Self {
                if val {
                    self | 1 << n
                } else {
                    self & !(1 << n)
                }
            }

            fn set_bits(self, hi: usize, lo: usize, val: Self) -> Self {
                debug_assert!(lo <= hi && hi < <$t>::BITS as usize);
                let field = !(!0 << (hi - lo + 1)) << lo;
                self & !field | val << lo & field
            }

            fn sign_extend(self, sign: usize) -> Self {
                let shift = <$t>::BITS as usize - 1 - sign;
                ((self << shift) as $signed >> shift) as $t
            }
        }
    }
}

impl_bits!(u8, i8);
impl_bits!(u16, i16);
impl_bits!(u32, i32);
impl_bits!(i32, i32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_of_an_encoded_word() {
        // addi a0, zero, 5
        let word = 0x0050_0513_u32;
        assert_eq!(word.bits(6, 0), 0x13);
        assert_eq!(word.bits(11, 7), 10);
        assert_eq!(word.bits(14, 12), 0);
        assert_eq!(word.bits(31, 20), 5);
        assert!(!word.bit(31));
    }

    #[test]
    fn building_a_word_from_fields() {
        // The same addi, assembled field by field.
        let word = 0_u32
            .set_bits(6, 0, 0x13)
            .set_bits(11, 7, 10)
            .set_bits(31, 20, 5);
        assert_eq!(word, 0x0050_0513);

        // Placed values are masked to the field width.
        assert_eq!(0_u16.set_bits(4, 3, 0xff), 0b11000);
        assert_eq!(0x18_u16.set_bits(4, 3, 0), 0);
    }

    #[test]
    fn single_bits() {
        assert_eq!(0_u32.set_bit(12, true), 0x1000);
        assert_eq!(0x1000_u32.set_bit(12, false), 0);
        assert!(0x1000_u32.bit(12));
    }

    #[test]
    fn immediate_sign_extension() {
        // A 12-bit immediate of -1.
        assert_eq!(0xfff_u32.sign_extend(11) as i32, -1);
        assert_eq!(0x7ff_u32.sign_extend(11), 0x7ff);
        // An 18-bit one, as the compressed lui carries.
        assert_eq!(0x2_0000_u32.sign_extend(17) as i32, -131072);
        assert_eq!(0b10_0000_u16.sign_extend(5) as i16, -32);
    }
}
