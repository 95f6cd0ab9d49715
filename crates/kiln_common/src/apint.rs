//! Arbitrary-width two-state integers for constants and constant folding.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A fixed-width vector of two-state bits, interpreted as signed or unsigned
/// by the operation that consumes it.
///
/// Bits are packed 64 per word, least significant word first. Bits above
/// `width` in the top word are always zero. A zero-width value is legal and
/// holds no words.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApInt {
    width: u32,
    words: Vec<u64>,
}

fn word_count(width: u32) -> usize {
    width.div_ceil(64) as usize
}

impl ApInt {
    /// Creates a zero value of the given width.
    pub fn zero(width: u32) -> Self {
        Self {
            width,
            words: vec![0; word_count(width)],
        }
    }

    /// Creates a value with every bit set.
    pub fn all_ones(width: u32) -> Self {
        let mut v = Self {
            width,
            words: vec![u64::MAX; word_count(width)],
        };
        v.normalize();
        v
    }

    /// Creates a value from a `u64`, truncated to `width` bits.
    pub fn from_u64(value: u64, width: u32) -> Self {
        let mut v = Self::zero(width);
        if let Some(w) = v.words.first_mut() {
            *w = value;
        }
        v.normalize();
        v
    }

    /// Creates a value from an `i64`, sign-extended or truncated to `width` bits.
    pub fn from_i64(value: i64, width: u32) -> Self {
        let fill = if value < 0 { u64::MAX } else { 0 };
        let mut v = Self {
            width,
            words: vec![fill; word_count(width)],
        };
        if let Some(w) = v.words.first_mut() {
            *w = value as u64;
        }
        v.normalize();
        v
    }

    fn normalize(&mut self) {
        let rem = self.width % 64;
        if rem != 0 {
            if let Some(top) = self.words.last_mut() {
                *top &= (1u64 << rem) - 1;
            }
        }
    }

    /// Returns the width in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns bit `index`; bits at or above the width read as zero.
    pub fn bit(&self, index: u32) -> bool {
        if index >= self.width {
            return false;
        }
        (self.words[(index / 64) as usize] >> (index % 64)) & 1 != 0
    }

    /// Sets bit `index`; writes at or above the width are ignored.
    pub fn set_bit(&mut self, index: u32, value: bool) {
        if index >= self.width {
            return;
        }
        let word = &mut self.words[(index / 64) as usize];
        let mask = 1u64 << (index % 64);
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// Returns `true` if every bit is clear.
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Returns `true` if every bit is set (vacuously true at width zero).
    pub fn is_all_ones(&self) -> bool {
        *self == Self::all_ones(self.width)
    }

    /// Returns the most significant bit, or `false` at width zero.
    pub fn sign_bit(&self) -> bool {
        self.width > 0 && self.bit(self.width - 1)
    }

    /// Returns the value as a `u64` if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.words.iter().skip(1).any(|w| *w != 0) {
            return None;
        }
        Some(self.words.first().copied().unwrap_or(0))
    }

    /// Number of bits up to and including the highest set bit.
    pub fn active_bits(&self) -> u32 {
        for (i, w) in self.words.iter().enumerate().rev() {
            if *w != 0 {
                return i as u32 * 64 + (64 - w.leading_zeros());
            }
        }
        0
    }

    /// Smallest width that holds this value read as unsigned (at least 1).
    pub fn min_unsigned_width(&self) -> u32 {
        self.active_bits().max(1)
    }

    /// Smallest width that holds this value read as signed (at least 1).
    pub fn min_signed_width(&self) -> u32 {
        if self.sign_bit() {
            self.not().active_bits() + 1
        } else {
            self.active_bits() + 1
        }
    }

    /// Zero- or sign-extends (or truncates) to `width` bits.
    pub fn resize(&self, width: u32, signed: bool) -> Self {
        let mut out = Self::zero(width);
        let n = word_count(width).min(self.words.len());
        out.words[..n].copy_from_slice(&self.words[..n]);
        out.normalize();
        if signed && self.sign_bit() && width > self.width {
            for i in self.width..width {
                out.set_bit(i, true);
            }
        }
        out
    }

    /// Bitwise complement.
    pub fn not(&self) -> Self {
        let mut out = Self {
            width: self.width,
            words: self.words.iter().map(|w| !w).collect(),
        };
        out.normalize();
        out
    }

    fn zip_words(&self, other: &Self, f: impl Fn(u64, u64) -> u64) -> Self {
        debug_assert_eq!(self.width, other.width, "operand widths must match");
        let mut out = Self {
            width: self.width,
            words: self
                .words
                .iter()
                .zip(&other.words)
                .map(|(a, b)| f(*a, *b))
                .collect(),
        };
        out.normalize();
        out
    }

    /// Bitwise AND of equal-width values.
    pub fn and(&self, other: &Self) -> Self {
        self.zip_words(other, |a, b| a & b)
    }

    /// Bitwise OR of equal-width values.
    pub fn or(&self, other: &Self) -> Self {
        self.zip_words(other, |a, b| a | b)
    }

    /// Bitwise XOR of equal-width values.
    pub fn xor(&self, other: &Self) -> Self {
        self.zip_words(other, |a, b| a ^ b)
    }

    /// Wrapping addition of equal-width values.
    pub fn add(&self, other: &Self) -> Self {
        debug_assert_eq!(self.width, other.width, "operand widths must match");
        let mut out = Self::zero(self.width);
        let mut carry = false;
        for (i, (a, b)) in self.words.iter().zip(&other.words).enumerate() {
            let (s1, c1) = a.overflowing_add(*b);
            let (s2, c2) = s1.overflowing_add(u64::from(carry));
            out.words[i] = s2;
            carry = c1 || c2;
        }
        out.normalize();
        out
    }

    /// Two's complement negation, wrapping at the current width.
    pub fn neg(&self) -> Self {
        self.not().add(&Self::from_u64(1, self.width))
    }

    /// Wrapping subtraction of equal-width values.
    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    /// Shifts left by `amount`, keeping the width (bits shifted out are lost).
    pub fn shl(&self, amount: u32) -> Self {
        let mut out = Self::zero(self.width);
        for i in amount..self.width {
            out.set_bit(i, self.bit(i - amount));
        }
        out
    }

    /// Logical right shift, keeping the width.
    pub fn lshr(&self, amount: u32) -> Self {
        let mut out = Self::zero(self.width);
        for i in 0..self.width {
            let src = i.saturating_add(amount);
            out.set_bit(i, src < self.width && self.bit(src));
        }
        out
    }

    /// Arithmetic right shift, keeping the width.
    pub fn ashr(&self, amount: u32) -> Self {
        let sign = self.sign_bit();
        let mut out = Self::zero(self.width);
        for i in 0..self.width {
            let src = i.saturating_add(amount);
            out.set_bit(i, if src < self.width { self.bit(src) } else { sign });
        }
        out
    }

    /// Extracts bits `hi..=lo` as a `hi - lo + 1`-bit value.
    pub fn extract(&self, hi: u32, lo: u32) -> Self {
        debug_assert!(hi >= lo, "extract range inverted");
        let mut out = Self::zero(hi - lo + 1);
        for i in lo..=hi {
            out.set_bit(i - lo, self.bit(i));
        }
        out
    }

    /// Concatenates `high` above `low`.
    pub fn concat(high: &Self, low: &Self) -> Self {
        let mut out = low.resize(high.width + low.width, false);
        for i in 0..high.width {
            out.set_bit(low.width + i, high.bit(i));
        }
        out
    }

    /// Compares two values as unsigned integers, regardless of width.
    pub fn ucmp(&self, other: &Self) -> Ordering {
        let n = self.words.len().max(other.words.len());
        for i in (0..n).rev() {
            let a = self.words.get(i).copied().unwrap_or(0);
            let b = other.words.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Compares two values as two's complement signed integers.
    pub fn scmp(&self, other: &Self) -> Ordering {
        let width = self.width.max(other.width);
        let a = self.resize(width, true);
        let b = other.resize(width, true);
        match (a.sign_bit(), b.sign_bit()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.ucmp(&b),
        }
    }
}

impl fmt::Display for ApInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'h", self.width)?;
        let mut digits = String::new();
        let nibbles = self.width.div_ceil(4).max(1);
        for n in (0..nibbles).rev() {
            let mut nibble = 0u8;
            for b in 0..4 {
                if self.bit(n * 4 + b) {
                    nibble |= 1 << b;
                }
            }
            digits.push(char::from_digit(u32::from(nibble), 16).unwrap_or('?'));
        }
        f.write_str(&digits)
    }
}

impl fmt::Debug for ApInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApInt({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mask(width: u32) -> u128 {
        if width >= 128 {
            u128::MAX
        } else {
            (1u128 << width) - 1
        }
    }

    fn from_u128(value: u128, width: u32) -> ApInt {
        let lo = ApInt::from_u64(value as u64, width);
        let hi = ApInt::from_u64((value >> 64) as u64, width).shl(64.min(width));
        lo.or(&hi)
    }

    #[test]
    fn zero_width_is_empty() {
        let z = ApInt::zero(0);
        assert!(z.is_zero());
        assert!(z.is_all_ones());
        assert_eq!(z.to_u64(), Some(0));
    }

    #[test]
    fn from_i64_sign_extends() {
        let v = ApInt::from_i64(-1, 70);
        assert!(v.is_all_ones());
        assert_eq!(v.active_bits(), 70);
    }

    #[test]
    fn resize_signed_and_unsigned() {
        let v = ApInt::from_u64(0b1010, 4);
        assert_eq!(v.resize(8, false).to_u64(), Some(0b0000_1010));
        assert_eq!(v.resize(8, true).to_u64(), Some(0b1111_1010));
        assert_eq!(v.resize(2, true).to_u64(), Some(0b10));
    }

    #[test]
    fn min_widths() {
        assert_eq!(ApInt::from_u64(0, 8).min_unsigned_width(), 1);
        assert_eq!(ApInt::from_u64(5, 8).min_unsigned_width(), 3);
        assert_eq!(ApInt::from_u64(5, 8).min_signed_width(), 4);
        assert_eq!(ApInt::from_i64(-1, 8).min_signed_width(), 1);
        assert_eq!(ApInt::from_i64(-4, 8).min_signed_width(), 3);
    }

    #[test]
    fn shifts() {
        let v = ApInt::from_u64(0b1001, 4);
        assert_eq!(v.shl(1).to_u64(), Some(0b0010));
        assert_eq!(v.lshr(3).to_u64(), Some(0b0001));
        assert_eq!(v.ashr(2).to_u64(), Some(0b1110));
        assert_eq!(v.ashr(9).to_u64(), Some(0b1111));
    }

    #[test]
    fn extract_and_concat() {
        let v = ApInt::from_u64(0b1101_0110, 8);
        assert_eq!(v.extract(6, 4).to_u64(), Some(0b101));
        let cat = ApInt::concat(&ApInt::from_u64(0b11, 2), &ApInt::from_u64(0b01, 3));
        assert_eq!(cat.width(), 5);
        assert_eq!(cat.to_u64(), Some(0b11_001));
    }

    #[test]
    fn signed_compare() {
        let neg = ApInt::from_i64(-2, 4);
        let pos = ApInt::from_u64(3, 4);
        assert_eq!(neg.scmp(&pos), Ordering::Less);
        assert_eq!(neg.ucmp(&pos), Ordering::Greater);
        assert_eq!(ApInt::from_i64(-1, 2).scmp(&ApInt::from_i64(-1, 8)), Ordering::Equal);
    }

    #[test]
    fn display_hex() {
        assert_eq!(format!("{}", ApInt::from_u64(0xab, 8)), "8'hab");
        assert_eq!(format!("{}", ApInt::from_u64(1, 3)), "3'h1");
    }

    proptest! {
        #[test]
        fn add_matches_u128(a: u128, b: u128, width in 1u32..=128) {
            let m = mask(width);
            let got = from_u128(a & m, width).add(&from_u128(b & m, width));
            prop_assert_eq!(got, from_u128(a.wrapping_add(b) & m, width));
        }

        #[test]
        fn sub_matches_u128(a: u128, b: u128, width in 1u32..=128) {
            let m = mask(width);
            let got = from_u128(a & m, width).sub(&from_u128(b & m, width));
            prop_assert_eq!(got, from_u128(a.wrapping_sub(b) & m, width));
        }

        #[test]
        fn bitwise_matches_u128(a: u128, b: u128, width in 1u32..=128) {
            let m = mask(width);
            let x = from_u128(a & m, width);
            let y = from_u128(b & m, width);
            prop_assert_eq!(x.and(&y), from_u128(a & b & m, width));
            prop_assert_eq!(x.or(&y), from_u128((a | b) & m, width));
            prop_assert_eq!(x.xor(&y), from_u128((a ^ b) & m, width));
            prop_assert_eq!(x.not(), from_u128(!a & m, width));
        }

        #[test]
        fn ucmp_matches_u128(a: u128, b: u128) {
            prop_assert_eq!(from_u128(a, 128).ucmp(&from_u128(b, 128)), a.cmp(&b));
        }
    }
}
