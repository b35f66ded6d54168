//! Unbounded non-negative integers for aggregation arithmetic.
//!
//! Rolled-up byte·second costs overflow 64 bits on petabyte-scale trees
//! (size · seconds ≈ 2^50 · 2^30), so every aggregate number is a `BigNum`.
//! The binary encoding is the minimum-width big-endian byte string; zero
//! encodes to the empty string.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;

/// A non-negative integer of unbounded magnitude.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BigNum(BigUint);

impl BigNum {
    /// Zero.
    pub fn new() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u64(v: u64) -> Self {
        Self(BigUint::from(v))
    }

    pub fn from_u128(v: u128) -> Self {
        Self(BigUint::from(v))
    }

    /// Convert a signed value; negative input is rejected.
    pub fn from_i64(v: i64) -> Option<Self> {
        if v < 0 {
            return None;
        }
        Some(Self(BigUint::from(v as u64)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add_assign(&mut self, other: &BigNum) {
        self.0 += &other.0;
    }

    pub fn mul(a: &BigNum, b: &BigNum) -> BigNum {
        Self(&a.0 * &b.0)
    }

    pub fn compare(&self, other: &BigNum) -> Ordering {
        self.0.cmp(&other.0)
    }

    /// Minimum-width big-endian bytes; zero is the empty string.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.0.is_zero() {
            return Vec::new();
        }
        self.0.to_bytes_be()
    }

    /// Inverse of [`to_bytes`]; the empty string decodes to zero.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }
}

impl fmt::Display for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_encodes_empty() {
        assert!(BigNum::new().is_zero());
        assert_eq!(BigNum::new().to_bytes(), Vec::<u8>::new());
        assert_eq!(BigNum::from_bytes(&[]), BigNum::new());
    }

    #[test]
    fn test_roundtrip() {
        for v in [1u64, 255, 256, 1 << 40, u64::MAX] {
            let n = BigNum::from_u64(v);
            assert_eq!(BigNum::from_bytes(&n.to_bytes()), n);
        }
    }

    #[test]
    fn test_minimum_width() {
        assert_eq!(BigNum::from_u64(1).to_bytes(), vec![1]);
        assert_eq!(BigNum::from_u64(256).to_bytes(), vec![1, 0]);
    }

    #[test]
    fn test_from_i64_rejects_negative() {
        assert!(BigNum::from_i64(-1).is_none());
        assert_eq!(BigNum::from_i64(7), Some(BigNum::from_u64(7)));
    }

    #[test]
    fn test_add_matches_encoding() {
        let mut a = BigNum::from_u64(u64::MAX);
        let b = BigNum::from_u64(u64::MAX);
        a.add_assign(&b);
        let expected = BigNum::from_u128(2 * (u64::MAX as u128));
        assert_eq!(a, expected);
        assert_eq!(BigNum::from_bytes(&a.to_bytes()), expected);
    }

    #[test]
    fn test_mul_exceeds_64_bits() {
        let size = BigNum::from_u64(1 << 50);
        let secs = BigNum::from_u64(1 << 30);
        let cost = BigNum::mul(&size, &secs);
        assert_eq!(cost, BigNum::from_u128(1u128 << 80));
    }

    #[test]
    fn test_compare() {
        let a = BigNum::from_u64(5);
        let b = BigNum::from_u64(9);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_display_decimal() {
        let cost = BigNum::mul(&BigNum::from_u64(100), &BigNum::from_u64(30000));
        assert_eq!(cost.to_string(), "3000000");
    }
}
