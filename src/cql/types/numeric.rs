// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Arbitrary-precision integer and decimal values, carried as their wire
//! bytes rather than converted through a bignum library.

use std::fmt::Display;

/// A value of the CQL `varint` type: an arbitrary-precision integer stored
/// as minimal two's-complement big-endian bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CqlVarint(Vec<u8>);

impl CqlVarint {
    /// Wrap raw two's-complement bytes, normalizing to the minimal form.
    pub fn from_signed_bytes_be(bytes: Vec<u8>) -> Self {
        let mut bytes = bytes;
        // drop redundant sign-extension bytes
        while bytes.len() > 1 {
            match (bytes[0], bytes[1] & 0x80) {
                (0x00, 0) | (0xff, 0x80) => {
                    bytes.remove(0);
                }
                _ => break,
            }
        }
        if bytes.is_empty() {
            bytes.push(0);
        }
        CqlVarint(bytes)
    }

    /// The minimal two's-complement big-endian representation.
    pub fn as_signed_bytes_be(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Whether the value is negative.
    pub fn is_negative(&self) -> bool {
        self.0[0] & 0x80 != 0
    }

    /// Convert to an `i64` if the value fits.
    pub fn to_i64(&self) -> Option<i64> {
        if self.0.len() > 8 {
            return None;
        }
        let fill = if self.is_negative() { 0xff } else { 0x00 };
        let mut buf = [fill; 8];
        buf[8 - self.0.len()..].copy_from_slice(&self.0);
        Some(i64::from_be_bytes(buf))
    }
}

impl From<i64> for CqlVarint {
    fn from(value: i64) -> Self {
        Self::from_signed_bytes_be(value.to_be_bytes().to_vec())
    }
}

impl Display for CqlVarint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_i64() {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "0x{}", self.0.iter().map(|b| format!("{:02x}", b)).collect::<String>()),
        }
    }
}

/// A value of the CQL `decimal` type: an arbitrary-precision unscaled
/// mantissa and a base-10 scale. The numeric value is `unscaled * 10^-scale`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CqlDecimal {
    scale: i32,
    unscaled: CqlVarint,
}

impl CqlDecimal {
    pub fn new(scale: i32, unscaled: CqlVarint) -> Self {
        Self { scale, unscaled }
    }

    /// Build from an `i64` mantissa, e.g. `from_i64(12345, 2)` is `123.45`.
    pub fn from_i64(unscaled: i64, scale: i32) -> Self {
        Self {
            scale,
            unscaled: unscaled.into(),
        }
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn unscaled(&self) -> &CqlVarint {
        &self.unscaled
    }
}

impl Display for CqlDecimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}e-{}", self.unscaled, self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_minimal_form() {
        assert_eq!(CqlVarint::from(0).as_signed_bytes_be(), &[0x00]);
        assert_eq!(CqlVarint::from(1).as_signed_bytes_be(), &[0x01]);
        assert_eq!(CqlVarint::from(-1).as_signed_bytes_be(), &[0xff]);
        assert_eq!(CqlVarint::from(127).as_signed_bytes_be(), &[0x7f]);
        assert_eq!(CqlVarint::from(128).as_signed_bytes_be(), &[0x00, 0x80]);
        assert_eq!(CqlVarint::from(-128).as_signed_bytes_be(), &[0x80]);
        assert_eq!(CqlVarint::from(-129).as_signed_bytes_be(), &[0xff, 0x7f]);
        assert_eq!(CqlVarint::from(256).as_signed_bytes_be(), &[0x01, 0x00]);
    }

    #[test]
    fn varint_i64_round_trip() {
        for value in [0i64, 1, -1, 127, 128, -128, -129, i64::MAX, i64::MIN] {
            assert_eq!(CqlVarint::from(value).to_i64(), Some(value));
        }
    }

    #[test]
    fn varint_normalization_matches_construction() {
        let padded = CqlVarint::from_signed_bytes_be(vec![0x00, 0x00, 0x7f]);
        assert_eq!(padded, CqlVarint::from(127));
        let negative = CqlVarint::from_signed_bytes_be(vec![0xff, 0xff, 0x80]);
        assert_eq!(negative, CqlVarint::from(-128));
    }

    #[test]
    fn wide_varint_has_no_i64() {
        let wide = CqlVarint::from_signed_bytes_be(vec![0x01; 9]);
        assert_eq!(wide.to_i64(), None);
    }

    #[test]
    fn decimal_accessors() {
        let decimal = CqlDecimal::from_i64(12345, 2);
        assert_eq!(decimal.scale(), 2);
        assert_eq!(decimal.unscaled().to_i64(), Some(12345));
    }
}
