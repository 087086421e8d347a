//! Packed decimal.
//!
//! A field of `n` digits occupies `n / 2 + 1` bytes. An even digit count
//! leaves the leading nibble zero. `+12345` in 5 digits is `12 34 5F`.

use rust_decimal::Decimal;

use super::{from_digits, to_digits, Sign};
use crate::error::EncodingError;
use crate::Result;

/// Byte length of a packed field with `digits` digits.
pub fn packed_length(digits: usize) -> usize {
    digits / 2 + 1
}

/// Encode `value` as a packed field of `digits` digits and `scale` fraction digits.
pub fn pack_decimal(value: &Decimal, digits: usize, scale: u32) -> Result<Vec<u8>> {
    let (sign, ds) = to_digits(value, digits, scale)?;
    // Nibble stream: optional leading zero, digits, sign.
    let mut nibbles = Vec::with_capacity(digits + 2);
    if digits % 2 == 0 {
        nibbles.push(0);
    }
    nibbles.extend_from_slice(&ds);
    nibbles.push(sign.preferred_nibble());
    Ok(nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

/// Decode a packed field with `scale` fraction digits.
pub fn unpack_decimal(bytes: &[u8], scale: u32) -> Result<Decimal> {
    let Some(&last) = bytes.last() else {
        return Err(EncodingError::ConversionFailed {
            message: "empty packed decimal".to_string(),
        });
    };
    let sign = Sign::from_nibble(last)?;
    let mut digits = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        digits.push(b >> 4);
        digits.push(b & 0x0F);
    }
    digits.pop();
    from_digits(sign, &digits, scale)
}
