//! Zoned decimal.
//!
//! `+123` in a 5-digit field is `F0 F0 F1 F2 F3`; `-123` is
//! `F0 F0 F1 F2 D3`.

use rust_decimal::Decimal;

use super::{from_digits, to_digits, Sign};
use crate::error::EncodingError;
use crate::Result;

/// Encode `value` as `digits` zoned bytes with `scale` implied fraction digits.
pub fn zone_decimal(value: &Decimal, digits: usize, scale: u32) -> Result<Vec<u8>> {
    let (sign, ds) = to_digits(value, digits, scale)?;
    let mut out: Vec<u8> = ds.iter().map(|d| 0xF0 | d).collect();
    if let Some(last) = out.last_mut() {
        *last = (sign.preferred_nibble() << 4) | (*last & 0x0F);
    }
    Ok(out)
}

/// Decode zoned bytes with `scale` implied fraction digits.
pub fn unzone_decimal(bytes: &[u8], scale: u32) -> Result<Decimal> {
    let Some(&last) = bytes.last() else {
        return Err(EncodingError::ConversionFailed {
            message: "empty zoned decimal".to_string(),
        });
    };
    let sign = Sign::from_nibble(last >> 4)?;
    let digits: Vec<u8> = bytes.iter().map(|b| b & 0x0F).collect();
    from_digits(sign, &digits, scale)
}
