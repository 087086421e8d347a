//! Host numeric formats used in IBM i record layouts.
//!
//! - **Zoned decimal** (DDS data type `S`): one digit per byte, sign in the
//!   zone nibble of the last byte.
//! - **Packed decimal** (DDS data type `P`): two digits per byte, sign in
//!   the low nibble of the last byte.
//! - **Binary** (DDS data type `B`): big-endian two's complement integers.

mod binary;
mod packed;
mod zoned;

pub use binary::{decode_binary, encode_binary};
pub use packed::{pack_decimal, packed_length, unpack_decimal};
pub use zoned::{unzone_decimal, zone_decimal};

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::EncodingError;
use crate::Result;

/// Sign carried by a zoned or packed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Nibbles 0xA, 0xC, 0xE, 0xF.
    Positive,
    /// Nibbles 0xB, 0xD.
    Negative,
}

impl Sign {
    /// Classify a sign nibble.
    pub fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble & 0x0F {
            0x0A | 0x0C | 0x0E | 0x0F => Ok(Sign::Positive),
            0x0B | 0x0D => Ok(Sign::Negative),
            other => Err(EncodingError::ConversionFailed {
                message: format!("invalid sign nibble 0x{:X}", other),
            }),
        }
    }

    /// The nibble IBM i writes for this sign: 0xF positive, 0xD negative.
    pub fn preferred_nibble(self) -> u8 {
        match self {
            Sign::Positive => 0x0F,
            Sign::Negative => 0x0D,
        }
    }
}

/// Split a value into its sign and exactly `digits` decimal digits with
/// `scale` of them after the point. Excess fraction digits are truncated.
pub(crate) fn to_digits(value: &Decimal, digits: usize, scale: u32) -> Result<(Sign, Vec<u8>)> {
    let sign = if value.is_sign_negative() && !value.is_zero() {
        Sign::Negative
    } else {
        Sign::Positive
    };
    let mut scaled = value.abs().round_dp_with_strategy(scale, RoundingStrategy::ToZero);
    scaled.rescale(scale);
    let mut mantissa = scaled.mantissa().unsigned_abs();

    let mut out = vec![0u8; digits];
    for slot in out.iter_mut().rev() {
        *slot = (mantissa % 10) as u8;
        mantissa /= 10;
    }
    if mantissa != 0 {
        return Err(EncodingError::Overflow {
            value: value.to_string(),
            digits,
        });
    }
    Ok((sign, out))
}

/// Rebuild a decimal from its digits, sign and scale.
pub(crate) fn from_digits(sign: Sign, digits: &[u8], scale: u32) -> Result<Decimal> {
    let mut mantissa: i128 = 0;
    for &d in digits {
        if d > 9 {
            return Err(EncodingError::ConversionFailed {
                message: format!("invalid digit nibble 0x{:X}", d),
            });
        }
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(d)))
            .ok_or_else(|| EncodingError::ConversionFailed {
                message: format!("{} digits exceed decimal precision", digits.len()),
            })?;
    }
    if sign == Sign::Negative {
        mantissa = -mantissa;
    }
    Decimal::try_from_i128_with_scale(mantissa, scale).map_err(|e| {
        EncodingError::ConversionFailed {
            message: format!("cannot represent {} digits at scale {}: {}", digits.len(), scale, e),
        }
    })
}
