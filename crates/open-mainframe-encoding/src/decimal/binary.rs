//! Big-endian two's complement integers of 2, 4 or 8 bytes.

use crate::error::EncodingError;
use crate::Result;

/// Encode `value` into `len` bytes.
pub fn encode_binary(value: i64, len: usize) -> Result<Vec<u8>> {
    let overflow = || EncodingError::Overflow {
        value: value.to_string(),
        digits: len * 8,
    };
    match len {
        2 => Ok(i16::try_from(value).map_err(|_| overflow())?.to_be_bytes().to_vec()),
        4 => Ok(i32::try_from(value).map_err(|_| overflow())?.to_be_bytes().to_vec()),
        8 => Ok(value.to_be_bytes().to_vec()),
        _ => Err(EncodingError::ConversionFailed {
            message: format!("binary fields are 2, 4 or 8 bytes, not {}", len),
        }),
    }
}

/// Decode a 2, 4 or 8 byte big-endian integer.
pub fn decode_binary(bytes: &[u8]) -> Result<i64> {
    match bytes.len() {
        2 => Ok(i64::from(i16::from_be_bytes([bytes[0], bytes[1]]))),
        4 => Ok(i64::from(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Ok(i64::from_be_bytes(raw))
        }
        n => Err(EncodingError::ConversionFailed {
            message: format!("binary fields are 2, 4 or 8 bytes, not {}", n),
        }),
    }
}
