//! Host data encodings for IBM i record-level access.
//!
//! - **EBCDIC**: CCSID 37 and 500 single-byte code pages
//! - **Zoned decimal**: one digit per byte, sign in the last zone nibble
//! - **Packed decimal**: two digits per byte, sign in the last nibble
//! - **Binary**: big-endian 2, 4 and 8 byte integers
//!
//! # Example
//!
//! ```rust
//! use open_mainframe_encoding::ebcdic::CP037;
//! use open_mainframe_encoding::decimal::{pack_decimal, unpack_decimal};
//! use rust_decimal::Decimal;
//!
//! let ebcdic = CP037.encode("QGPL").unwrap();
//! assert_eq!(CP037.decode(&ebcdic), "QGPL");
//!
//! let value = Decimal::new(12345, 2);
//! let packed = pack_decimal(&value, 7, 2).unwrap();
//! assert_eq!(unpack_decimal(&packed, 2).unwrap(), value);
//! ```

pub mod decimal;
pub mod ebcdic;
pub mod error;

pub use decimal::{
    decode_binary, encode_binary, pack_decimal, packed_length, unpack_decimal, unzone_decimal,
    zone_decimal, Sign,
};
pub use ebcdic::{CodePage, CCSID_HEX, CP037, CP500};
pub use error::EncodingError;

/// Result type for encoding operations.
pub type Result<T> = std::result::Result<T, EncodingError>;
