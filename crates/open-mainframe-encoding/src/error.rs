//! Encoding error types.

use miette::Diagnostic;
use thiserror::Error;

/// Errors produced while converting between host and client representations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum EncodingError {
    /// Bytes or characters could not be converted.
    #[error("conversion failed: {message}")]
    #[diagnostic(code(encoding::conversion_failed))]
    ConversionFailed {
        /// What went wrong.
        message: String,
    },

    /// No code page is registered for the CCSID.
    #[error("unsupported CCSID {ccsid}")]
    #[diagnostic(
        code(encoding::invalid_code_page),
        help("supported single-byte CCSIDs are 37 and 500; 65535 means no conversion")
    )]
    InvalidCodePage {
        /// The requested CCSID.
        ccsid: u16,
    },

    /// A numeric value needs more digits than the field declares.
    #[error("value {value} does not fit in {digits} digits")]
    #[diagnostic(code(encoding::overflow))]
    Overflow {
        /// Textual form of the rejected value.
        value: String,
        /// Declared digit count.
        digits: usize,
    },
}
