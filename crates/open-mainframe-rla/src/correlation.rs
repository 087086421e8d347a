//! Correlation IDs and declared names for the remote strategy.
//!
//! Both are process-wide counters in practice, but they are plain values
//! here: whoever builds the remote strategy decides how widely to share them
//! by handing out an `Arc`.

use std::sync::Mutex;

use open_mainframe_encoding::CodePage;

use crate::error::{RlaError, RlaResult};

/// Highest correlation ID handed out before wrapping.
pub const MAX_CORRELATION_ID: u16 = 0x7FFE;

/// Length of a declared name on the wire.
pub const DECLARED_NAME_LEN: usize = 8;

/// Wrapping 15-bit correlation ID allocator.
///
/// Yields `1..=0x7FFE` and then starts again at 1. Zero means "no
/// correlation" to the host and 0x7FFF is never produced.
#[derive(Debug, Default)]
pub struct CorrelationIds {
    last: Mutex<u16>,
}

impl CorrelationIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the sequence after `last`; the next call returns `last + 1`
    /// (or 1 when that would leave the range).
    pub fn starting_after(last: u16) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    /// Allocate the next correlation ID.
    pub fn next(&self) -> u16 {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = if *last >= MAX_CORRELATION_ID { 1 } else { *last + 1 };
        *last
    }
}

/// Allocator of 8-byte declared names, one per remotely opened file.
#[derive(Debug, Default)]
pub struct DeclaredNames {
    counter: Mutex<u64>,
}

impl DeclaredNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next declared name: the counter in decimal, blank padded
    /// to eight characters and encoded in `page`.
    pub fn next(&self, page: &CodePage) -> RlaResult<[u8; DECLARED_NAME_LEN]> {
        let value = {
            let mut counter = match self.counter.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *counter = (*counter + 1) % 100_000_000;
            *counter
        };
        let bytes = page.encode_padded(&value.to_string(), DECLARED_NAME_LEN)?;
        bytes
            .try_into()
            .map_err(|_| RlaError::Internal("declared name is not 8 bytes".to_string()))
    }
}
