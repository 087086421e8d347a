//! Option list (OPTL).
//!
//! Four bytes selecting what a get or update does:
//!
//! ```text
//! Byte  Meaning
//! 0     Positioning type (first, next, by key, ...)
//! 1     Share/lock mode
//! 2     Data presence (record data or I/O feedback only)
//! 3     Operation family (GET, GETD, GETK, UPDATE)
//! ```

/// Where the operation positions the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PositionType {
    First = 0x01,
    Last = 0x02,
    Next = 0x03,
    Previous = 0x04,
    RecordNumber = 0x08,
    KeyBefore = 0x09,
    KeyBeforeOrEqual = 0x0A,
    KeyEqual = 0x0B,
    KeyAfterOrEqual = 0x0C,
    KeyAfter = 0x0D,
    Same = 0x0E,
}

/// Record lock behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShareMode {
    /// Read, no lock kept.
    ReadReleased = 0x00,
    /// Read, lock kept.
    ReadHeld = 0x01,
    /// Read for update, lock released after the next operation.
    UpdateReleased = 0x02,
    /// Read for update, lock kept.
    UpdateHeld = 0x03,
}

/// Whether the reply carries record data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataPresence {
    RecordData = 0x10,
    FeedbackOnly = 0x11,
}

/// Operation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationCode {
    Get = 0x01,
    GetByRecordNumber = 0x02,
    GetByKey = 0x03,
    Update = 0x07,
}

/// Length of an encoded option list.
pub const OPTL_LEN: usize = 4;

/// Encode an option list.
pub fn encode_option_list(
    position: PositionType,
    share: ShareMode,
    data: DataPresence,
    operation: OperationCode,
) -> [u8; OPTL_LEN] {
    [position as u8, share as u8, data as u8, operation as u8]
}
