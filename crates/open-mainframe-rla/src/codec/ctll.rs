//! Control list (CTLL).
//!
//! A run of tagged entries closed by `0xFF`:
//!
//! ```text
//! Offset  Len  Field
//! 0       1    Entry ID
//! 1       2    Value length (big-endian)
//! 3       n    Value
//! ...
//! last    1    0xFF
//! ```

use bytes::BufMut;
use open_mainframe_encoding::CodePage;

use crate::error::RlaResult;

/// Terminator of a control list.
pub const CTLL_END: u8 = 0xFF;

/// Record-format names are 10 characters on the host.
pub const FORMAT_NAME_LEN: usize = 10;

const ID_RECORD_FORMAT: u8 = 0x01;
const ID_RECORD_NUMBER: u8 = 0x02;
const ID_KEY: u8 = 0x07;
const ID_KEY_FIELD_COUNT: u8 = 0x08;
const ID_MEMBER_NUMBER: u8 = 0x0E;
const ID_RECORD_COUNT: u8 = 0x10;

/// One control list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEntry {
    /// Record format name.
    RecordFormat(String),
    /// Relative record number.
    RecordNumber(u32),
    /// Serialized key bytes.
    Key(Vec<u8>),
    /// Number of key fields the key bytes cover.
    KeyFieldCount(u32),
    /// Member number within the file.
    MemberNumber(u16),
    /// Number of records to transfer (the blocking factor).
    RecordCount(u32),
}

/// Upper-case, blank pad and if needed truncate a record-format name.
pub fn format_name_bytes(name: &str, page: &CodePage) -> RlaResult<Vec<u8>> {
    let upper = name.to_ascii_uppercase();
    if upper.chars().count() > FORMAT_NAME_LEN {
        tracing::warn!(
            name = %upper,
            "record format name longer than {} characters, truncating",
            FORMAT_NAME_LEN
        );
    }
    Ok(page.encode_padded(&upper, FORMAT_NAME_LEN)?)
}

/// Encode a control list.
pub fn encode_control_list(entries: &[ControlEntry], page: &CodePage) -> RlaResult<Vec<u8>> {
    let mut buf = Vec::new();
    for entry in entries {
        let (id, value) = match entry {
            ControlEntry::RecordFormat(name) => (ID_RECORD_FORMAT, format_name_bytes(name, page)?),
            ControlEntry::RecordNumber(rrn) => (ID_RECORD_NUMBER, rrn.to_be_bytes().to_vec()),
            ControlEntry::Key(bytes) => (ID_KEY, bytes.clone()),
            ControlEntry::KeyFieldCount(n) => (ID_KEY_FIELD_COUNT, n.to_be_bytes().to_vec()),
            ControlEntry::MemberNumber(n) => (ID_MEMBER_NUMBER, n.to_be_bytes().to_vec()),
            ControlEntry::RecordCount(n) => (ID_RECORD_COUNT, n.to_be_bytes().to_vec()),
        };
        buf.put_u8(id);
        buf.put_u16(value.len() as u16);
        buf.extend_from_slice(&value);
    }
    buf.put_u8(CTLL_END);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use open_mainframe_encoding::CP037;

    #[test]
    fn test_empty_list() {
        assert_eq!(encode_control_list(&[], &CP037).unwrap(), vec![0xFF]);
    }

    #[test]
    fn test_entries() {
        let bytes = encode_control_list(
            &[
                ControlEntry::RecordFormat("cusrec".into()),
                ControlEntry::MemberNumber(0),
                ControlEntry::RecordCount(64),
            ],
            &CP037,
        )
        .unwrap();
        assert_eq!(&bytes[..3], &[0x01, 0x00, 0x0A]);
        assert_eq!(CP037.decode(&bytes[3..13]), "CUSREC    ");
        assert_eq!(&bytes[13..18], &[0x0E, 0x00, 0x02, 0x00, 0x00]);
        assert_eq!(&bytes[18..25], &[0x10, 0x00, 0x04, 0x00, 0x00, 0x00, 0x40]);
        assert_eq!(bytes[25], CTLL_END);
        assert_eq!(bytes.len(), 26);
    }

    #[test]
    fn test_long_format_name_truncated() {
        let bytes = format_name_bytes("AVERYLONGFORMATNAME", &CP037).unwrap();
        assert_eq!(CP037.decode(&bytes), "AVERYLONGF");
    }

    #[test]
    fn test_key_entry() {
        let bytes = encode_control_list(
            &[ControlEntry::Key(vec![0xC1, 0xC2]), ControlEntry::KeyFieldCount(1)],
            &CP037,
        )
        .unwrap();
        assert_eq!(
            bytes,
            vec![0x07, 0x00, 0x02, 0xC1, 0xC2, 0x08, 0x00, 0x04, 0, 0, 0, 1, 0xFF]
        );
    }
}
