//! User file control block (UFCB): the parameters of an open.
//!
//! ```text
//! Offset  Len  Field
//! 0       10   File name
//! 10      10   Library name
//! 20      10   Member name
//! 30      1    Open type (0x01 read, 0x02 write, 0x0F read/write)
//! 31      1    Commit lock level
//! 32      2    Blocking factor
//! 34      10   Record format name
//! 44      1    Null-capable buffers requested (0xF1) or not (0xF0)
//! 45      1    Reserved
//! ```

use bytes::{Buf, BufMut, BytesMut};
use open_mainframe_encoding::CodePage;

use crate::codec::ctll::format_name_bytes;
use crate::config::{CommitLockLevel, OpenType};
use crate::error::{RlaError, RlaResult};
use crate::path::QsysPath;

/// Length of an encoded UFCB.
pub const UFCB_LEN: usize = 46;

/// Open parameters shared by both strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ufcb {
    pub path: QsysPath,
    pub open_type: OpenType,
    pub commit_lock_level: CommitLockLevel,
    pub blocking_factor: u16,
    pub format_name: String,
    pub null_capable: bool,
}

impl Ufcb {
    pub fn encode(&self, page: &CodePage) -> RlaResult<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(UFCB_LEN);
        buf.extend_from_slice(&page.encode_padded(&self.path.file, 10)?);
        buf.extend_from_slice(&page.encode_padded(&self.path.library, 10)?);
        buf.extend_from_slice(&page.encode_padded(&self.path.member, 10)?);
        buf.put_u8(self.open_type.code());
        buf.put_u8(self.commit_lock_level.code());
        buf.put_u16(self.blocking_factor);
        buf.extend_from_slice(&format_name_bytes(&self.format_name, page)?);
        buf.put_u8(if self.null_capable { 0xF1 } else { 0xF0 });
        buf.put_u8(0);
        Ok(buf.to_vec())
    }

    pub fn parse(data: &[u8], page: &CodePage) -> RlaResult<Self> {
        if data.len() < UFCB_LEN {
            return Err(RlaError::invalid(
                "ufcb",
                format!("{} bytes, need {}", data.len(), UFCB_LEN),
            ));
        }
        let name = |range: std::ops::Range<usize>| page.decode(&data[range]).trim_end().to_string();
        let path = QsysPath::new(&name(10..20), &name(0..10), &name(20..30))?;
        let mut cursor = &data[30..];
        let open_type = match cursor.get_u8() {
            0x01 => OpenType::ReadOnly,
            0x02 => OpenType::WriteOnly,
            _ => OpenType::ReadWrite,
        };
        let commit_lock_level = match cursor.get_u8() {
            0x01 => CommitLockLevel::Change,
            0x02 => CommitLockLevel::CursorStability,
            0x03 => CommitLockLevel::All,
            _ => CommitLockLevel::None,
        };
        let blocking_factor = cursor.get_u16();
        let format_name = name(34..44);
        let null_capable = data[44] == 0xF1;
        Ok(Self {
            path,
            open_type,
            commit_lock_level,
            blocking_factor,
            format_name,
            null_capable,
        })
    }
}
