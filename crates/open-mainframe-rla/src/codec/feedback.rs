//! Open feedback and I/O feedback areas.
//!
//! The open feedback area comes back once, from the open, and fixes the
//! layout of every record buffer for the life of the open file:
//!
//! ```text
//! Offset  Len  Field
//! 0       10   File name
//! 10      10   Library name
//! 20      10   Member name
//! 30      2    Record length
//! 32      2    Record increment (stride of one record in a buffer)
//! 34      2    Null map offset within one record slot
//! 36      1    Null capable (0xF1) or not (0xF0)
//! 37      1    File type (EBCDIC 'P' physical, 'L' logical)
//! 38      4    Records in the member
//! 42      2    Blocking factor the host settled on
//! 44      2    Number of fields
//! 46      2    Reserved
//! ```
//!
//! One record slot in a buffer:
//!
//! ```text
//! [0, reclen)             record data
//! [reclen, reclen + 2)    reserved
//! [reclen + 2, reclen + 6) relative record number
//! [null_map_offset, +n)   null map, one byte per field (null-capable only)
//! ```
//!
//! The I/O feedback area accompanies every data reply:
//!
//! ```text
//! 0       4    Records transferred
//! 4       4    Relative record number of the last record
//! 8       10   Record format name
//! 18      2    Reserved
//! ```

use bytes::{Buf, BufMut, BytesMut};
use open_mainframe_encoding::CodePage;

use crate::codec::ctll::format_name_bytes;
use crate::error::{RlaError, RlaResult};
use crate::path::QsysPath;
use crate::record::RecordFormat;

/// Length of the open feedback area.
pub const OPEN_FEEDBACK_LEN: usize = 48;
/// Length of the I/O feedback area.
pub const IO_FEEDBACK_LEN: usize = 20;
/// Gap between record data and its record number.
pub const RECORD_NUMBER_GAP: usize = 2;
/// Record number plus the gap before it.
pub const RECORD_TRAILER_LEN: usize = RECORD_NUMBER_GAP + 4;

const NAME_LEN: usize = 10;
const NULL_CAPABLE: u8 = 0xF1;
const NOT_NULL_CAPABLE: u8 = 0xF0;

/// Kind of database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Physical,
    Logical,
    Other(u8),
}

impl FileType {
    fn from_byte(b: u8) -> Self {
        match b {
            0xD7 => FileType::Physical,
            0xD3 => FileType::Logical,
            other => FileType::Other(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            FileType::Physical => 0xD7,
            FileType::Logical => 0xD3,
            FileType::Other(b) => b,
        }
    }
}

/// Everything the host said about an open file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFeedback {
    file: String,
    library: String,
    member: String,
    record_length: usize,
    record_increment: usize,
    null_map_offset: usize,
    null_capable: bool,
    file_type: FileType,
    record_count: u32,
    blocking_factor: u16,
    field_count: usize,
}

impl OpenFeedback {
    /// The layout a host produces for `format`: record data, the record
    /// number trailer, then the null map when any field allows null.
    pub fn for_format(path: &QsysPath, format: &RecordFormat, record_count: u32, blocking_factor: u16) -> Self {
        let record_length = format.record_length();
        let null_capable = format.is_null_capable();
        let null_map_offset = record_length + RECORD_TRAILER_LEN;
        let record_increment = if null_capable {
            null_map_offset + format.field_count()
        } else {
            null_map_offset
        };
        Self {
            file: path.file.clone(),
            library: path.library.clone(),
            member: path.member.clone(),
            record_length,
            record_increment,
            null_map_offset,
            null_capable,
            file_type: FileType::Physical,
            record_count,
            blocking_factor,
            field_count: format.field_count(),
        }
    }

    pub fn parse(data: &[u8], page: &CodePage) -> RlaResult<Self> {
        if data.len() < OPEN_FEEDBACK_LEN {
            return Err(RlaError::UnexpectedReply(format!(
                "open feedback is {} bytes, need {}",
                data.len(),
                OPEN_FEEDBACK_LEN
            )));
        }
        let name = |range: std::ops::Range<usize>| page.decode(&data[range]).trim_end().to_string();
        let file = name(0..10);
        let library = name(10..20);
        let member = name(20..30);
        let mut cursor = &data[30..];
        let record_length = cursor.get_u16() as usize;
        let record_increment = cursor.get_u16() as usize;
        let null_map_offset = cursor.get_u16() as usize;
        let null_capable = cursor.get_u8() == NULL_CAPABLE;
        let file_type = FileType::from_byte(cursor.get_u8());
        let record_count = cursor.get_u32();
        let blocking_factor = cursor.get_u16();
        let field_count = cursor.get_u16() as usize;

        let feedback = Self {
            file,
            library,
            member,
            record_length,
            record_increment,
            null_map_offset,
            null_capable,
            file_type,
            record_count,
            blocking_factor,
            field_count,
        };
        feedback.check_layout()?;
        Ok(feedback)
    }

    /// The record data, its trailer and the null map must all fit in one
    /// slot, and the map must not overlap the data.
    fn check_layout(&self) -> RlaResult<()> {
        if self.record_increment < self.record_length + RECORD_TRAILER_LEN {
            return Err(RlaError::UnexpectedReply(format!(
                "record increment {} too small for record length {}",
                self.record_increment, self.record_length
            )));
        }
        if self.null_capable
            && (self.null_map_offset < self.record_length + RECORD_TRAILER_LEN
                || self.null_map_offset + self.field_count > self.record_increment)
        {
            return Err(RlaError::UnexpectedReply(format!(
                "null map at {} for {} fields does not fit between record length {} and increment {}",
                self.null_map_offset, self.field_count, self.record_length, self.record_increment
            )));
        }
        Ok(())
    }

    pub fn encode(&self, page: &CodePage) -> RlaResult<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(OPEN_FEEDBACK_LEN);
        buf.extend_from_slice(&page.encode_padded(&self.file, NAME_LEN)?);
        buf.extend_from_slice(&page.encode_padded(&self.library, NAME_LEN)?);
        buf.extend_from_slice(&page.encode_padded(&self.member, NAME_LEN)?);
        buf.put_u16(self.record_length as u16);
        buf.put_u16(self.record_increment as u16);
        buf.put_u16(self.null_map_offset as u16);
        buf.put_u8(if self.null_capable { NULL_CAPABLE } else { NOT_NULL_CAPABLE });
        buf.put_u8(self.file_type.to_byte());
        buf.put_u32(self.record_count);
        buf.put_u16(self.blocking_factor);
        buf.put_u16(self.field_count as u16);
        buf.put_u16(0);
        Ok(buf.to_vec())
    }

    /// Override the null map offset, as a host of another release might.
    /// The new layout is checked the same way a parsed one is.
    pub fn with_null_map_offset(mut self, offset: usize, increment: usize) -> RlaResult<Self> {
        self.null_map_offset = offset;
        self.record_increment = increment;
        self.check_layout()?;
        Ok(self)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn record_length(&self) -> usize {
        self.record_length
    }

    pub fn record_increment(&self) -> usize {
        self.record_increment
    }

    pub fn null_map_offset(&self) -> usize {
        self.null_map_offset
    }

    /// Offset of the relative record number within a record slot.
    pub fn record_number_offset(&self) -> usize {
        self.record_length + RECORD_NUMBER_GAP
    }

    pub fn is_null_capable(&self) -> bool {
        self.null_capable
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    pub fn blocking_factor(&self) -> u16 {
        self.blocking_factor
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Bytes needed for `count` record slots.
    pub fn buffer_length(&self, count: usize) -> usize {
        count * self.record_increment
    }
}

/// Result of one data transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IoFeedback {
    pub records_transferred: u32,
    pub last_record_number: u32,
    pub format_name: String,
}

impl IoFeedback {
    pub fn parse(data: &[u8], page: &CodePage) -> RlaResult<Self> {
        if data.len() < IO_FEEDBACK_LEN {
            return Err(RlaError::UnexpectedReply(format!(
                "I/O feedback is {} bytes, need {}",
                data.len(),
                IO_FEEDBACK_LEN
            )));
        }
        let mut cursor = data;
        let records_transferred = cursor.get_u32();
        let last_record_number = cursor.get_u32();
        let format_name = page.decode(&cursor[..NAME_LEN]).trim_end().to_string();
        Ok(Self {
            records_transferred,
            last_record_number,
            format_name,
        })
    }

    pub fn encode(&self, page: &CodePage) -> RlaResult<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(IO_FEEDBACK_LEN);
        buf.put_u32(self.records_transferred);
        buf.put_u32(self.last_record_number);
        buf.extend_from_slice(&format_name_bytes(&self.format_name, page)?);
        buf.put_u16(0);
        Ok(buf.to_vec())
    }
}
