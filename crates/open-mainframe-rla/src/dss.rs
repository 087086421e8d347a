//! DSS (Data Stream Structure) frame parsing and serialization.
//!
//! Every DDM request and reply is wrapped in one or more DSS segments. Each
//! segment has a 6-byte header followed by payload data (DDM objects).
//!
//! ```text
//! Offset  Len  Field
//! 0       2    Total length (big-endian, includes the 6-byte header)
//! 2       1    Magic byte: 0xD0
//! 3       1    Format flags (DSS type in low nibble, chain/continue bits)
//! 4       2    Correlation ID (big-endian)
//! ```
//!
//! A segment is at most 32767 bytes. A larger payload sets the high bit of
//! the length field (`0xFFFF`) and continues in follow-on pieces, each with
//! a 2-byte length prefix whose high bit says whether another piece follows:
//!
//! ```text
//! FF FF D0 fmt corr  <32761 bytes>
//! 80 00|len          <len - 2 bytes>     high bit set: more follow
//! 00 00|len          <len - 2 bytes>     high bit clear: last piece
//! ```

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::code_points::*;
use crate::error::{RlaError, RlaResult};

/// Minimum DSS header length.
pub const DSS_HEADER_LEN: usize = 6;
/// Maximum DSS segment size.
pub const DSS_MAX_LENGTH: usize = 32767;
/// Length-field bit announcing continuation pieces.
const DSS_CONTINUED_BIT: u16 = 0x8000;
/// Length prefix of a continuation piece.
const CONTINUATION_HEADER_LEN: usize = 2;

/// A parsed DSS segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DssSegment {
    /// DSS type (request=1, reply=2, object=3).
    pub dss_type: u8,
    /// Whether this segment is chained to the next (more DSS segments follow).
    pub chained: bool,
    /// Whether the next chained segment has the same correlation ID.
    /// Only meaningful when `chained` is true.
    pub same_correlator: bool,
    /// Continue-on-error flag.
    pub continue_on_error: bool,
    /// Correlation ID.
    pub correlation_id: u16,
    /// Payload bytes (DDM objects).
    pub payload: BytesMut,
}

impl DssSegment {
    /// Create a new request DSS segment.
    pub fn new_request(correlation_id: u16, payload: BytesMut) -> Self {
        Self {
            dss_type: DSS_TYPE_REQUEST,
            chained: false,
            same_correlator: false,
            continue_on_error: false,
            correlation_id,
            payload,
        }
    }

    /// Create a new reply DSS segment.
    pub fn new_reply(correlation_id: u16, payload: BytesMut) -> Self {
        Self {
            dss_type: DSS_TYPE_REPLY,
            ..Self::new_request(correlation_id, payload)
        }
    }

    /// Create a new object DSS segment (record buffers).
    pub fn new_object(correlation_id: u16, payload: BytesMut) -> Self {
        Self {
            dss_type: DSS_TYPE_OBJECT,
            ..Self::new_request(correlation_id, payload)
        }
    }

    /// Mark this segment as chained to a follower with the same correlator.
    pub fn chained_same_correlator(mut self) -> Self {
        self.chained = true;
        self.same_correlator = true;
        self
    }

    /// Mark this segment as chained to a follower.
    pub fn chained(mut self) -> Self {
        self.chained = true;
        self
    }

    fn format_byte(&self) -> u8 {
        let mut format = self.dss_type & 0x0F;
        if self.chained {
            format |= DSS_CHAIN_BIT;
        }
        if self.same_correlator {
            format |= DSS_SAME_CORRELATOR_BIT;
        }
        if self.continue_on_error {
            format |= DSS_CONTINUE_BIT;
        }
        format
    }

    /// Serialize this DSS segment to bytes, splitting oversize payloads
    /// into continuation pieces.
    pub fn serialize(&self) -> BytesMut {
        let first_capacity = DSS_MAX_LENGTH - DSS_HEADER_LEN;
        let mut buf = BytesMut::with_capacity(DSS_HEADER_LEN + self.payload.len() + 16);

        if self.payload.len() <= first_capacity {
            buf.put_u16((DSS_HEADER_LEN + self.payload.len()) as u16);
            buf.put_u8(DSS_MAGIC);
            buf.put_u8(self.format_byte());
            buf.put_u16(self.correlation_id);
            buf.extend_from_slice(&self.payload);
            return buf;
        }

        buf.put_u16(DSS_CONTINUED_BIT | DSS_MAX_LENGTH as u16);
        buf.put_u8(DSS_MAGIC);
        buf.put_u8(self.format_byte());
        buf.put_u16(self.correlation_id);
        buf.extend_from_slice(&self.payload[..first_capacity]);

        let piece_capacity = DSS_MAX_LENGTH - CONTINUATION_HEADER_LEN;
        let mut rest = &self.payload[first_capacity..];
        while !rest.is_empty() {
            let take = rest.len().min(piece_capacity);
            let more = rest.len() > take;
            let mut len = (CONTINUATION_HEADER_LEN + take) as u16;
            if more {
                len |= DSS_CONTINUED_BIT;
            }
            buf.put_u16(len);
            buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
        }
        buf
    }
}

fn read_exact_or_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> RlaResult<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(RlaError::ConnectionDropped),
        Err(e) => Err(RlaError::Io(e)),
    }
}

/// Read a DSS segment, reassembling continuation pieces.
pub fn read_dss<R: Read>(reader: &mut R) -> RlaResult<DssSegment> {
    let mut header = [0u8; DSS_HEADER_LEN];
    read_exact_or_closed(reader, &mut header)?;

    let mut hdr = &header[..];
    let raw_length = hdr.get_u16();
    let magic = hdr.get_u8();
    let format = hdr.get_u8();
    let correlation_id = hdr.get_u16();

    if magic != DSS_MAGIC {
        return Err(RlaError::InvalidDss(format!(
            "Expected magic 0xD0, got 0x{:02X}",
            magic
        )));
    }

    let mut continued = raw_length & DSS_CONTINUED_BIT != 0;
    let length = (raw_length & !DSS_CONTINUED_BIT) as usize;
    if length < DSS_HEADER_LEN {
        return Err(RlaError::InvalidDss(format!(
            "DSS length {} is less than header size {}",
            length, DSS_HEADER_LEN
        )));
    }

    let mut payload = BytesMut::zeroed(length - DSS_HEADER_LEN);
    read_exact_or_closed(reader, &mut payload)?;

    while continued {
        let mut piece_header = [0u8; CONTINUATION_HEADER_LEN];
        read_exact_or_closed(reader, &mut piece_header)?;
        let raw = u16::from_be_bytes(piece_header);
        continued = raw & DSS_CONTINUED_BIT != 0;
        let piece_len = (raw & !DSS_CONTINUED_BIT) as usize;
        if piece_len < CONTINUATION_HEADER_LEN {
            return Err(RlaError::InvalidDss(format!(
                "continuation length {} is less than its header",
                piece_len
            )));
        }
        let start = payload.len();
        payload.resize(start + piece_len - CONTINUATION_HEADER_LEN, 0);
        read_exact_or_closed(reader, &mut payload[start..])?;
    }

    Ok(DssSegment {
        dss_type: format & 0x0F,
        chained: format & DSS_CHAIN_BIT != 0,
        same_correlator: format & DSS_SAME_CORRELATOR_BIT != 0,
        continue_on_error: format & DSS_CONTINUE_BIT != 0,
        correlation_id,
        payload,
    })
}

/// Write several DSS segments as one write followed by a flush.
pub fn write_dss_chain<W: Write>(writer: &mut W, segments: &[DssSegment]) -> RlaResult<()> {
    let mut buf = BytesMut::new();
    for segment in segments {
        buf.extend_from_slice(&segment.serialize());
    }
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let seg = DssSegment::new_request(7, BytesMut::from(&[1u8, 2][..])).chained_same_correlator();
        let bytes = seg.serialize();
        assert_eq!(&bytes[..], &[0x00, 0x08, 0xD0, 0x51, 0x00, 0x07, 1, 2]);
    }

    #[test]
    fn test_read_back() {
        let seg = DssSegment::new_object(3, BytesMut::from(&b"abc"[..])).chained();
        let bytes = seg.serialize();
        let parsed = read_dss(&mut Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(parsed, seg);
    }

    #[test]
    fn test_continuation_pieces() {
        let payload: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        let seg = DssSegment::new_object(9, BytesMut::from(&payload[..]));
        let bytes = seg.serialize();
        assert_eq!(&bytes[..2], &[0xFF, 0xFF]);
        // 32761 in the first segment, then a full 32765 piece with the
        // continuation bit, then the 4474 byte tail.
        let second = DSS_MAX_LENGTH;
        assert_eq!(&bytes[second..second + 2], &[0xFF, 0xFF]);
        let third = second + DSS_MAX_LENGTH;
        assert_eq!(
            u16::from_be_bytes([bytes[third], bytes[third + 1]]) as usize,
            2 + 70_000 - 32_761 - 32_765
        );
        let parsed = read_dss(&mut Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(&parsed.payload[..], &payload[..]);
        assert_eq!(parsed.correlation_id, 9);
    }

    #[test]
    fn test_bad_magic() {
        let data = [0x00, 0x06, 0xD1, 0x02, 0x00, 0x01];
        let err = read_dss(&mut Cursor::new(data.to_vec())).unwrap_err();
        assert!(matches!(err, RlaError::InvalidDss(_)));
    }

    #[test]
    fn test_eof_is_connection_dropped() {
        let data = [0x00, 0x10, 0xD0];
        let err = read_dss(&mut Cursor::new(data.to_vec())).unwrap_err();
        assert!(matches!(err, RlaError::ConnectionDropped));
    }

    #[test]
    fn test_write_chain() {
        let mut out = Vec::new();
        let a = DssSegment::new_request(1, BytesMut::new()).chained_same_correlator();
        let b = DssSegment::new_object(1, BytesMut::from(&[9u8][..]));
        write_dss_chain(&mut out, &[a, b]).unwrap();
        assert_eq!(out.len(), 6 + 7);
    }
}
