//! DDM (Distributed Data Management) object parsing and building.
//!
//! DDM objects are the units carried inside DSS segments. They follow a TLV
//! (Type-Length-Value) format:
//!
//! ```text
//! Offset  Len  Field
//! 0       2    Total length (big-endian, includes the 4-byte header)
//! 2       2    Code point (big-endian, identifies the object type)
//! 4       N    Payload (may contain nested DDM parameters)
//! ```
//!
//! Record buffers can exceed the 15-bit length field. Such objects use the
//! extended form, where the length field is `0x8008` and a 4-byte payload
//! length follows the code point:
//!
//! ```text
//! 0       2    0x8008
//! 2       2    Code point
//! 4       4    Payload length (big-endian)
//! 8       N    Payload
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{RlaError, RlaResult};

/// Minimum DDM header length.
pub const DDM_HEADER_LEN: usize = 4;
/// Header length of the extended form.
pub const DDM_EXTENDED_HEADER_LEN: usize = 8;
/// Largest payload the plain header can describe.
pub const DDM_MAX_PLAIN_PAYLOAD: usize = 0x7FFF - DDM_HEADER_LEN;
/// Length field value announcing a 4-byte extended length.
const DDM_EXTENDED_MARKER: u16 = 0x8008;

/// A parsed DDM object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdmObject {
    /// Code point identifying this DDM object type.
    pub code_point: u16,
    /// Raw payload bytes (may contain nested DDM parameters).
    pub payload: Vec<u8>,
}

impl DdmObject {
    /// Create a new DDM object with the given code point and payload.
    pub fn new(code_point: u16, payload: Vec<u8>) -> Self {
        Self {
            code_point,
            payload,
        }
    }

    /// Create an empty DDM object (header only, no payload).
    pub fn empty(code_point: u16) -> Self {
        Self {
            code_point,
            payload: Vec::new(),
        }
    }

    /// Parse nested DDM parameters from this object's payload.
    pub fn parse_params(&self) -> RlaResult<Vec<DdmObject>> {
        parse_ddm_list(&self.payload)
    }

    /// Find a parameter by code point within this object's payload.
    pub fn find_param(&self, code_point: u16) -> RlaResult<Option<DdmObject>> {
        let params = self.parse_params()?;
        Ok(params.into_iter().find(|p| p.code_point == code_point))
    }

    /// Get a parameter's raw payload bytes.
    pub fn get_raw_param(&self, code_point: u16) -> RlaResult<Option<Vec<u8>>> {
        Ok(self.find_param(code_point)?.map(|p| p.payload))
    }

    /// Get a parameter's payload as a u16 value.
    pub fn get_u16_param(&self, code_point: u16) -> RlaResult<Option<u16>> {
        match self.find_param(code_point)? {
            Some(param) if param.payload.len() >= 2 => Ok(Some(u16::from_be_bytes([
                param.payload[0],
                param.payload[1],
            ]))),
            _ => Ok(None),
        }
    }

    /// Serialize this DDM object to bytes.
    ///
    /// Payloads too large for the plain header use the extended form when
    /// `allow_extended` is set; otherwise they are rejected.
    pub fn serialize(&self, allow_extended: bool) -> RlaResult<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.total_len());
        if self.payload.len() > DDM_MAX_PLAIN_PAYLOAD {
            if !allow_extended {
                return Err(RlaError::invalid(
                    "payload",
                    format!(
                        "{} bytes exceeds {} and large buffers are disabled",
                        self.payload.len(),
                        DDM_MAX_PLAIN_PAYLOAD
                    ),
                ));
            }
            buf.put_u16(DDM_EXTENDED_MARKER);
            buf.put_u16(self.code_point);
            buf.put_u32(self.payload.len() as u32);
        } else {
            buf.put_u16((DDM_HEADER_LEN + self.payload.len()) as u16);
            buf.put_u16(self.code_point);
        }
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Total serialized length including header.
    pub fn total_len(&self) -> usize {
        if self.payload.len() > DDM_MAX_PLAIN_PAYLOAD {
            DDM_EXTENDED_HEADER_LEN + self.payload.len()
        } else {
            DDM_HEADER_LEN + self.payload.len()
        }
    }
}

/// Parse the first DDM object from a byte slice.
/// Returns the object and the number of bytes consumed.
pub fn parse_ddm(data: &[u8]) -> RlaResult<(DdmObject, usize)> {
    if data.len() < DDM_HEADER_LEN {
        return Err(RlaError::InvalidDdm(format!(
            "DDM data too short: {} bytes, need at least {}",
            data.len(),
            DDM_HEADER_LEN
        )));
    }

    let mut cursor = data;
    let length = cursor.get_u16();
    let code_point = cursor.get_u16();

    let (header_len, payload_len) = if length == DDM_EXTENDED_MARKER {
        if cursor.remaining() < 4 {
            return Err(RlaError::InvalidDdm(
                "extended DDM header truncated".to_string(),
            ));
        }
        (DDM_EXTENDED_HEADER_LEN, cursor.get_u32() as usize)
    } else {
        let length = length as usize;
        if length < DDM_HEADER_LEN {
            return Err(RlaError::InvalidDdm(format!(
                "DDM length {} is less than header size {}",
                length, DDM_HEADER_LEN
            )));
        }
        (DDM_HEADER_LEN, length - DDM_HEADER_LEN)
    };

    let total = header_len + payload_len;
    if total > data.len() {
        return Err(RlaError::InvalidDdm(format!(
            "DDM length {} exceeds available data {}",
            total,
            data.len()
        )));
    }

    let payload = data[header_len..total].to_vec();
    Ok((DdmObject { code_point, payload }, total))
}

/// Parse all DDM objects from a byte slice (DSS payload or nested params).
pub fn parse_ddm_list(data: &[u8]) -> RlaResult<Vec<DdmObject>> {
    let mut objects = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        if data.len() - offset < DDM_HEADER_LEN {
            break;
        }
        let (obj, consumed) = parse_ddm(&data[offset..])?;
        objects.push(obj);
        offset += consumed;
    }

    Ok(objects)
}

/// Builder for constructing DDM objects with nested parameters.
pub struct DdmBuilder {
    code_point: u16,
    payload: BytesMut,
}

impl DdmBuilder {
    /// Create a new builder for the given code point.
    pub fn new(code_point: u16) -> Self {
        Self {
            code_point,
            payload: BytesMut::new(),
        }
    }

    /// Add a nested DDM parameter with raw bytes.
    pub fn add_param(mut self, code_point: u16, data: &[u8]) -> Self {
        let len = (DDM_HEADER_LEN + data.len()) as u16;
        self.payload.put_u16(len);
        self.payload.put_u16(code_point);
        self.payload.extend_from_slice(data);
        self
    }

    /// Add a nested DDM parameter with a u16 value.
    pub fn add_u16_param(self, code_point: u16, value: u16) -> Self {
        self.add_param(code_point, &value.to_be_bytes())
    }

    /// Add a nested DDM parameter with a u32 value.
    pub fn add_u32_param(self, code_point: u16, value: u32) -> Self {
        self.add_param(code_point, &value.to_be_bytes())
    }

    /// Build the final DDM object.
    pub fn build(self) -> DdmObject {
        DdmObject {
            code_point: self.code_point,
            payload: self.payload.to_vec(),
        }
    }
}
