//! Records and their field values.
//!
//! A [`Record`] holds one [`FieldValue`] per field of its [`RecordFormat`]
//! plus the relative record number the host assigned it. Conversion to and
//! from the host's positional layout lives here; the null map and record
//! number trailer that surround the data in a record buffer are handled by
//! [`crate::codec::batch`].

pub mod format;

use std::sync::Arc;

use open_mainframe_encoding::{
    decode_binary, encode_binary, pack_decimal, unpack_decimal, unzone_decimal, zone_decimal,
    CodePage, CCSID_HEX,
};
use rust_decimal::Decimal;

use crate::error::{RlaError, RlaResult};

pub use format::{FieldDescription, FieldKind, RecordFormat, VARLEN_PREFIX};

/// Pad byte of a fixed CCSID 65535 character field.
const HEX_TEXT_PAD: u8 = 0x40;

/// Value of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Integer(i64),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Integer(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        FieldValue::Decimal(d)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

/// Code page for a field's text, or `None` for CCSID 65535.
pub(crate) fn text_page(field: &FieldDescription, job_page: &'static CodePage) -> RlaResult<Option<&'static CodePage>> {
    match field.ccsid {
        Some(CCSID_HEX) => Ok(None),
        Some(ccsid) => Ok(Some(CodePage::from_ccsid(ccsid)?)),
        None => Ok(Some(job_page)),
    }
}

/// The value a field holds before it is set. Fixed-length byte fields
/// default to their full pad, which is what a decode of them returns.
fn default_value(field: &FieldDescription) -> FieldValue {
    match field.kind {
        FieldKind::Character { length, variable } if field.ccsid == Some(CCSID_HEX) => {
            FieldValue::Bytes(if variable { Vec::new() } else { vec![HEX_TEXT_PAD; length] })
        }
        FieldKind::Character { .. } => FieldValue::Text(String::new()),
        FieldKind::Hex { length, variable } => FieldValue::Bytes(if variable { Vec::new() } else { vec![0; length] }),
        FieldKind::Zoned { .. } | FieldKind::Packed { .. } => FieldValue::Decimal(Decimal::ZERO),
        FieldKind::Binary { .. } => FieldValue::Integer(0),
    }
}

/// Store a value in the form a decode of the same field produces, so a
/// record read back from the host compares equal to the one written.
fn canonical(field: &FieldDescription, value: FieldValue) -> FieldValue {
    match (field.kind, value) {
        (FieldKind::Zoned { .. } | FieldKind::Packed { .. }, FieldValue::Integer(i)) => {
            FieldValue::Decimal(Decimal::from(i))
        }
        (FieldKind::Character { variable: false, .. }, FieldValue::Text(mut s)) => {
            s.truncate(s.trim_end_matches(' ').len());
            FieldValue::Text(s)
        }
        (FieldKind::Character { length, variable: false }, FieldValue::Bytes(b)) => {
            FieldValue::Bytes(padded(b, length, HEX_TEXT_PAD))
        }
        (FieldKind::Hex { length, variable: false }, FieldValue::Bytes(b)) => FieldValue::Bytes(padded(b, length, 0)),
        (_, value) => value,
    }
}

/// Pad `bytes` out to `length`. Longer values are left for the encoder to
/// reject.
fn padded(mut bytes: Vec<u8>, length: usize, pad: u8) -> Vec<u8> {
    if bytes.len() < length {
        bytes.resize(length, pad);
    }
    bytes
}

fn mismatch(field: &FieldDescription, value: &FieldValue) -> RlaError {
    RlaError::invalid(
        &field.name,
        format!("{:?} does not fit a {:?} field", value, field.kind),
    )
}

fn put_sized(
    out: &mut Vec<u8>,
    field: &FieldDescription,
    bytes: Vec<u8>,
    length: usize,
    variable: bool,
    pad: u8,
) -> RlaResult<()> {
    if bytes.len() > length {
        return Err(RlaError::invalid(
            &field.name,
            format!("{} bytes exceeds field length {}", bytes.len(), length),
        ));
    }
    if variable {
        out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    }
    let end = out.len() + length;
    out.extend_from_slice(&bytes);
    out.resize(end, pad);
    Ok(())
}

/// Append one field's host bytes to `out`. Null values are written as the
/// field's default; the null map records the null flag.
pub(crate) fn encode_field(
    out: &mut Vec<u8>,
    field: &FieldDescription,
    value: &FieldValue,
    job_page: &'static CodePage,
) -> RlaResult<()> {
    let owned;
    let value = if value.is_null() {
        owned = default_value(field);
        &owned
    } else {
        value
    };
    match (field.kind, value) {
        (FieldKind::Character { length, variable }, FieldValue::Text(s)) => {
            let page = text_page(field, job_page)?.ok_or_else(|| mismatch(field, value))?;
            put_sized(out, field, page.encode(s)?, length, variable, page.blank())
        }
        (FieldKind::Character { length, variable }, FieldValue::Bytes(b))
            if field.ccsid == Some(CCSID_HEX) =>
        {
            put_sized(out, field, b.clone(), length, variable, HEX_TEXT_PAD)
        }
        (FieldKind::Hex { length, variable }, FieldValue::Bytes(b)) => {
            put_sized(out, field, b.clone(), length, variable, 0x00)
        }
        (FieldKind::Zoned { digits, scale }, FieldValue::Decimal(_) | FieldValue::Integer(_)) => {
            let d = value.as_decimal().ok_or_else(|| mismatch(field, value))?;
            out.extend_from_slice(&zone_decimal(&d, digits, scale)?);
            Ok(())
        }
        (FieldKind::Packed { digits, scale }, FieldValue::Decimal(_) | FieldValue::Integer(_)) => {
            let d = value.as_decimal().ok_or_else(|| mismatch(field, value))?;
            out.extend_from_slice(&pack_decimal(&d, digits, scale)?);
            Ok(())
        }
        (FieldKind::Binary { length }, FieldValue::Integer(i)) => {
            out.extend_from_slice(&encode_binary(*i, length)?);
            Ok(())
        }
        _ => Err(mismatch(field, value)),
    }
}

fn sized_slice<'a>(field: &FieldDescription, data: &'a [u8], length: usize, variable: bool) -> RlaResult<&'a [u8]> {
    if !variable {
        return Ok(&data[..length]);
    }
    let actual = u16::from_be_bytes([data[0], data[1]]) as usize;
    if actual > length {
        return Err(RlaError::UnexpectedReply(format!(
            "field {} length {} exceeds maximum {}",
            field.name, actual, length
        )));
    }
    Ok(&data[VARLEN_PREFIX..VARLEN_PREFIX + actual])
}

/// Decode one field from exactly `field.byte_length()` bytes.
///
/// Fixed-length character fields lose their trailing blanks.
pub(crate) fn decode_field(
    field: &FieldDescription,
    data: &[u8],
    job_page: &'static CodePage,
) -> RlaResult<FieldValue> {
    match field.kind {
        FieldKind::Character { length, variable } => {
            let bytes = sized_slice(field, data, length, variable)?;
            match text_page(field, job_page)? {
                None => Ok(FieldValue::Bytes(bytes.to_vec())),
                Some(page) => {
                    let text = page.decode(bytes);
                    if variable {
                        Ok(FieldValue::Text(text))
                    } else {
                        Ok(FieldValue::Text(text.trim_end_matches(' ').to_string()))
                    }
                }
            }
        }
        FieldKind::Hex { length, variable } => {
            Ok(FieldValue::Bytes(sized_slice(field, data, length, variable)?.to_vec()))
        }
        FieldKind::Zoned { scale, .. } => Ok(FieldValue::Decimal(unzone_decimal(data, scale)?)),
        FieldKind::Packed { scale, .. } => Ok(FieldValue::Decimal(unpack_decimal(data, scale)?)),
        FieldKind::Binary { .. } => Ok(FieldValue::Integer(decode_binary(data)?)),
    }
}

/// One record of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    format: Arc<RecordFormat>,
    values: Vec<FieldValue>,
    /// Relative record number; 0 until the host assigns one.
    pub record_number: u32,
}

impl Record {
    /// A record with every field at its default (blank, zero or empty).
    pub fn new(format: Arc<RecordFormat>) -> Self {
        let values = format.fields.iter().map(default_value).collect();
        Self {
            format,
            values,
            record_number: 0,
        }
    }

    pub fn format(&self) -> &Arc<RecordFormat> {
        &self.format
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&FieldValue> {
        self.format.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Set a field. Null is only accepted by fields that allow it.
    pub fn set(&mut self, index: usize, value: impl Into<FieldValue>) -> RlaResult<()> {
        let value = value.into();
        let field = self
            .format
            .fields
            .get(index)
            .ok_or_else(|| RlaError::invalid("index", format!("no field at index {}", index)))?;
        let fits = match (&field.kind, &value) {
            (_, FieldValue::Null) => field.allow_null,
            (FieldKind::Character { .. }, FieldValue::Text(_)) => true,
            (FieldKind::Character { .. }, FieldValue::Bytes(_)) => field.ccsid == Some(CCSID_HEX),
            (FieldKind::Hex { .. }, FieldValue::Bytes(_)) => true,
            (FieldKind::Zoned { .. } | FieldKind::Packed { .. }, FieldValue::Decimal(_) | FieldValue::Integer(_)) => true,
            (FieldKind::Binary { .. }, FieldValue::Integer(_)) => true,
            _ => false,
        };
        if !fits {
            return Err(mismatch(field, &value));
        }
        self.values[index] = canonical(field, value);
        Ok(())
    }

    pub fn set_by_name(&mut self, name: &str, value: impl Into<FieldValue>) -> RlaResult<()> {
        let index = self
            .format
            .index_of(name)
            .ok_or_else(|| RlaError::invalid("name", format!("no field named {}", name)))?;
        self.set(index, value)
    }

    pub fn set_null(&mut self, index: usize) -> RlaResult<()> {
        self.set(index, FieldValue::Null)
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(FieldValue::is_null)
    }

    /// Values of the key fields, in key order.
    pub fn key_values(&self) -> RlaResult<Vec<FieldValue>> {
        Ok(self
            .format
            .key_field_indices()?
            .into_iter()
            .map(|i| self.values[i].clone())
            .collect())
    }

    /// Serialize the record data (no null map, no trailer).
    pub fn to_bytes(&self, job_page: &'static CodePage) -> RlaResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.format.record_length());
        for (field, value) in self.format.fields.iter().zip(&self.values) {
            encode_field(&mut out, field, value, job_page)?;
        }
        Ok(out)
    }

    /// Decode record data laid out by `format`.
    pub fn from_bytes(format: Arc<RecordFormat>, data: &[u8], job_page: &'static CodePage) -> RlaResult<Self> {
        let length = format.record_length();
        if data.len() < length {
            return Err(RlaError::UnexpectedReply(format!(
                "record data is {} bytes, format {} needs {}",
                data.len(),
                format.name,
                length
            )));
        }
        let mut values = Vec::with_capacity(format.fields.len());
        let mut offset = 0;
        for field in &format.fields {
            let end = offset + field.byte_length();
            values.push(decode_field(field, &data[offset..end], job_page)?);
            offset = end;
        }
        Ok(Self {
            format,
            values,
            record_number: 0,
        })
    }

    pub(crate) fn values_mut(&mut self) -> &mut [FieldValue] {
        &mut self.values
    }
}
