//! Key serialization for keyed reads.
//!
//! Key values are laid end to end in key-field order. Character values are
//! sent exactly as given: padding them with blanks would match records
//! whose key merely starts with the value. Hex values are zero filled to
//! the field's maximum length. Variable-length fields can carry their
//! 2-byte length prefix. Numeric fields use their full record layout.

use open_mainframe_encoding::CodePage;

use crate::error::{RlaError, RlaResult};
use crate::record::{encode_field, text_page, FieldKind, FieldValue, RecordFormat};

/// A serialized key and the number of key fields it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedKey {
    pub bytes: Vec<u8>,
    pub field_count: usize,
}

fn too_long(name: &str, len: usize, max: usize) -> RlaError {
    RlaError::invalid(name, format!("key value of {} bytes exceeds {}", len, max))
}

/// Serialize the leading `values.len()` key fields of `format`.
pub fn encode_key(
    format: &RecordFormat,
    values: &[FieldValue],
    job_page: &'static CodePage,
    length_prefix: bool,
) -> RlaResult<EncodedKey> {
    let indices = format.key_field_indices()?;
    if values.is_empty() || values.len() > indices.len() {
        return Err(RlaError::invalid(
            "key",
            format!(
                "{} values given, format {} has {} key fields",
                values.len(),
                format.name,
                indices.len()
            ),
        ));
    }

    let mut bytes = Vec::new();
    for (value, &index) in values.iter().zip(&indices) {
        let field = &format.fields[index];
        if value.is_null() {
            return Err(RlaError::NullKeyField {
                field: field.name.clone(),
            });
        }
        match (field.kind, value) {
            (FieldKind::Character { length, variable }, FieldValue::Text(text)) => {
                let page = text_page(field, job_page)?.ok_or_else(|| {
                    RlaError::invalid(&field.name, "text key for a CCSID 65535 field")
                })?;
                let encoded = page.encode(text)?;
                if encoded.len() > length {
                    return Err(too_long(&field.name, encoded.len(), length));
                }
                if variable && length_prefix {
                    bytes.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
                }
                bytes.extend_from_slice(&encoded);
            }
            (
                FieldKind::Hex { length, variable } | FieldKind::Character { length, variable },
                FieldValue::Bytes(raw),
            ) => {
                if raw.len() > length {
                    return Err(too_long(&field.name, raw.len(), length));
                }
                if variable && length_prefix {
                    bytes.extend_from_slice(&(raw.len() as u16).to_be_bytes());
                }
                bytes.extend_from_slice(raw);
                if matches!(field.kind, FieldKind::Hex { .. }) {
                    bytes.resize(bytes.len() + length - raw.len(), 0x00);
                }
            }
            _ => encode_field(&mut bytes, field, value, job_page)?,
        }
    }

    Ok(EncodedKey {
        bytes,
        field_count: values.len(),
    })
}
