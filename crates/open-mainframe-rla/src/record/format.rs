//! Record formats and field descriptions.

use open_mainframe_encoding::packed_length;

use crate::error::{RlaError, RlaResult};

/// Length prefix of a variable-length field.
pub const VARLEN_PREFIX: usize = 2;

/// Host data type of a field and its byte layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// EBCDIC text. Variable-length fields carry a 2-byte length prefix and
    /// always occupy `length` bytes after it.
    Character { length: usize, variable: bool },
    /// Untranslated bytes, laid out like `Character`.
    Hex { length: usize, variable: bool },
    /// Zoned decimal, one digit per byte.
    Zoned { digits: usize, scale: u32 },
    /// Packed decimal, two digits per byte.
    Packed { digits: usize, scale: u32 },
    /// Big-endian two's complement integer of 2, 4 or 8 bytes.
    Binary { length: usize },
}

impl FieldKind {
    /// Bytes the field occupies in a record buffer.
    pub fn byte_length(&self) -> usize {
        match *self {
            FieldKind::Character { length, variable } | FieldKind::Hex { length, variable } => {
                if variable {
                    VARLEN_PREFIX + length
                } else {
                    length
                }
            }
            FieldKind::Zoned { digits, .. } => digits,
            FieldKind::Packed { digits, .. } => packed_length(digits),
            FieldKind::Binary { length } => length,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            FieldKind::Character { variable: true, .. } | FieldKind::Hex { variable: true, .. }
        )
    }
}

/// One field of a record format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    pub kind: FieldKind,
    /// Whether the field accepts the null value.
    pub allow_null: bool,
    /// Field CCSID; `None` means the job CCSID.
    pub ccsid: Option<u16>,
}

impl FieldDescription {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            kind,
            allow_null: false,
            ccsid: None,
        }
    }

    pub fn character(name: &str, length: usize) -> Self {
        Self::new(name, FieldKind::Character { length, variable: false })
    }

    pub fn varchar(name: &str, max_length: usize) -> Self {
        Self::new(name, FieldKind::Character { length: max_length, variable: true })
    }

    pub fn hex(name: &str, length: usize) -> Self {
        Self::new(name, FieldKind::Hex { length, variable: false })
    }

    pub fn varhex(name: &str, max_length: usize) -> Self {
        Self::new(name, FieldKind::Hex { length: max_length, variable: true })
    }

    pub fn zoned(name: &str, digits: usize, scale: u32) -> Self {
        Self::new(name, FieldKind::Zoned { digits, scale })
    }

    pub fn packed(name: &str, digits: usize, scale: u32) -> Self {
        Self::new(name, FieldKind::Packed { digits, scale })
    }

    pub fn binary(name: &str, length: usize) -> Self {
        Self::new(name, FieldKind::Binary { length })
    }

    /// Allow the null value.
    pub fn nullable(mut self) -> Self {
        self.allow_null = true;
        self
    }

    pub fn with_ccsid(mut self, ccsid: u16) -> Self {
        self.ccsid = Some(ccsid);
        self
    }

    pub fn byte_length(&self) -> usize {
        self.kind.byte_length()
    }
}

/// Layout of a record: ordered fields and the key subset.
///
/// Immutable once a file is opened with it; share it through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFormat {
    pub name: String,
    pub fields: Vec<FieldDescription>,
    /// Key field names, most significant first.
    pub key_fields: Vec<String>,
}

impl RecordFormat {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            key_fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn field(mut self, field: FieldDescription) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a key field by name.
    pub fn key(mut self, name: &str) -> Self {
        self.key_fields.push(name.to_ascii_uppercase());
        self
    }

    /// Sum of the field lengths, excluding any null map.
    pub fn record_length(&self) -> usize {
        self.fields.iter().map(FieldDescription::byte_length).sum()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Any field that allows null makes the whole format null-capable.
    pub fn is_null_capable(&self) -> bool {
        self.fields.iter().any(|f| f.allow_null)
    }

    /// Byte offset of every field within the record data.
    pub fn field_offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.fields
            .iter()
            .map(|f| {
                let start = offset;
                offset += f.byte_length();
                start
            })
            .collect()
    }

    /// Indices of the key fields, in key order.
    pub fn key_field_indices(&self) -> RlaResult<Vec<usize>> {
        self.key_fields
            .iter()
            .map(|name| {
                self.index_of(name).ok_or_else(|| {
                    RlaError::invalid("key_fields", format!("no field named {}", name))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> RecordFormat {
        RecordFormat::new("CUSREC")
            .field(FieldDescription::zoned("cusnum", 6, 0))
            .field(FieldDescription::character("lstnam", 8))
            .field(FieldDescription::packed("baldue", 9, 2).nullable())
            .field(FieldDescription::varchar("street", 13))
            .field(FieldDescription::binary("zip", 4))
            .key("CUSNUM")
    }

    #[test]
    fn test_record_length() {
        assert_eq!(customer().record_length(), 6 + 8 + 5 + 15 + 4);
    }

    #[test]
    fn test_offsets() {
        assert_eq!(customer().field_offsets(), vec![0, 6, 14, 19, 34]);
    }

    #[test]
    fn test_lookup_and_keys() {
        let format = customer();
        assert_eq!(format.index_of("LSTNAM"), Some(1));
        assert_eq!(format.index_of("nope"), None);
        assert_eq!(format.key_field_indices().unwrap(), vec![0]);
        assert!(format.is_null_capable());
        let bad = RecordFormat::new("X").key("MISSING");
        assert!(bad.key_field_indices().is_err());
    }
}
