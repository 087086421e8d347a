//! EBCDIC single-byte code pages addressed by CCSID.
//!
//! IBM i stores character data in the CCSID of the file field or, when the
//! field carries none, in the CCSID of the job. Only the Latin-1 compatible
//! single-byte pages used by record-level access are provided here; each is
//! a bijection between the 256 EBCDIC code points and Latin-1.
//!
//! ```text
//! CCSID   Page    Notes
//! 37      CP037   US/Canada, the IBM i default
//! 500     CP500   International Latin-1, differs from 37 in 7 positions
//! 65535   -       "hex" data, never converted
//! ```

use crate::error::EncodingError;
use crate::Result;

/// CCSID meaning "binary data, do not convert".
pub const CCSID_HEX: u16 = 65535;

/// A single-byte EBCDIC code page.
#[derive(Debug)]
pub struct CodePage {
    /// Display name, e.g. `"CP037"`.
    pub name: &'static str,
    /// Coded character set identifier.
    pub ccsid: u16,
    to_latin1: [u8; 256],
    from_latin1: [u8; 256],
}

/// CP037 to Latin-1, indexed by EBCDIC byte.
const CP037_TO_LATIN1: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9C, 0x09, 0x86, 0x7F, 0x97, 0x8D, 0x8E, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x9D, 0x85, 0x08, 0x87, 0x18, 0x19, 0x92, 0x8F, 0x1C, 0x1D, 0x1E, 0x1F,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0A, 0x17, 0x1B, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04, 0x98, 0x99, 0x9A, 0x9B, 0x14, 0x15, 0x9E, 0x1A,
    0x20, 0xA0, 0xE2, 0xE4, 0xE0, 0xE1, 0xE3, 0xE5, 0xE7, 0xF1, 0xA2, 0x2E, 0x3C, 0x28, 0x2B, 0x7C,
    0x26, 0xE9, 0xEA, 0xEB, 0xE8, 0xED, 0xEE, 0xEF, 0xEC, 0xDF, 0x21, 0x24, 0x2A, 0x29, 0x3B, 0xAC,
    0x2D, 0x2F, 0xC2, 0xC4, 0xC0, 0xC1, 0xC3, 0xC5, 0xC7, 0xD1, 0xA6, 0x2C, 0x25, 0x5F, 0x3E, 0x3F,
    0xF8, 0xC9, 0xCA, 0xCB, 0xC8, 0xCD, 0xCE, 0xCF, 0xCC, 0x60, 0x3A, 0x23, 0x40, 0x27, 0x3D, 0x22,
    0xD8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0xAB, 0xBB, 0xF0, 0xFD, 0xFE, 0xB1,
    0xB0, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0xAA, 0xBA, 0xE6, 0xB8, 0xC6, 0xA4,
    0xB5, 0x7E, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0xA1, 0xBF, 0xD0, 0xDD, 0xDE, 0xAE,
    0x5E, 0xA3, 0xA5, 0xB7, 0xA9, 0xA7, 0xB6, 0xBC, 0xBD, 0xBE, 0x5B, 0x5D, 0xAF, 0xA8, 0xB4, 0xD7,
    0x7B, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0xAD, 0xF4, 0xF6, 0xF2, 0xF3, 0xF5,
    0x7D, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0xB9, 0xFB, 0xFC, 0xF9, 0xFA, 0xFF,
    0x5C, 0xF7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0xB2, 0xD4, 0xD6, 0xD2, 0xD3, 0xD5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0xB3, 0xDB, 0xDC, 0xD9, 0xDA, 0x9F,
];

/// Positions where CP500 differs from CP037: (EBCDIC byte, Latin-1 byte).
const CP500_PATCHES: [(u8, u8); 7] = [
    (0x4A, 0x5B),
    (0x4F, 0x21),
    (0x5A, 0x5D),
    (0x5F, 0x5E),
    (0xB0, 0xA2),
    (0xBA, 0xAC),
    (0xBB, 0x7C),
];

const fn patched(base: [u8; 256], patches: &[(u8, u8)]) -> [u8; 256] {
    let mut table = base;
    let mut i = 0;
    while i < patches.len() {
        table[patches[i].0 as usize] = patches[i].1;
        i += 1;
    }
    table
}

const fn inverted(table: &[u8; 256]) -> [u8; 256] {
    let mut out = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        out[table[i] as usize] = i as u8;
        i += 1;
    }
    out
}

const CP500_TO_LATIN1: [u8; 256] = patched(CP037_TO_LATIN1, &CP500_PATCHES);

/// CCSID 37, US/Canada.
pub static CP037: CodePage = CodePage {
    name: "CP037",
    ccsid: 37,
    to_latin1: CP037_TO_LATIN1,
    from_latin1: inverted(&CP037_TO_LATIN1),
};

/// CCSID 500, International Latin-1.
pub static CP500: CodePage = CodePage {
    name: "CP500",
    ccsid: 500,
    to_latin1: CP500_TO_LATIN1,
    from_latin1: inverted(&CP500_TO_LATIN1),
};

impl CodePage {
    /// Look up the code page for a CCSID.
    ///
    /// # Errors
    /// `EncodingError::InvalidCodePage` for CCSIDs without a table,
    /// including 65535 which has no character mapping at all.
    pub fn from_ccsid(ccsid: u16) -> std::result::Result<&'static CodePage, EncodingError> {
        match ccsid {
            37 => Ok(&CP037),
            500 => Ok(&CP500),
            _ => Err(EncodingError::InvalidCodePage { ccsid }),
        }
    }

    /// Decode EBCDIC bytes to a string. Every byte has a Latin-1 image, so
    /// decoding cannot fail.
    pub fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|&b| char::from(self.to_latin1[b as usize]))
            .collect()
    }

    /// Encode a string to EBCDIC bytes.
    ///
    /// # Errors
    /// `EncodingError::ConversionFailed` for characters outside Latin-1.
    pub fn encode(&self, s: &str) -> Result<Vec<u8>> {
        s.chars()
            .map(|ch| {
                let code = ch as u32;
                if code > 0xFF {
                    return Err(EncodingError::ConversionFailed {
                        message: format!(
                            "character '{}' (U+{:04X}) cannot be encoded in {}",
                            ch, code, self.name
                        ),
                    });
                }
                Ok(self.from_latin1[code as usize])
            })
            .collect()
    }

    /// Encode into exactly `len` bytes, blank padding on the right and
    /// truncating anything longer.
    pub fn encode_padded(&self, s: &str, len: usize) -> Result<Vec<u8>> {
        let mut bytes = self.encode(s)?;
        bytes.resize(len, self.blank());
        Ok(bytes)
    }

    /// The EBCDIC blank (0x40 on every supported page).
    #[inline]
    pub fn blank(&self) -> u8 {
        self.from_latin1[b' ' as usize]
    }

    /// Translate a single EBCDIC byte to Latin-1.
    #[inline]
    pub fn to_latin1_byte(&self, ebcdic: u8) -> u8 {
        self.to_latin1[ebcdic as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cp037_is_bijective() {
        let mut seen = [false; 256];
        for &b in CP037_TO_LATIN1.iter() {
            assert!(!seen[b as usize], "duplicate Latin-1 image 0x{:02X}", b);
            seen[b as usize] = true;
        }
    }

    #[test]
    fn test_cp500_is_bijective() {
        let mut seen = [false; 256];
        for &b in CP500_TO_LATIN1.iter() {
            assert!(!seen[b as usize]);
            seen[b as usize] = true;
        }
    }

    #[test]
    fn test_encode_letters_and_digits() {
        assert_eq!(CP037.encode("HELLO").unwrap(), vec![0xC8, 0xC5, 0xD3, 0xD3, 0xD6]);
        assert_eq!(CP037.encode("09").unwrap(), vec![0xF0, 0xF9]);
        assert_eq!(CP037.encode("a").unwrap(), vec![0x81]);
    }

    #[test]
    fn test_decode_roundtrip_all_bytes() {
        for page in [&CP037, &CP500] {
            let all: Vec<u8> = (0u8..=255).collect();
            let text = page.decode(&all);
            assert_eq!(page.encode(&text).unwrap(), all, "{}", page.name);
        }
    }

    #[test]
    fn test_cp500_brackets_differ_from_cp037() {
        assert_eq!(CP037.encode("[").unwrap(), vec![0xBA]);
        assert_eq!(CP500.encode("[").unwrap(), vec![0x4A]);
        assert_eq!(CP500.encode("!").unwrap(), vec![0x4F]);
    }

    #[test]
    fn test_encode_padded() {
        let bytes = CP037.encode_padded("AB", 4).unwrap();
        assert_eq!(bytes, vec![0xC1, 0xC2, 0x40, 0x40]);
        let cut = CP037.encode_padded("ABCDEF", 3).unwrap();
        assert_eq!(cut, vec![0xC1, 0xC2, 0xC3]);
    }

    #[test]
    fn test_encode_outside_latin1() {
        let err = CP037.encode("\u{20AC}").unwrap_err();
        assert!(matches!(err, EncodingError::ConversionFailed { .. }));
    }

    #[test]
    fn test_from_ccsid() {
        assert_eq!(CodePage::from_ccsid(37).unwrap().name, "CP037");
        assert_eq!(CodePage::from_ccsid(500).unwrap().name, "CP500");
        assert_eq!(
            CodePage::from_ccsid(CCSID_HEX).unwrap_err(),
            EncodingError::InvalidCodePage { ccsid: CCSID_HEX }
        );
    }
}
