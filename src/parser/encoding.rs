//! Encoding and format detection.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Diagnostic, Location, ParseError, Severity};

/// Bytes inspected before committing to an encoding.
pub const PROBE_SIZE: usize = 8192;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Byte encodings a DATEV export may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// UTF-8 with byte-order mark.
    Utf8Bom,
    Utf8,
    /// The "ANSI" code page DATEV writes by default.
    Windows1252,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8Bom => "utf-8-sig",
            Self::Utf8 => "utf-8",
            Self::Windows1252 => "cp1252",
        }
    }
}

/// File format, decided by the first token of the first record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Datev,
    Unknown,
}

/// Decoded text together with the encoding used to read it.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: Encoding,
    pub diagnostics: Vec<Diagnostic>,
}

// 0x80..=0x9F; zero marks the five bytes the code page leaves undefined.
const CP1252_HIGH: [u32; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, //
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0, 0x017D, 0, //
    0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, //
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

fn cp1252_char(byte: u8) -> Option<char> {
    match byte {
        0x80..=0x9F => match CP1252_HIGH[usize::from(byte - 0x80)] {
            0 => None,
            cp => char::from_u32(cp),
        },
        _ => Some(char::from(byte)),
    }
}

fn cp1252_byte(c: char) -> Option<u8> {
    let cp = u32::from(c);
    if cp < 0x80 || (0xA0..=0xFF).contains(&cp) {
        return u8::try_from(cp).ok();
    }
    CP1252_HIGH
        .iter()
        .position(|&mapped| mapped != 0 && mapped == cp)
        .and_then(|i| u8::try_from(0x80 + i).ok())
}

/// Decode Windows-1252. Returns the offset of the first undefined byte on
/// failure.
pub fn decode_cp1252(data: &[u8]) -> Result<String, usize> {
    data.iter()
        .enumerate()
        .map(|(i, &b)| cp1252_char(b).ok_or(i))
        .collect()
}

fn valid_utf8_probe(probe: &[u8]) -> bool {
    match std::str::from_utf8(probe) {
        Ok(_) => true,
        // A multi-byte character cut off by the probe window is fine.
        Err(e) => e.error_len().is_none(),
    }
}

/// Decide the encoding from the leading bytes.
pub fn detect_encoding(data: &[u8]) -> Result<Encoding, ParseError> {
    if data.starts_with(UTF8_BOM) {
        return Ok(Encoding::Utf8Bom);
    }
    let probe = &data[..data.len().min(PROBE_SIZE)];
    if valid_utf8_probe(probe) {
        return Ok(Encoding::Utf8);
    }
    match decode_cp1252(probe) {
        Ok(_) => Ok(Encoding::Windows1252),
        Err(offset) => Err(ParseError::EncodingUndecidable(format!(
            "invalid UTF-8 and undefined Windows-1252 byte 0x{:02X} at offset {}",
            probe[offset], offset
        ))),
    }
}

/// Detect the encoding and decode the whole buffer.
///
/// If the probe looked like UTF-8 but a later byte is invalid, the buffer is
/// re-read as Windows-1252 and a `DVL-ENC-002` warning is attached.
pub fn decode(data: &[u8], file: &str) -> Result<Decoded, ParseError> {
    let encoding = detect_encoding(data)?;
    let body = match encoding {
        Encoding::Utf8Bom => &data[UTF8_BOM.len()..],
        _ => data,
    };
    let mut diagnostics = Vec::new();

    let text = match encoding {
        Encoding::Windows1252 => decode_cp1252(body).map_err(|offset| {
            ParseError::EncodingUndecidable(format!(
                "undefined Windows-1252 byte at offset {}",
                offset
            ))
        })?,
        Encoding::Utf8 | Encoding::Utf8Bom => match std::str::from_utf8(body) {
            Ok(text) => text.to_string(),
            Err(e) => {
                let text = decode_cp1252(body).map_err(|_| {
                    ParseError::EncodingUndecidable(format!(
                        "invalid UTF-8 at offset {} and not Windows-1252 either",
                        e.valid_up_to()
                    ))
                })?;
                diagnostics.push(
                    Diagnostic::new(
                        "DVL-ENC-002",
                        Severity::Warn,
                        format!(
                            "invalid UTF-8 at offset {}; file re-read as Windows-1252",
                            e.valid_up_to()
                        ),
                        Location::file(file),
                    )
                    .with_context("offset", e.valid_up_to().to_string()),
                );
                return Ok(Decoded {
                    text,
                    encoding: Encoding::Windows1252,
                    diagnostics,
                });
            }
        },
    };

    debug!(encoding = encoding.as_str(), bytes = data.len(), "decoded input");
    Ok(Decoded {
        text,
        encoding,
        diagnostics,
    })
}

/// Encode text for writing. Returns the first character the encoding
/// cannot represent.
pub fn encode(text: &str, encoding: Encoding) -> Result<Vec<u8>, char> {
    match encoding {
        Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        Encoding::Utf8Bom => {
            let mut out = Vec::with_capacity(text.len() + UTF8_BOM.len());
            out.extend_from_slice(UTF8_BOM);
            out.extend_from_slice(text.as_bytes());
            Ok(out)
        }
        Encoding::Windows1252 => text.chars().map(|c| cp1252_byte(c).ok_or(c)).collect(),
    }
}

/// Whether every character of `text` exists in Windows-1252.
pub fn fits_cp1252(text: &str) -> bool {
    text.chars().all(|c| cp1252_byte(c).is_some())
}

/// Inspect the first token of the first record.
pub fn detect_format(text: &str) -> Format {
    let end = text.find([';', '\r', '\n']).unwrap_or(text.len());
    let token = text[..end].trim();
    let token = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token);
    if token == "EXTF" {
        Format::Datev
    } else {
        Format::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bom_wins() {
        assert_eq!(detect_encoding(b"\xEF\xBB\xBFEXTF").unwrap(), Encoding::Utf8Bom);
        let d = decode(b"\xEF\xBB\xBF\"EXTF\";700", "f").unwrap();
        assert_eq!(d.text, "\"EXTF\";700");
    }

    #[test]
    fn plain_utf8() {
        let d = decode("Müller;Straße".as_bytes(), "f").unwrap();
        assert_eq!(d.encoding, Encoding::Utf8);
        assert_eq!(d.text, "Müller;Straße");
    }

    #[test]
    fn ansi_umlauts_fall_back_to_cp1252() {
        let d = decode(b"M\xFCller;\x80", "f").unwrap();
        assert_eq!(d.encoding, Encoding::Windows1252);
        assert_eq!(d.text, "Müller;€");
    }

    #[test]
    fn undefined_bytes_in_invalid_utf8_are_fatal() {
        let err = decode(b"abc\x81\xFF", "f").unwrap_err();
        assert_eq!(err.code(), "DVL-ENC-001");
    }

    #[test]
    fn truncated_char_at_probe_edge_is_utf8() {
        let mut data = vec![b'a'; PROBE_SIZE - 1];
        data.extend_from_slice("ü".as_bytes());
        assert_eq!(detect_encoding(&data).unwrap(), Encoding::Utf8);
    }

    #[test]
    fn late_invalid_utf8_is_reread() {
        let mut data = vec![b'a'; PROBE_SIZE + 10];
        data.push(0xE4);
        let d = decode(&data, "f").unwrap();
        assert_eq!(d.encoding, Encoding::Windows1252);
        assert_eq!(d.diagnostics[0].code, "DVL-ENC-002");
        assert!(d.text.ends_with('ä'));
    }

    #[test]
    fn cp1252_encode_reports_unrepresentable() {
        assert_eq!(encode("Ä€", Encoding::Windows1252).unwrap(), vec![0xC4, 0x80]);
        assert_eq!(encode("a\u{4E2D}", Encoding::Windows1252), Err('\u{4E2D}'));
        assert!(fits_cp1252("Größe – 5 €"));
        assert!(!fits_cp1252("\u{0101}"));
    }

    #[test]
    fn format_from_first_token() {
        assert_eq!(detect_format("\"EXTF\";700;21"), Format::Datev);
        assert_eq!(detect_format("EXTF\r\n"), Format::Datev);
        assert_eq!(detect_format("DTVF;700"), Format::Unknown);
        assert_eq!(detect_format(""), Format::Unknown);
    }
}
