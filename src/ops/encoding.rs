use crate::error::{Error, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// UTF-8 with a byte-order mark: stripped on read, written on write.
    Utf8Sig,
    Ascii,
    Latin1,
}

impl TextEncoding {
    /// Parses a caller-supplied label; `None` means the default.
    pub fn from_label(label: Option<&str>) -> Result<Self> {
        let Some(label) = label else {
            return Ok(Self::default());
        };
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "utf-8-sig" | "utf8-sig" => Ok(Self::Utf8Sig),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Self::Latin1),
            _ => Err(Error::InvalidArgument(format!(
                "unsupported encoding: {label}"
            ))),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Sig => "utf-8-sig",
            Self::Ascii => "ascii",
            Self::Latin1 => "latin-1",
        }
    }

    pub fn decode(self, bytes: Vec<u8>) -> Option<String> {
        match self {
            Self::Utf8 => String::from_utf8(bytes).ok(),
            Self::Utf8Sig => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
                std::str::from_utf8(body).ok().map(str::to_string)
            }
            Self::Ascii => {
                if bytes.is_ascii() {
                    String::from_utf8(bytes).ok()
                } else {
                    None
                }
            }
            Self::Latin1 => Some(bytes.iter().map(|&byte| char::from(byte)).collect()),
        }
    }

    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            Self::Utf8 => Some(text.as_bytes().to_vec()),
            Self::Utf8Sig => {
                let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
                out.extend_from_slice(UTF8_BOM);
                out.extend_from_slice(text.as_bytes());
                Some(out)
            }
            Self::Ascii => text.is_ascii().then(|| text.as_bytes().to_vec()),
            Self::Latin1 => text
                .chars()
                .map(|ch| u8::try_from(u32::from(ch)).ok())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_accept_aliases() {
        assert_eq!(TextEncoding::from_label(None).expect("default"), TextEncoding::Utf8);
        assert_eq!(
            TextEncoding::from_label(Some("UTF8")).expect("utf8"),
            TextEncoding::Utf8
        );
        assert_eq!(
            TextEncoding::from_label(Some("ISO-8859-1")).expect("latin"),
            TextEncoding::Latin1
        );
        assert!(TextEncoding::from_label(Some("ebcdic")).is_err());
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        let decoded = TextEncoding::Latin1.decode(vec![0x63, 0x61, 0x66, 0xE9]);
        assert_eq!(decoded.as_deref(), Some("café"));
        assert_eq!(TextEncoding::Latin1.encode("café"), Some(vec![0x63, 0x61, 0x66, 0xE9]));
        assert_eq!(TextEncoding::Latin1.encode("€"), None);
    }

    #[test]
    fn utf8_sig_strips_and_writes_bom() {
        let encoded = TextEncoding::Utf8Sig.encode("hi").expect("encode");
        assert_eq!(encoded, b"\xEF\xBB\xBFhi");
        assert_eq!(TextEncoding::Utf8Sig.decode(encoded).as_deref(), Some("hi"));
        assert_eq!(TextEncoding::Utf8.decode(b"\xEF\xBB\xBFhi".to_vec()).as_deref(), Some("\u{feff}hi"));
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        assert_eq!(TextEncoding::Ascii.decode(vec![0xC3, 0xA9]), None);
        assert_eq!(TextEncoding::Ascii.encode("é"), None);
    }
}
