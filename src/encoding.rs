//! Text encoding applied to the socket byte stream

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown encoding name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEncodingError(pub String);

impl std::fmt::Display for ParseEncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown transport encoding: {}", self.0)
    }
}

impl std::error::Error for ParseEncodingError {}

define_wire_enum! {
    error_type: ParseEncodingError,
    /// How frames are converted between text and socket bytes.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum TransportEncoding {
        /// UTF-8; invalid sequences decode to U+FFFD.
        Utf8 => "utf8",
        /// 7-bit ASCII; the high bit is cleared on decode, non-ASCII characters
        /// are sent as `?`.
        Ascii => "ascii",
        /// ISO-8859-1, one byte per character; characters above U+00FF are sent as `?`.
        Latin1 => "latin1",
    }
}

impl Default for TransportEncoding {
    fn default() -> Self {
        Self::Utf8
    }
}

impl TransportEncoding {
    /// Convert outgoing text to socket bytes.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text
                .as_bytes()
                .to_vec(),
            Self::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }

    /// Convert one complete frame of socket bytes to text.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Ascii => bytes
                .iter()
                .map(|b| char::from(b & 0x7f))
                .collect(),
            Self::Latin1 => bytes
                .iter()
                .map(|&b| char::from(b))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("utf8".parse::<TransportEncoding>(), Ok(TransportEncoding::Utf8));
        assert_eq!("ASCII".parse::<TransportEncoding>(), Ok(TransportEncoding::Ascii));
        assert_eq!("latin1".parse::<TransportEncoding>(), Ok(TransportEncoding::Latin1));
        assert!("ucs2"
            .parse::<TransportEncoding>()
            .is_err());
    }

    #[test]
    fn utf8_passes_multibyte_through() {
        let enc = TransportEncoding::Utf8;
        let bytes = enc.encode("Message: Привет");
        assert_eq!(enc.decode(&bytes), "Message: Привет");
    }

    #[test]
    fn ascii_replaces_and_masks() {
        let enc = TransportEncoding::Ascii;
        assert_eq!(enc.encode("caf\u{e9}"), b"caf?".to_vec());
        assert_eq!(enc.decode(&[b'a', 0xe1]), "aa");
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        let enc = TransportEncoding::Latin1;
        assert_eq!(enc.encode("caf\u{e9}"), vec![b'c', b'a', b'f', 0xe9]);
        assert_eq!(enc.encode("\u{20ac}"), b"?".to_vec());
        assert_eq!(enc.decode(&[b'c', 0xe9]), "c\u{e9}");
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let enc: TransportEncoding = serde_json::from_str("\"latin1\"").unwrap();
        assert_eq!(enc, TransportEncoding::Latin1);
        assert_eq!(
            serde_json::to_string(&TransportEncoding::Utf8).unwrap(),
            "\"utf8\""
        );
    }
}
