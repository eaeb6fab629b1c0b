//! Text encodings for text pipe sources and accumulators

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

/// Supported text encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "utf-16le")]
    Utf16Le,
    #[serde(rename = "utf-16be")]
    Utf16Be,
    #[serde(rename = "latin1")]
    Latin1,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Latin1 => "latin1",
        }
    }

    /// Encode text into bytes
    ///
    /// Latin-1 cannot represent characters above U+00FF; those become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            TextEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }

    /// Create an incremental decoder
    pub fn decoder(&self) -> TextDecoder {
        TextDecoder {
            encoding: *self,
            pending: Vec::new(),
        }
    }

    /// Decode a complete byte sequence
    pub fn decode(&self, bytes: &[u8]) -> String {
        let mut decoder = self.decoder();
        let mut text = decoder.decode(bytes);
        text.push_str(&decoder.finish());
        text
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-16le" | "utf-16" | "utf16le" | "utf16" => Ok(TextEncoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(TextEncoding::Utf16Be),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            _ => Err(format!("Unsupported text encoding: {}", s)),
        }
    }
}

/// Incremental decoder that tolerates sequences split across chunks
#[derive(Debug, Clone)]
pub struct TextDecoder {
    encoding: TextEncoding,
    pending: Vec<u8>,
}

impl TextDecoder {
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Decode the next chunk, holding back an incomplete trailing sequence
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        match self.encoding {
            TextEncoding::Latin1 => chunk.iter().map(|&b| char::from(b)).collect(),
            TextEncoding::Utf8 => {
                self.pending.extend_from_slice(chunk);
                self.decode_utf8()
            }
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
                self.pending.extend_from_slice(chunk);
                self.decode_utf16()
            }
        }
    }

    /// Flush whatever is held back; incomplete sequences become U+FFFD
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let rest = std::mem::take(&mut self.pending);
        match self.encoding {
            TextEncoding::Utf8 => String::from_utf8_lossy(&rest).into_owned(),
            _ => REPLACEMENT.to_string(),
        }
    }

    fn decode_utf8(&mut self) -> String {
        let mut out = String::new();
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_up_to = start + e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[start..valid_up_to]) {
                        out.push_str(valid);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            start = valid_up_to + len;
                        }
                        None => {
                            start = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    fn decode_utf16(&mut self) -> String {
        let little_endian = self.encoding == TextEncoding::Utf16Le;
        let mut units: Vec<u16> = self
            .pending
            .chunks_exact(2)
            .map(|pair| {
                let bytes = [pair[0], pair[1]];
                if little_endian {
                    u16::from_le_bytes(bytes)
                } else {
                    u16::from_be_bytes(bytes)
                }
            })
            .collect();

        let mut consumed = units.len() * 2;
        // A high surrogate at the end may be completed by the next chunk
        if units.last().is_some_and(|u| (0xD800..0xDC00).contains(u)) {
            units.pop();
            consumed -= 2;
        }

        let out = char::decode_utf16(units)
            .map(|r| r.unwrap_or(REPLACEMENT))
            .collect();
        self.pending.drain(..consumed);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_split_sequence() {
        let bytes = "héllo €".as_bytes();
        let mut decoder = TextEncoding::Utf8.decoder();
        let mut text = String::new();
        for chunk in bytes.chunks(1) {
            text.push_str(&decoder.decode(chunk));
        }
        text.push_str(&decoder.finish());
        assert_eq!(text, "héllo €");
    }

    #[test]
    fn test_utf8_invalid_bytes_replaced() {
        assert_eq!(TextEncoding::Utf8.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(TextEncoding::Utf8.decode(b"ab\xe2\x82"), "ab\u{FFFD}");
    }

    #[test]
    fn test_utf16_roundtrip_with_surrogates() {
        let text = "a😀b";
        for encoding in [TextEncoding::Utf16Le, TextEncoding::Utf16Be] {
            let bytes = encoding.encode(text);
            assert_eq!(bytes.len(), 8);

            let mut decoder = encoding.decoder();
            let mut decoded = String::new();
            for chunk in bytes.chunks(3) {
                decoded.push_str(&decoder.decode(chunk));
            }
            decoded.push_str(&decoder.finish());
            assert_eq!(decoded, text);
        }
    }

    #[test]
    fn test_latin1() {
        let bytes = TextEncoding::Latin1.encode("café€");
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9, b'?']);
        assert_eq!(TextEncoding::Latin1.decode(&bytes[..4]), "café");
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!("UTF_8".parse::<TextEncoding>(), Ok(TextEncoding::Utf8));
        assert_eq!("iso-8859-1".parse::<TextEncoding>(), Ok(TextEncoding::Latin1));
        assert!("ebcdic".parse::<TextEncoding>().is_err());
        assert_eq!(
            serde_json::to_string(&TextEncoding::Utf16Le).unwrap(),
            "\"utf-16le\""
        );
    }
}
