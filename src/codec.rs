use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Errors produced when turning a base64 string back into text.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input is not valid standard base64.
    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Decoded bytes are not valid UTF-8 text.
    #[error("decoded bytes are not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Encode UTF-8 text with the standard alphabet and `=` padding.
pub fn encode(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode a standard base64 string back into UTF-8 text.
/// Surrounding whitespace is ignored.
pub fn decode(input: &str) -> Result<String, CodecError> {
    let bytes = STANDARD.decode(input.trim())?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_value() {
        assert_eq!(
            encode("print(\"Hello World\")"),
            "cHJpbnQoIkhlbGxvIFdvcmxkIik="
        );
    }

    #[test]
    fn test_round_trip_printable_strings() {
        for s in [
            "",
            "a",
            "console.log('hi');",
            "line one\nline two\ttabbed",
            "Xin chào thế giới 🤖",
        ] {
            assert_eq!(decode(&encode(s)).unwrap(), s);
        }
    }

    #[test]
    fn test_decode_ignores_surrounding_whitespace() {
        assert_eq!(decode("  aGVsbG8=\n").unwrap(), "hello");
    }

    #[test]
    fn test_decode_rejects_non_base64() {
        for bad in ["not base64!", "abc", "@@@@", "aGVsbG8==="] {
            assert!(matches!(decode(bad), Err(CodecError::InvalidBase64(_))));
        }
    }

    #[test]
    fn test_decode_rejects_non_utf8() {
        // 0xff 0xfe 0xfd
        let encoded = STANDARD.encode([0xffu8, 0xfe, 0xfd]);
        assert!(matches!(decode(&encoded), Err(CodecError::InvalidUtf8(_))));
    }
}
