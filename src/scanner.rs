use std::sync::OnceLock;

use regex::Regex;

use crate::codec;

const MAX_ENCODED_DISPLAY: usize = 50;
const MAX_DECODED_DISPLAY: usize = 100;

/// A base64-looking substring that decoded to printable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundMatch {
    /// The encoded substring, truncated for display.
    pub encoded: String,
    /// The decoded text, truncated for display.
    pub decoded: String,
}

fn base64_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9+/]{20,}={0,2}").expect("base64 pattern is a valid regex")
    })
}

/// Scan `text` for runs of at least 20 base64 alphabet characters and keep
/// the ones that decode to printable UTF-8. Matches come back in the order
/// they appear; duplicates are kept.
pub fn find_encoded_substrings(text: &str) -> Vec<FoundMatch> {
    base64_pattern()
        .find_iter(text)
        .filter_map(|m| {
            let decoded = codec::decode(m.as_str()).ok()?;
            if !is_printable(&decoded) {
                return None;
            }
            Some(FoundMatch {
                encoded: truncate(m.as_str(), MAX_ENCODED_DISPLAY),
                decoded: truncate(&decoded, MAX_DECODED_DISPLAY),
            })
        })
        .collect()
}

/// Printable means no control characters apart from ordinary whitespace.
fn is_printable(text: &str) -> bool {
    text.chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
}

/// Cut `text` to `max` characters, appending `...` when anything was dropped.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_single_embedded_payload() {
        let payload = codec::encode("alert('this was hidden')");
        let text = format!("var x = \"{}\"; eval(atob(x));", payload);

        let found = find_encoded_substrings(&text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].decoded, "alert('this was hidden')");
        assert_eq!(found[0].encoded, payload);
    }

    #[test]
    fn test_short_runs_are_ignored() {
        // "aGVsbG8=" is only 8 characters
        assert!(find_encoded_substrings("x = 'aGVsbG8='").is_empty());
    }

    #[test]
    fn test_non_printable_payload_is_excluded() {
        // 0x00..=0x0e decodes fine but is all control bytes
        let bytes: Vec<u8> = (0u8..15).collect();
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
        assert!(encoded.len() >= 20);
        assert!(find_encoded_substrings(&encoded).is_empty());
    }

    #[test]
    fn test_undecodable_run_is_excluded() {
        // 21 chars, not a valid base64 length
        assert!(find_encoded_substrings("ABCDEFGHIJKLMNOPQRSTU").is_empty());
    }

    #[test]
    fn test_matches_keep_order_and_duplicates() {
        let first = codec::encode("first hidden string here");
        let second = codec::encode("second hidden string here");
        let text = format!("{first} and {second} then {first}");

        let found = find_encoded_substrings(&text);
        let decoded: Vec<&str> = found.iter().map(|m| m.decoded.as_str()).collect();
        assert_eq!(
            decoded,
            vec![
                "first hidden string here",
                "second hidden string here",
                "first hidden string here"
            ]
        );
    }

    #[test]
    fn test_long_values_are_truncated_for_display() {
        let plain = "x".repeat(150);
        let encoded = codec::encode(&plain);

        let found = find_encoded_substrings(&encoded);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].encoded.chars().count(), MAX_ENCODED_DISPLAY + 3);
        assert!(found[0].encoded.ends_with("..."));
        assert_eq!(found[0].decoded, format!("{}...", "x".repeat(100)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exact", 5), "exact");
    }
}
