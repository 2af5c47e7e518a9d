/// Telegram's message ceiling, counted in UTF-16 code units.
pub const TRANSPORT_MESSAGE_LIMIT: usize = 4096;

/// Split point, leaving room below the ceiling for a "Part i/N" label.
pub const MESSAGE_CHUNK_LIMIT: usize = 4000;

/// One numbered segment of a reply, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingChunk {
    pub text: String,
    /// 1-based position.
    pub index: usize,
    pub total: usize,
}

impl OutgoingChunk {
    pub fn label(&self) -> String {
        format!("Part {}/{}", self.index, self.total)
    }
}

/// Split `text` into contiguous segments of at most `max_len` UTF-16 code
/// units, the unit Telegram measures message length in.
///
/// Boundaries fall on length alone, so words and markup may be cut, but a
/// character is never split. Empty input yields a single empty segment.
/// A `max_len` below 2 still lets one astral character through per segment.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.is_empty() {
        return vec![String::new()];
    }

    let mut chunks = Vec::with_capacity(text.len() / max_len + 1);
    let mut start = 0;
    let mut units = 0;

    for (idx, c) in text.char_indices() {
        let width = c.len_utf16();
        if units > 0 && units + width > max_len {
            chunks.push(text[start..idx].to_string());
            start = idx;
            units = 0;
        }
        units += width;
    }
    chunks.push(text[start..].to_string());

    chunks
}

/// Length as Telegram counts it.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Chunk `text` and number the segments.
pub fn outgoing_chunks(text: &str, max_len: usize) -> Vec<OutgoingChunk> {
    let parts = chunk(text, max_len);
    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, text)| OutgoingChunk {
            text,
            index: i + 1,
            total,
        })
        .collect()
}
