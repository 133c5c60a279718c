//! Line-boundary text chunker.
//!
//! Splits text into bounded retrieval units for embedding. Splitting occurs
//! only on `\n` boundaries; a single line longer than the limit is emitted
//! whole as its own oversized chunk, so callers that need a hard bound must
//! still cap the input downstream (the embedding generator truncates).
//!
//! The same chunker is used for note bodies and for any long text that is
//! embedded piecewise.

/// Default chunk size in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 500;

/// Split `text` into chunks of at most `max_chunk_size` characters where
/// line boundaries allow.
///
/// Lengths are counted in Unicode scalar values. Chunks are trimmed and
/// whitespace-only buffers are never emitted. The result is never empty:
/// when no chunk is produced (empty or blank input) the original text is
/// returned as the single element, so `chunk_text("", n) == [""]`.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if current_len + line_len + 1 > max_chunk_size && !current.is_empty() {
            flush(&mut chunks, &current);
            current.clear();
            current_len = 0;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    flush(&mut chunks, &current);

    if chunks.is_empty() {
        return vec![text.to_string()];
    }
    chunks
}

fn flush(chunks: &mut Vec<String>, buf: &str) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
