/// Sentence terminators that close a chunk.
const TERMINATORS: [char; 3] = ['.', '!', '?'];

fn is_terminator(ch: char) -> bool {
    TERMINATORS.contains(&ch)
}

/// Split text into sentence-sized chunks.
///
/// A chunk is a run of non-terminator characters followed by every
/// terminator directly after it (`"Wait?!"` stays one chunk), or the
/// unterminated tail of the input. Chunks are trimmed and empty ones
/// dropped. Text without any such run (e.g. only punctuation) is returned
/// as a single trimmed chunk.
///
/// This is a heuristic splitter: abbreviations, decimals and quoted
/// punctuation all end a chunk.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut matched = false;
    let mut rest = text.trim_start_matches(is_terminator);

    while !rest.is_empty() {
        matched = true;
        let body_end = rest.find(is_terminator).unwrap_or(rest.len());
        let tail = &rest[body_end..];
        let punct_len = tail.len() - tail.trim_start_matches(is_terminator).len();
        let end = body_end + punct_len;

        let chunk = rest[..end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = &rest[end..];
    }

    if !matched {
        let whole = text.trim();
        if !whole.is_empty() {
            chunks.push(whole.to_string());
        }
    }

    chunks
}
