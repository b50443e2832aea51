//! Speech playback chunking.
//!
//! Speech engines misbehave on long utterances, so stories are spoken in
//! sentence-sized chunks. [`PlaybackQueue`] is an explicit cursor over
//! those chunks: the caller speaks `current()`, and each playback-complete
//! event drives a single `advance()`. Audio itself is the embedding
//! client's concern.

/// Longest chunk handed to a speech engine, in characters.
const MAX_CHUNK_CHARS: usize = 200;

/// Split a story into speakable chunks.
///
/// Sentences are packed together up to the chunk limit; a sentence longer
/// than the limit is split at word boundaries. Deterministic for a given
/// input.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        for piece in split_oversized(&sentence) {
            let separator = usize::from(!current.is_empty());
            if !current.is_empty()
                && current.chars().count() + separator + piece.chars().count() > MAX_CHUNK_CHARS
            {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split into sentences at `.`, `!` or `?` followed by whitespace or end
/// of text. A period inside a number ("3.14") is not a boundary.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Break a sentence longer than the chunk limit at word boundaries.
/// A single word longer than the limit stays whole.
fn split_oversized(sentence: &str) -> Vec<String> {
    if sentence.chars().count() <= MAX_CHUNK_CHARS {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        if !current.is_empty()
            && current.chars().count() + 1 + word.chars().count() > MAX_CHUNK_CHARS
        {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// An explicit playback cursor over a story's speech chunks.
///
/// Replaces nested utterance-complete callbacks: speak `current()`, and on
/// the engine's playback-complete event call `advance()` to get the next
/// chunk (or `None` when the story is done).
#[derive(Debug, Clone)]
pub struct PlaybackQueue {
    chunks: Vec<String>,
    cursor: usize,
}

impl PlaybackQueue {
    /// Chunk `text` and position the cursor on the first chunk.
    pub fn new(text: &str) -> Self {
        Self {
            chunks: chunk_text(text),
            cursor: 0,
        }
    }

    /// The chunk currently being spoken, if any.
    pub fn current(&self) -> Option<&str> {
        self.chunks.get(self.cursor).map(String::as_str)
    }

    /// Move past the chunk whose playback just completed and return the
    /// next chunk to speak.
    pub fn advance(&mut self) -> Option<&str> {
        if self.cursor < self.chunks.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Whether every chunk has been played.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.chunks.len()
    }

    /// Total number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
