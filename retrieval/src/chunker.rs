//! Fixed-window text chunking with overlap.
//!
//! Windows are measured in characters, never splitting a UTF-8 sequence.
//! Each window after the first starts `overlap` characters before the end of
//! the previous one, but always strictly after the previous start, so the
//! walk terminates even when `overlap >= chunk_size`.

use serde::{Deserialize, Serialize};

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Window length in characters.
    pub chunk_size: usize,

    /// Characters shared between consecutive windows.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 100,
        }
    }
}

/// Character span of a chunk, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

/// Splits text into overlapping windows.
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    /// Create a chunker with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chunker with custom configuration.
    pub fn with_config(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk text content.
    pub fn chunk<'a>(&self, text: &'a str) -> Vec<&'a str> {
        chunk_text(text, self.config.chunk_size, self.config.overlap)
    }
}

/// Compute the character spans [`chunk_text`] would cut.
///
/// Empty text, or a `chunk_size` of zero, yields no spans.
pub fn chunk_spans(char_count: usize, chunk_size: usize, overlap: usize) -> Vec<ChunkSpan> {
    let mut spans = Vec::new();
    if char_count == 0 || chunk_size == 0 {
        return spans;
    }

    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(char_count);
        spans.push(ChunkSpan { start, end });
        if end == char_count {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { start + 1 };
    }

    spans
}

/// Split `text` into windows of `chunk_size` characters overlapping by `overlap`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<&str> {
    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    chunk_spans(char_count, chunk_size, overlap)
        .into_iter()
        .map(|span| &text[boundaries[span.start]..boundaries[span.end]])
        .collect()
}
