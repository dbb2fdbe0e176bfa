
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::MAX_CHUNK_CHARS;
use crate::{RagError, Result};

/// Configuration for content chunking
///
/// Sizes are counted in characters (Unicode scalar values), not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length of each chunk
    pub chunk_size: usize,
    /// Characters shared by two consecutive windows, always below `chunk_size`
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 300,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of two consecutive windows
    #[inline]
    pub fn step(&self) -> Result<usize> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than a non-zero chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(self.chunk_size - self.overlap)
    }

    /// Check that every window this config produces can be stored
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size > MAX_CHUNK_CHARS {
            return Err(RagError::Config(format!(
                "chunk size ({}) exceeds the stored chunk limit of {} characters",
                self.chunk_size, MAX_CHUNK_CHARS
            )));
        }
        self.step().map(|_| ())
    }
}

/// Character ranges covered by each sliding window, before trimming
///
/// Windows start at multiples of `chunk_size - overlap`. The last window is
/// the first one that reaches the end of the text, so the number of windows
/// for non-empty text is `ceil((len - overlap) / (chunk_size - overlap))`,
/// and never less than one.
#[inline]
pub fn chunk_spans(char_count: usize, config: &ChunkingConfig) -> Result<Vec<Range<usize>>> {
    let step = config.step()?;
    let mut spans = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = (start + config.chunk_size).min(char_count);
        spans.push(start..end);
        if end == char_count {
            break;
        }
        start += step;
    }

    Ok(spans)
}

/// Split raw document text into overlapping, trimmed chunks
///
/// Windows that are empty after trimming are dropped. Splits ignore word and
/// sentence boundaries.
#[inline]
pub fn split_into_chunks(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    // Byte offset of every character, plus the end of the text
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = offsets.len() - 1;

    let spans = chunk_spans(char_count, config)?;
    let window_count = spans.len();

    let chunks: Vec<String> = spans
        .into_iter()
        .filter_map(|span| {
            let window = text.get(offsets[span.start]..offsets[span.end])?.trim();
            (!window.is_empty()).then(|| window.to_string())
        })
        .collect();

    debug!(
        "Split {} characters into {} chunks ({} blank windows dropped)",
        char_count,
        chunks.len(),
        window_count - chunks.len()
    );

    Ok(chunks)
}
