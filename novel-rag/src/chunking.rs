//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`SentenceChunker`]: fixed-size windows with overlap, snapped to a nearby
//!   sentence end so chunks rarely cut a sentence in half
//! - [`ParagraphChunker`]: one chunk per blank-line separated paragraph
//!
//! All offsets are counted in characters, not bytes, so multi-byte text is
//! never split inside a code point.

use std::iter;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::document::TextChunk;
use crate::error::{RagError, Result};

/// Default maximum chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// How far either side of the naive cut point to look for a sentence end.
const SENTENCE_SEARCH_RADIUS: usize = 100;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("paragraph separator pattern is valid"));

/// A strategy for splitting text into chunks.
pub trait Chunker: Send + Sync {
    /// Split `text` into an ordered sequence of chunks.
    ///
    /// Returns an empty `Vec` if the text is empty or whitespace only.
    /// Chunk indexes are contiguous starting at 0.
    fn chunk(&self, text: &str) -> Vec<TextChunk>;
}

/// Size and overlap settings for [`SentenceChunker`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkOptions {
    /// Maximum characters per chunk before sentence snapping.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_OVERLAP }
    }
}

impl ChunkOptions {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ChunkingError("chunk_size must be greater than zero".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::ChunkingError(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits text into overlapping windows that end on a sentence boundary when
/// one is close to the cut point.
///
/// For each window the naive end is `start + chunk_size`. Unless that is the
/// end of the text, the first `.`, `!` or `?` followed by whitespace within
/// 100 characters either side of the naive end moves the cut to just after
/// that whitespace. The next window starts `overlap` characters before the
/// cut, and always strictly after the previous start.
///
/// # Example
///
/// ```rust,ignore
/// use novel_rag::{Chunker, SentenceChunker};
///
/// let chunker = SentenceChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&volume_text);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SentenceChunker {
    options: ChunkOptions,
}

impl SentenceChunker {
    /// Create a new `SentenceChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if `chunk_size` is zero or
    /// `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        Self::with_options(ChunkOptions { chunk_size, overlap })
    }

    /// Create a chunker from validated options.
    pub fn with_options(options: ChunkOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Create a chunker using the sizes from a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// The options this chunker was built with.
    pub fn options(&self) -> ChunkOptions {
        self.options
    }
}

/// Byte offset of every character boundary in `text`, including the end.
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices().map(|(i, _)| i).chain(iter::once(text.len())).collect()
}

/// Find a sentence end near `start + chunk_size`, returning the character
/// offset just past the whitespace that follows the terminator.
fn find_sentence_end(chars: &[char], start: usize, chunk_size: usize) -> Option<usize> {
    let len = chars.len();
    let window_start = (start + chunk_size).saturating_sub(SENTENCE_SEARCH_RADIUS).max(start);
    let window_end = (start + chunk_size + SENTENCE_SEARCH_RADIUS).min(len);

    (window_start..window_end.saturating_sub(1))
        .find(|&i| matches!(chars[i], '.' | '!' | '?') && chars[i + 1].is_whitespace())
        .map(|i| i + 2)
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let bounds = char_boundaries(text);
        let len = chars.len();
        let ChunkOptions { chunk_size, overlap } = self.options;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < len {
            let mut end = (start + chunk_size).min(len);
            if end < len {
                if let Some(sentence_end) = find_sentence_end(&chars, start, chunk_size) {
                    end = sentence_end;
                }
            }

            let content = text[bounds[start]..bounds[end]].trim();
            if !content.is_empty() {
                chunks.push(TextChunk {
                    content: content.to_string(),
                    index: chunks.len(),
                    start_char: start,
                    end_char: end,
                });
            }

            if end >= len {
                break;
            }

            // Overlap must never move the window backwards.
            let next = end.saturating_sub(overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }
}

/// Splits text on runs of two or more newlines, one chunk per paragraph.
///
/// There is no overlap. Offsets are the true positions of each paragraph in
/// the source, so the removed newline runs are accounted for exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphChunker;

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut push = |piece: &str, start_char: usize| {
            let content = piece.trim();
            if !content.is_empty() {
                chunks.push(TextChunk {
                    content: content.to_string(),
                    index: chunks.len(),
                    start_char,
                    end_char: start_char + piece.chars().count(),
                });
            }
        };

        let mut last_byte = 0;
        let mut last_char = 0;
        for separator in PARAGRAPH_BREAK.find_iter(text) {
            let piece = &text[last_byte..separator.start()];
            push(piece, last_char);
            last_char += text[last_byte..separator.end()].chars().count();
            last_byte = separator.end();
        }
        push(&text[last_byte..], last_char);

        chunks
    }
}

/// Split text with a [`SentenceChunker`] built from `options`.
///
/// # Errors
///
/// Returns [`RagError::ChunkingError`] if the options are invalid.
pub fn chunk_text(text: &str, options: &ChunkOptions) -> Result<Vec<TextChunk>> {
    Ok(SentenceChunker::with_options(*options)?.chunk(text))
}

/// Split text into paragraphs with a [`ParagraphChunker`].
pub fn chunk_by_paragraphs(text: &str) -> Vec<TextChunk> {
    ParagraphChunker.chunk(text)
}
