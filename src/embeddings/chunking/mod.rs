#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::extraction::{Document, PAGE_SEPARATOR};

/// A contiguous piece of a document, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique within a store: `{document_id}:{ordinal}`
    pub id: String,
    pub document_id: String,
    pub source_name: String,
    /// Position of this chunk within its document
    pub ordinal: usize,
    pub text: String,
    /// Character offset (inclusive) into the document text
    pub start: usize,
    /// Character offset (exclusive) into the document text
    pub end: usize,
    pub page_number: Option<u32>,
}

/// A span of text produced by [`split_text`], offsets in characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Configuration for text chunking
///
/// Sizes are measured in characters (Unicode scalar values), not tokens.
/// The default of 1000 characters stays well inside the input window of
/// common embedding models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target maximum chunk length
    pub chunk_size: usize,
    /// Characters repeated from the end of one chunk at the start of the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunkOverlap {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }

        Ok(())
    }

    /// How far before the target size a boundary may be chosen
    #[inline]
    pub fn boundary_tolerance(&self) -> usize {
        (self.chunk_size / 5).max(1)
    }
}

/// Split raw text into overlapping segments
///
/// Cuts prefer, in order: paragraph breaks, sentence ends, whitespace, and
/// finally a hard cut at the target size. A boundary is only taken inside
/// the tolerance window just before the target size.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextSegment>, ConfigError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut segments = Vec::new();

    if total == 0 {
        return Ok(segments);
    }

    let size = config.chunk_size;
    let overlap = config.chunk_overlap;
    let tolerance = config.boundary_tolerance();
    let mut start = 0;

    loop {
        if total - start <= size {
            segments.push(make_segment(&chars, start, total));
            break;
        }

        let hard_end = start + size;
        // Cutting any earlier would stop the next chunk from advancing
        let window_start = hard_end.saturating_sub(tolerance).max(start + overlap + 1);
        let end = find_boundary(&chars, window_start, hard_end);

        segments.push(make_segment(&chars, start, end));
        start = end - overlap;
    }

    Ok(segments)
}

/// Chunk every page of a document, keeping spans relative to the whole document
#[inline]
pub fn chunk_document(
    document: &Document,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ConfigError> {
    config.validate()?;

    let separator_len = PAGE_SEPARATOR.chars().count();
    let mut chunks = Vec::new();
    let mut page_offset = 0;

    for page in &document.pages {
        let page_len = page.text.chars().count();

        if !page.text.trim().is_empty() {
            for segment in split_text(&page.text, config)? {
                if segment.text.trim().is_empty() {
                    continue;
                }

                let ordinal = chunks.len();
                chunks.push(Chunk {
                    id: format!("{}:{}", document.id, ordinal),
                    document_id: document.id.clone(),
                    source_name: document.source_name.clone(),
                    ordinal,
                    text: segment.text,
                    start: page_offset + segment.start,
                    end: page_offset + segment.end,
                    page_number: Some(page.number),
                });
            }
        }

        page_offset += page_len + separator_len;
    }

    debug!(
        "Chunked document '{}' ({} pages) into {} chunks",
        document.source_name,
        document.pages.len(),
        chunks.len()
    );

    Ok(chunks)
}

fn make_segment(chars: &[char], start: usize, end: usize) -> TextSegment {
    TextSegment {
        start,
        end,
        text: chars[start..end].iter().collect(),
    }
}

/// Pick the cut position in `[lo, hi]`, searching backwards from `hi`
fn find_boundary(chars: &[char], lo: usize, hi: usize) -> usize {
    let last_cut = |is_cut: &dyn Fn(usize) -> bool| (lo..=hi).rev().find(|&cut| is_cut(cut));

    let paragraph = |cut: usize| cut >= 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n';
    let sentence = |cut: usize| {
        let after_punct = is_sentence_end(chars[cut - 1])
            && chars.get(cut).is_none_or(|next| next.is_whitespace());
        let after_space =
            cut >= 2 && chars[cut - 1].is_whitespace() && is_sentence_end(chars[cut - 2]);
        after_punct || after_space
    };
    let whitespace = |cut: usize| chars[cut - 1].is_whitespace();

    last_cut(&paragraph)
        .or_else(|| last_cut(&sentence))
        .or_else(|| last_cut(&whitespace))
        .unwrap_or(hi)
}

fn is_sentence_end(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}
