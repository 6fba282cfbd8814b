
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::ScoredRecord;
use crate::embeddings::chunking::Chunk;

/// Placed between entries of the assembled context
pub const ENTRY_DELIMITER: &str = "\n\n---\n\n";

/// Where a piece of context came from, for citations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub chunk_id: String,
    pub document_id: String,
    pub source_name: String,
    pub page_number: Option<u32>,
    pub score: f32,
}

impl SourceRef {
    #[inline]
    pub fn label(&self) -> String {
        match self.page_number {
            Some(page) => format!("{}, page {}", self.source_name, page),
            None => self.source_name.clone(),
        }
    }
}

/// Prompt context built from ranked chunks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Chunks included, in rank order
    pub chunks: Vec<Chunk>,
    /// Tagged chunk texts joined by [`ENTRY_DELIMITER`]
    pub text: String,
    pub sources: Vec<SourceRef>,
}

impl AssembledContext {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Size of `text` in characters
    #[inline]
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Tag a chunk with its origin: `[Source: name, page n]` then the text
#[inline]
pub fn format_entry(chunk: &Chunk) -> String {
    match chunk.page_number {
        Some(page) => format!("[Source: {}, page {}]\n{}", chunk.source_name, page, chunk.text),
        None => format!("[Source: {}]\n{}", chunk.source_name, chunk.text),
    }
}

/// Builds bounded, deduplicated prompt context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAssembler {
    max_context_size: usize,
}

impl ContextAssembler {
    #[inline]
    pub fn new(max_context_size: usize) -> Self {
        Self { max_context_size }
    }

    #[inline]
    pub fn max_context_size(&self) -> usize {
        self.max_context_size
    }

    /// Walk results in rank order, adding entries until the next one would
    /// overflow the budget
    ///
    /// Entries are never truncated. The overflowing entry and everything
    /// ranked below it are left out. A chunk whose text already appears in
    /// an accepted chunk is skipped.
    #[inline]
    pub fn assemble(&self, results: &[ScoredRecord]) -> AssembledContext {
        let delimiter_len = ENTRY_DELIMITER.chars().count();
        let mut context = AssembledContext::default();
        let mut size = 0;

        for hit in results {
            let chunk_text = hit.chunk.text.trim();
            let duplicate = context
                .chunks
                .iter()
                .any(|accepted| accepted.text.contains(chunk_text));
            if chunk_text.is_empty() || duplicate {
                debug!("Skipping duplicate or empty chunk {}", hit.chunk.id);
                continue;
            }

            let entry = format_entry(&hit.chunk);
            let separator = if context.is_empty() { 0 } else { delimiter_len };
            let added = separator + entry.chars().count();

            if size + added > self.max_context_size {
                debug!(
                    "Chunk {} ({} chars) does not fit in remaining context budget {}",
                    hit.chunk.id,
                    added,
                    self.max_context_size - size
                );
                break;
            }

            if !context.is_empty() {
                context.text.push_str(ENTRY_DELIMITER);
            }
            context.text.push_str(&entry);
            size += added;

            context.sources.push(SourceRef {
                chunk_id: hit.chunk.id.clone(),
                document_id: hit.chunk.document_id.clone(),
                source_name: hit.chunk.source_name.clone(),
                page_number: hit.chunk.page_number,
                score: hit.score,
            });
            context.chunks.push(hit.chunk.clone());
        }

        debug!(
            "Assembled context from {} of {} chunks ({} chars)",
            context.chunks.len(),
            results.len(),
            size
        );
        context
    }
}
