
pub mod chunking;
pub mod hashing;
pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, EmbeddingProvider};
use crate::{RagError, Result};

pub use chunking::{Chunk, ChunkingConfig, TextSegment, chunk_document, split_text};
pub use hashing::HashingEmbedder;
pub use ollama::{OllamaClient, OllamaEmbedder};

/// Maps text to fixed-length vectors
///
/// Implementations return one vector per input in input order, every vector
/// having exactly [`Embedder::dimension`] components.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    fn dimension(&self) -> usize;

    fn model_id(&self) -> &str;
}

/// Reject a batch whose size or vector lengths do not match what was asked for
#[inline]
pub fn validate_embeddings(vectors: &[Vec<f32>], inputs: usize, dimension: usize) -> Result<()> {
    if vectors.len() != inputs {
        return Err(RagError::Embedding(format!(
            "Mismatch between request and response counts: {} vs {}",
            inputs,
            vectors.len()
        )));
    }

    if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimension) {
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }

    Ok(())
}

/// Build the embedder selected by the configuration
#[inline]
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let dimension = config.embedding.dimension as usize;

    let embedder: Arc<dyn Embedder> = match config.embedding.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(&config.ollama, dimension)?),
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(dimension)?),
    };

    Ok(embedder)
}
