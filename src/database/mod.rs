//! Storage: vector stores for chunk embeddings and the SQLite document registry


pub mod lancedb;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, VectorBackend};
use crate::embeddings::chunking::Chunk;
use crate::{RagError, Result};

pub use self::lancedb::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use sqlite::Database;

/// Chunk data stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub document_id: String,
    pub source_name: String,
    pub page_number: Option<u32>,
    pub ordinal: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// One embedded chunk, keyed by chunk id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl VectorRecord {
    #[inline]
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            vector,
            metadata: RecordMetadata {
                document_id: chunk.document_id.clone(),
                source_name: chunk.source_name.clone(),
                page_number: chunk.page_number,
                ordinal: chunk.ordinal,
                start: chunk.start,
                end: chunk.end,
                text: chunk.text.clone(),
            },
        }
    }

    #[inline]
    pub fn to_chunk(&self) -> Chunk {
        self.metadata.to_chunk(&self.id)
    }
}

impl RecordMetadata {
    #[inline]
    pub fn to_chunk(&self, id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: self.document_id.clone(),
            source_name: self.source_name.clone(),
            ordinal: self.ordinal,
            text: self.text.clone(),
            start: self.start,
            end: self.end,
            page_number: self.page_number,
        }
    }
}

/// A search hit: the stored chunk and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub chunk: Chunk,
    pub score: f32,
}

/// Persists embeddings and answers nearest-neighbour queries
///
/// Writes are serialised against each other and against searches, so a
/// search observes the store either before or after a given upsert.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records by id
    ///
    /// A replaced record keeps its original insertion position. If any
    /// record has the wrong dimension nothing is written.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Up to `k` records by descending cosine similarity, ties in insertion order
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredRecord>>;

    /// Number of distinct chunk ids stored
    async fn count(&self) -> Result<usize>;

    /// Remove every record; the store forgets its dimension
    async fn clear(&self) -> Result<()>;

    /// Dimension of stored vectors, `None` while the store is empty
    async fn dimension(&self) -> Result<Option<usize>>;
}

/// Cosine similarity in `[-1, 1]`; zero when either vector has no magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Check a batch against itself and the store, returning the batch dimension
///
/// Returns `None` for an empty batch.
#[inline]
pub fn validate_batch(records: &[VectorRecord], stored: Option<usize>) -> Result<Option<usize>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };

    let expected = stored.unwrap_or(first.vector.len());
    if expected == 0 {
        return Err(RagError::Store("Cannot store empty vectors".to_string()));
    }

    if let Some(record) = records.iter().find(|r| r.vector.len() != expected) {
        return Err(RagError::DimensionMismatch {
            expected,
            actual: record.vector.len(),
        });
    }

    if let Some(record) = records
        .iter()
        .find(|r| r.vector.iter().any(|v| !v.is_finite()))
    {
        return Err(RagError::Store(format!(
            "Vector for chunk {} contains non-finite values",
            record.id
        )));
    }

    Ok(Some(expected))
}

/// Collapse duplicate ids within a batch
///
/// The last record for an id wins and takes the position of the first.
#[inline]
pub fn dedupe_batch(records: Vec<VectorRecord>) -> Vec<VectorRecord> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<VectorRecord> = Vec::with_capacity(records.len());

    for record in records {
        if let Some(&position) = positions.get(&record.id) {
            unique[position] = record;
        } else {
            positions.insert(record.id.clone(), unique.len());
            unique.push(record);
        }
    }

    unique
}

/// Reject searches that can never succeed
#[inline]
pub fn validate_query(query: &[f32], k: usize, stored: Option<usize>) -> Result<()> {
    if k == 0 {
        return Err(RagError::InvalidRequest(
            "k must be at least 1".to_string(),
        ));
    }

    if let Some(expected) = stored {
        if query.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }
    }

    Ok(())
}

/// Open the vector store selected by the configuration
#[inline]
pub async fn open_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.vector_store.backend {
        VectorBackend::Memory => {
            let path = config.vector_snapshot_path();
            info!("Using in-memory vector store with snapshot {}", path.display());
            Arc::new(MemoryVectorStore::open(path).await?)
        }
        VectorBackend::LanceDb => {
            let path = config.vector_database_path();
            info!("Using LanceDB vector store at {}", path.display());
            Arc::new(LanceVectorStore::open(&path).await?)
        }
    };

    Ok(store)
}
