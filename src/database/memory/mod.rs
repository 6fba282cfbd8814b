
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    ScoredRecord, VectorRecord, VectorStore, cosine_similarity, dedupe_batch, validate_batch,
    validate_query,
};
use crate::{RagError, Result};

/// Vector store held in memory, optionally mirrored to a JSON snapshot
///
/// Search is an exact linear scan, which suits corpora of a few thousand
/// chunks.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    dimension: Option<usize>,
    /// Records in insertion order
    records: Vec<VectorRecord>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl StoreState {
    fn reindex(&mut self) {
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id.clone(), position))
            .collect();
    }

    fn apply(&mut self, records: Vec<VectorRecord>, dimension: usize) {
        for record in records {
            if let Some(&position) = self.positions.get(&record.id) {
                self.records[position] = record;
            } else {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
        self.dimension = Some(dimension);
    }
}

impl MemoryVectorStore {
    /// A store that lives only as long as the process
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store persisted to `path`, loading any existing snapshot
    #[inline]
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let mut state: StoreState = serde_json::from_str(&content).map_err(|e| {
                    RagError::Store(format!(
                        "Failed to parse vector snapshot {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                state.reindex();
                if state.records.is_empty() {
                    state.dimension = None;
                }
                info!(
                    "Loaded {} vectors from snapshot {}",
                    state.records.len(),
                    path.display()
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No vector snapshot at {}, starting empty", path.display());
                StoreState::default()
            }
            Err(e) => {
                return Err(RagError::Store(format!(
                    "Failed to read vector snapshot {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    #[inline]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Write the snapshot next to its final location, then rename over it
    async fn persist(&self, state: &StoreState) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string(state)
            .map_err(|e| RagError::Store(format!("Failed to serialize vector snapshot: {e}")))?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await.map_err(|e| {
            warn!("Failed to write vector snapshot {}: {}", temp_path.display(), e);
            RagError::Store(format!("Failed to write vector snapshot: {e}"))
        })?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| RagError::Store(format!("Failed to replace vector snapshot: {e}")))?;

        debug!("Wrote {} vectors to {}", state.records.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut state = self.state.write().await;

        let Some(dimension) = validate_batch(&records, state.dimension)? else {
            return Ok(());
        };

        let records = dedupe_batch(records);
        let count = records.len();

        if self.snapshot_path.is_some() {
            let mut next = state.clone();
            next.apply(records, dimension);
            self.persist(&next).await?;
            *state = next;
        } else {
            state.apply(records, dimension);
        }

        debug!("Upserted {} vectors, {} stored", count, state.records.len());
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredRecord>> {
        let state = self.state.read().await;
        validate_query(query, k, state.dimension)?;

        let mut scored: Vec<(usize, f32)> = state
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (position, cosine_similarity(query, &record.vector)))
            .filter(|(_, score)| score_threshold.is_none_or(|threshold| *score >= threshold))
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredRecord {
                chunk: state.records[position].to_chunk(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.records.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let cleared = StoreState::default();
        self.persist(&cleared).await?;
        *state = cleared;

        info!("Cleared in-memory vector store");
        Ok(())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.state.read().await.dimension)
    }
}
