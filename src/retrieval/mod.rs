//! Question-time retrieval: embed the question, search, rank and assemble context


pub mod context;

pub use context::{AssembledContext, ContextAssembler, ENTRY_DELIMITER, format_entry};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::database::{ScoredRecord, VectorStore};
use crate::embeddings::Embedder;
use crate::{RagError, Result, Stage};

/// Ranked chunks for one question, best first
pub type RetrievalResult = Vec<ScoredRecord>;

/// Finds the chunks most similar to a question
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    timeout: Option<Duration>,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            timeout: None,
        }
    }

    /// Bound the whole retrieval (embedding plus search)
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[inline]
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<RetrievalResult> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidRequest(
                "Question must not be empty".to_string(),
            ));
        }
        if k == 0 {
            return Err(RagError::InvalidRequest("k must be at least 1".to_string()));
        }

        let work = self.retrieve_inner(question, k, score_threshold);

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                warn!("Retrieval timed out after {:?}", limit);
                RagError::Timeout {
                    stage: Stage::Retrieval,
                    after: limit,
                }
            })?,
            None => work.await,
        }
    }

    async fn retrieve_inner(
        &self,
        question: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<RetrievalResult> {
        let query = self.embedder.embed_one(question).await?;
        let hits = self
            .store
            .search(&query, k, score_threshold)
            .await
            .map_err(|e| e.during(Stage::Retrieval))?;

        let results = rank_unique(hits);
        debug!(
            "Retrieved {} chunks for question ({} chars)",
            results.len(),
            question.chars().count()
        );
        Ok(results)
    }
}

/// Drop repeated chunk ids, keeping the best-scored occurrence
///
/// Input order is kept among equal scores.
#[inline]
pub fn rank_unique(mut hits: Vec<ScoredRecord>) -> RetrievalResult {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen = HashSet::with_capacity(hits.len());
    hits.retain(|hit| seen.insert(hit.chunk.id.clone()));
    hits
}
