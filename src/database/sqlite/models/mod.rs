
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::extraction::Document;

/// A document as recorded in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentRecord {
    pub id: String,
    pub source_name: String,
    pub page_count: i64,
    pub chunk_count: i64,
    pub char_count: i64,
    pub embedding_model: String,
    pub ingested_date: NaiveDateTime,
}

impl DocumentRecord {
    /// Whether ingestion produced no searchable text
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocumentRecord {
    pub id: String,
    pub source_name: String,
    pub page_count: i64,
    pub chunk_count: i64,
    pub char_count: i64,
    pub embedding_model: String,
}

impl NewDocumentRecord {
    #[inline]
    pub fn for_document(document: &Document, chunk_count: usize, embedding_model: &str) -> Self {
        Self {
            id: document.id.clone(),
            source_name: document.source_name.clone(),
            page_count: document.pages.len() as i64,
            chunk_count: chunk_count as i64,
            char_count: document.char_count() as i64,
            embedding_model: embedding_model.to_string(),
        }
    }
}
