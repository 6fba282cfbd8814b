
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

const SELECT_DOCUMENT: &str = "SELECT id, source_name, page_count, chunk_count, char_count, \
                               embedding_model, ingested_date FROM documents";

pub struct DocumentQueries;

impl DocumentQueries {
    /// Insert a document, replacing any earlier row with the same id
    #[inline]
    pub async fn create(pool: &SqlitePool, document: NewDocumentRecord) -> Result<DocumentRecord> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, source_name, page_count, chunk_count, char_count, embedding_model, ingested_date)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_name = excluded.source_name,
                page_count = excluded.page_count,
                chunk_count = excluded.chunk_count,
                char_count = excluded.char_count,
                embedding_model = excluded.embedding_model,
                ingested_date = excluded.ingested_date
            "#,
        )
        .bind(&document.id)
        .bind(&document.source_name)
        .bind(document.page_count)
        .bind(document.chunk_count)
        .bind(document.char_count)
        .bind(&document.embedding_model)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?;

        debug!("Registered document {} ({})", document.id, document.source_name);

        Self::get_by_id(pool, &document.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(&format!("{SELECT_DOCUMENT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get document by id")
    }

    #[inline]
    pub async fn get_by_source_name(
        pool: &SqlitePool,
        source_name: &str,
    ) -> Result<Vec<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(&format!(
            "{SELECT_DOCUMENT} WHERE source_name = ? ORDER BY ingested_date, rowid"
        ))
        .bind(source_name)
        .fetch_all(pool)
        .await
        .context("Failed to get documents by source name")
    }

    /// All documents, oldest first
    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(&format!(
            "{SELECT_DOCUMENT} ORDER BY ingested_date, rowid"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list documents")
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(pool)
            .await
            .context("Failed to count documents")?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    #[inline]
    pub async fn total_chunks(pool: &SqlitePool) -> Result<i64> {
        let total: Option<i64> = sqlx::query_scalar("SELECT SUM(chunk_count) FROM documents")
            .fetch_one(pool)
            .await
            .context("Failed to sum chunk counts")?;

        Ok(total.unwrap_or(0))
    }

    #[inline]
    pub async fn delete_by_id(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every document, returning how many were removed
    #[inline]
    pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents")
            .execute(pool)
            .await
            .context("Failed to delete documents")?;

        debug!("Deleted {} documents", result.rows_affected());
        Ok(result.rows_affected())
    }
}
