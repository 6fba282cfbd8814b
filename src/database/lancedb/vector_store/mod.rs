
use arrow::record_batch::RecordBatchIterator;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{
    SEQ_COLUMN, SequencedRecord, TABLE_NAME, VECTOR_COLUMN, chunk_schema, parse_search_batch,
    parse_sequence_batch, schema_dimension, to_record_batch,
};
use crate::database::{
    ScoredRecord, VectorRecord, VectorStore, dedupe_batch, validate_batch, validate_query,
};
use crate::{RagError, Result};

/// Vector store backed by a LanceDB table on disk
///
/// The table is created on the first upsert, with its vector column sized to
/// that batch. A `seq` column records insertion order for tie-breaking.
pub struct LanceVectorStore {
    connection: Connection,
    table_name: String,
    state: RwLock<TableState>,
}

#[derive(Debug, Default)]
struct TableState {
    dimension: Option<usize>,
    last_seq: u64,
}

impl TableState {
    /// Sequence numbers derive from the clock so they keep growing across restarts
    fn next_seq(&mut self) -> u64 {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|nanos| u64::try_from(nanos).ok())
            .unwrap_or(0);
        self.last_seq = now.max(self.last_seq + 1);
        self.last_seq
    }
}

/// The `limit` nearest rows by cosine distance, with their sequence numbers
async fn nearest(table: &Table, query: &[f32], limit: usize) -> Result<Vec<(ScoredRecord, u64)>> {
    debug!("Searching for similar vectors with limit: {}", limit);

    let stream = table
        .vector_search(query)
        .map_err(|e| store_error("Failed to create vector search", e))?
        .column(VECTOR_COLUMN)
        .distance_type(DistanceType::Cosine)
        .limit(limit)
        .execute()
        .await
        .map_err(|e| store_error("Failed to execute search", e))?;

    let batches: Vec<_> = stream
        .try_collect()
        .await
        .map_err(|e| store_error("Failed to read result stream", e))?;

    let mut rows = Vec::new();
    for batch in &batches {
        rows.extend(parse_search_batch(batch)?);
    }
    Ok(rows)
}

fn store_error(context: &str, error: impl std::fmt::Display) -> RagError {
    RagError::Store(format!("{context}: {error}"))
}

impl LanceVectorStore {
    /// Open (or create) the database directory at `db_path`
    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path)
            .map_err(|e| store_error("Failed to create vector database directory", e))?;

        let uri = db_path.display().to_string();

        // Attempt to connect with corruption recovery
        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                if looks_corrupt(&e.to_string()) {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        store_error("Failed to connect to LanceDB after recovery", e)
                    })?
                } else {
                    return Err(store_error("Failed to connect to LanceDB", e));
                }
            }
        };

        let store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            state: RwLock::new(TableState::default()),
        };

        store.load_table_state().await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    /// Read the dimension of an existing table, dropping it if unreadable
    async fn load_table_state(&self) -> Result<()> {
        let mut state = self.state.write().await;

        match self.detect_existing_vector_dimension().await {
            Ok(dimension) => {
                if let Some(dim) = dimension {
                    info!("Detected existing vector dimension: {}", dim);
                }
                state.dimension = dimension;
                Ok(())
            }
            Err(e) if looks_corrupt(&e.to_string()) => {
                warn!("Table corruption detected during initialization: {}", e);
                self.drop_table_if_exists().await?;
                state.dimension = None;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| store_error("Failed to list tables", e))?;

        Ok(table_names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map(Some)
            .map_err(|e| store_error("Failed to open table", e))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<Option<usize>> {
        let Some(table) = self.open_table().await? else {
            return Ok(None);
        };

        let schema = table
            .schema()
            .await
            .map_err(|e| store_error("Failed to get table schema", e))?;

        let dimension = schema_dimension(&schema).ok_or_else(|| {
            RagError::Store("Invalid schema: could not find vector column".to_string())
        })?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| store_error("Failed to count rows", e))?;

        Ok((rows > 0).then_some(dimension))
    }

    async fn create_table(&self, vector_dim: usize) -> Result<Table> {
        info!("Creating {} table with {} dimensions", self.table_name, vector_dim);

        self.connection
            .create_empty_table(&self.table_name, chunk_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| store_error("Failed to create table", e))
    }

    /// Existing sequence numbers for the given ids
    async fn existing_sequences(
        &self,
        table: &Table,
        records: &[VectorRecord],
    ) -> Result<HashMap<String, u64>> {
        let id_list = records
            .iter()
            .map(|r| format!("'{}'", r.id.replace('\'', "''")))
            .join(", ");

        let stream = table
            .query()
            .only_if(format!("id IN ({id_list})"))
            .select(Select::columns(&["id", SEQ_COLUMN]))
            .limit(records.len())
            .execute()
            .await
            .map_err(|e| store_error("Failed to look up existing records", e))?;

        let batches: Vec<_> = stream
            .try_collect()
            .await
            .map_err(|e| store_error("Failed to read existing records", e))?;

        let mut sequences = HashMap::new();
        for batch in &batches {
            sequences.extend(parse_sequence_batch(batch)?);
        }
        Ok(sequences)
    }

    /// Drop the table if it exists
    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping existing {} table", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| store_error("Failed to drop table", e))?;
        }

        Ok(())
    }

    /// Compact table files after many upserts
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        let _guard = self.state.write().await;
        let Some(table) = self.open_table().await? else {
            return Ok(());
        };

        debug!("Optimizing vector database");
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| store_error("Failed to optimize table", e))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// Attempt to recover from database corruption
    fn attempt_corruption_recovery(db_path: &Path) -> Result<()> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path)
                .map_err(|e| store_error("Failed to remove corrupted database", e))?;
        }

        std::fs::create_dir_all(db_path)
            .map_err(|e| store_error("Failed to recreate vector database directory", e))?;

        info!("Database corruption recovery completed");
        Ok(())
    }
}

fn looks_corrupt(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("corrupt") || message.contains("invalid") || message.contains("malformed")
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut state = self.state.write().await;

        let Some(dimension) = validate_batch(&records, state.dimension)? else {
            debug!("No embeddings to store");
            return Ok(());
        };

        let records = dedupe_batch(records);
        debug!("Storing batch of {} embeddings", records.len());

        let table = match self.open_table().await? {
            Some(table) if state.dimension.is_some() => table,
            // An empty table may have been sized for an earlier dimension
            Some(_) => {
                self.drop_table_if_exists().await?;
                self.create_table(dimension).await?
            }
            None => self.create_table(dimension).await?,
        };

        let existing = if state.dimension.is_some() {
            self.existing_sequences(&table, &records).await?
        } else {
            HashMap::new()
        };

        let sequenced: Vec<SequencedRecord> = records
            .into_iter()
            .map(|record| {
                let seq = existing
                    .get(&record.id)
                    .copied()
                    .unwrap_or_else(|| state.next_seq());
                SequencedRecord {
                    id: record.id,
                    vector: record.vector,
                    metadata: record.metadata,
                    seq,
                }
            })
            .collect();

        let count = sequenced.len();
        let record_batch = to_record_batch(&sequenced, dimension)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| store_error("Failed to upsert embeddings", e))?;

        state.dimension = Some(dimension);
        info!(
            "Stored {} embeddings ({} replaced)",
            count,
            existing.len()
        );
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

        if state.dimension.is_none() {
            return Ok(Vec::new());
        }
        let Some(table) = self.open_table().await? else {
            return Ok(Vec::new());
        };

        // LanceDB cuts at `limit` without regard to insertion order, so keep
        // widening the window until the rows tied with the k-th are all in
        let mut limit = k.saturating_add(1);
        let mut results = loop {
            let mut rows = nearest(&table, query, limit).await?;
            rows.sort_by(|a, b| b.0.score.total_cmp(&a.0.score).then(a.1.cmp(&b.1)));

            let exhausted = rows.len() < limit;
            let tie_cut = rows
                .get(k - 1)
                .zip(rows.last())
                .is_some_and(|(kth, last)| kth.0.score <= last.0.score);
            if exhausted || !tie_cut {
                break rows;
            }

            debug!("Scores tied at position {}, widening search to {}", k, limit.saturating_mul(2));
            limit = limit.saturating_mul(2);
        };

        results.retain(|(hit, _)| score_threshold.is_none_or(|threshold| hit.score >= threshold));
        results.truncate(k);

        debug!("Found {} results", results.len());
        Ok(results.into_iter().map(|(hit, _)| hit).collect())
    }

    async fn count(&self) -> Result<usize> {
        let _state = self.state.read().await;
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        table
            .count_rows(None)
            .await
            .map_err(|e| store_error("Failed to count rows", e))
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.drop_table_if_exists().await?;
        state.dimension = None;

        info!("Cleared LanceDB vector store");
        Ok(())
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.state.read().await.dimension)
    }
}
