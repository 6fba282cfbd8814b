// LanceDB vector database module
// Arrow schema and conversions for the chunk table


pub mod vector_store;

pub use vector_store::LanceVectorStore;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, StringArray, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use super::{RecordMetadata, ScoredRecord};
use crate::{RagError, Result};

pub const TABLE_NAME: &str = "chunks";
pub const VECTOR_COLUMN: &str = "vector";
pub const SEQ_COLUMN: &str = "seq";
const DISTANCE_COLUMN: &str = "_distance";

/// A record as written to the table, with its insertion sequence number
#[derive(Debug, Clone)]
pub struct SequencedRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
    pub seq: u64,
}

/// Schema of the chunk table for a given vector dimension
#[inline]
pub fn chunk_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("source_name", DataType::Utf8, false),
        Field::new("page_number", DataType::UInt32, true),
        Field::new("ordinal", DataType::UInt64, false),
        Field::new("start", DataType::UInt64, false),
        Field::new("end", DataType::UInt64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(SEQ_COLUMN, DataType::UInt64, false),
    ]))
}

/// Read the vector dimension back from a table schema
#[inline]
pub fn schema_dimension(schema: &Schema) -> Option<usize> {
    schema.fields().iter().find_map(|field| {
        if field.name() != VECTOR_COLUMN {
            return None;
        }
        match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        }
    })
}

/// Build a RecordBatch from records that all have `vector_dim` components
#[inline]
pub fn to_record_batch(records: &[SequencedRecord], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();

    let mut flat_values = Vec::with_capacity(len * vector_dim);
    for record in records {
        flat_values.extend_from_slice(&record.vector);
    }
    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array =
        FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| RagError::Store(format!("Failed to create vector array: {}", e)))?;

    let mut ids = Vec::with_capacity(len);
    let mut document_ids = Vec::with_capacity(len);
    let mut source_names = Vec::with_capacity(len);
    let mut page_numbers = Vec::with_capacity(len);
    let mut ordinals = Vec::with_capacity(len);
    let mut starts = Vec::with_capacity(len);
    let mut ends = Vec::with_capacity(len);
    let mut texts = Vec::with_capacity(len);
    let mut seqs = Vec::with_capacity(len);

    for record in records {
        ids.push(record.id.as_str());
        document_ids.push(record.metadata.document_id.as_str());
        source_names.push(record.metadata.source_name.as_str());
        page_numbers.push(record.metadata.page_number);
        ordinals.push(record.metadata.ordinal as u64);
        starts.push(record.metadata.start as u64);
        ends.push(record.metadata.end as u64);
        texts.push(record.metadata.text.as_str());
        seqs.push(record.seq);
    }

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(document_ids)),
        Arc::new(StringArray::from(source_names)),
        Arc::new(UInt32Array::from(page_numbers)),
        Arc::new(UInt64Array::from(ordinals)),
        Arc::new(UInt64Array::from(starts)),
        Arc::new(UInt64Array::from(ends)),
        Arc::new(StringArray::from(texts)),
        Arc::new(UInt64Array::from(seqs)),
    ];

    RecordBatch::try_new(chunk_schema(vector_dim), arrays)
        .map_err(|e| RagError::Store(format!("Failed to create record batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
}

/// Parse a search result batch into scored chunks, each paired with its sequence number
#[inline]
pub fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<(ScoredRecord, u64)>> {
    let ids = column::<StringArray>(batch, "id")?;
    let document_ids = column::<StringArray>(batch, "document_id")?;
    let source_names = column::<StringArray>(batch, "source_name")?;
    let page_numbers = column::<UInt32Array>(batch, "page_number")?;
    let ordinals = column::<UInt64Array>(batch, "ordinal")?;
    let starts = column::<UInt64Array>(batch, "start")?;
    let ends = column::<UInt64Array>(batch, "end")?;
    let texts = column::<StringArray>(batch, "text")?;
    let seqs = column::<UInt64Array>(batch, SEQ_COLUMN)?;
    let distances = column::<Float32Array>(batch, DISTANCE_COLUMN)?;

    let mut results = Vec::with_capacity(batch.num_rows());

    for row in 0..batch.num_rows() {
        let metadata = RecordMetadata {
            document_id: document_ids.value(row).to_string(),
            source_name: source_names.value(row).to_string(),
            page_number: if page_numbers.is_null(row) {
                None
            } else {
                Some(page_numbers.value(row))
            },
            ordinal: ordinals.value(row) as usize,
            start: starts.value(row) as usize,
            end: ends.value(row) as usize,
            text: texts.value(row).to_string(),
        };

        // Cosine distance is 1 - similarity
        let distance = if distances.is_null(row) {
            1.0
        } else {
            distances.value(row)
        };

        results.push((
            ScoredRecord {
                chunk: metadata.to_chunk(ids.value(row)),
                score: (1.0 - distance).clamp(-1.0, 1.0),
            },
            seqs.value(row),
        ));
    }

    Ok(results)
}

/// Parse `(id, seq)` pairs from a projection of those two columns
#[inline]
pub fn parse_sequence_batch(batch: &RecordBatch) -> Result<Vec<(String, u64)>> {
    let ids = column::<StringArray>(batch, "id")?;
    let seqs = column::<UInt64Array>(batch, SEQ_COLUMN)?;

    Ok((0..batch.num_rows())
        .map(|row| (ids.value(row).to_string(), seqs.value(row)))
        .collect())
}
