use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::generation::GenerationError;
use crate::retrieval::AssembledContext;

pub type Result<T> = std::result::Result<T, RagError>;

/// The pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Ingestion,
    Embedding,
    Retrieval,
    Generation,
}

impl fmt::Display for Stage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Stage::Configuration => write!(f, "configuration"),
            Stage::Ingestion => write!(f, "ingestion"),
            Stage::Embedding => write!(f, "embedding"),
            Stage::Retrieval => write!(f, "retrieval"),
            Stage::Generation => write!(f, "generation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: embedding dimension mismatch (expected {expected}, got {actual})")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Extraction error for {source_name}: {message}")]
    Extraction {
        source_name: String,
        message: String,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    /// Answer generation failed after retrieval succeeded. The assembled
    /// context is kept so the caller can report sources or retry generation.
    #[error("Answer generation failed: {source}")]
    Generation {
        #[source]
        source: GenerationError,
        context: Box<AssembledContext>,
    },

    /// A storage or I/O failure attributed to the stage that ran into it
    #[error("{stage} failed: {source}")]
    Staged {
        stage: Stage,
        #[source]
        source: Box<RagError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Which stage of the pipeline failed
    #[inline]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::DimensionMismatch { .. } => Stage::Configuration,
            Self::Extraction { .. } | Self::Io(_) | Self::Other(_) => Stage::Ingestion,
            Self::Embedding(_) => Stage::Embedding,
            Self::Store(_) | Self::InvalidRequest(_) => Stage::Retrieval,
            Self::Timeout { stage, .. } | Self::Staged { stage, .. } => *stage,
            Self::Generation { .. } => Stage::Generation,
        }
    }

    /// Whether the failed call may succeed if repeated unchanged
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Staged { source, .. } => source.is_retryable(),
            other => matches!(
                other,
                Self::Embedding(_) | Self::Store(_) | Self::Timeout { .. } | Self::Generation { .. }
            ),
        }
    }

    /// Attribute a stage-neutral failure (store, I/O, other) to `stage`
    ///
    /// Errors that already name their stage are returned unchanged.
    #[inline]
    #[must_use]
    pub fn during(self, stage: Stage) -> Self {
        match self {
            Self::Store(_) | Self::Io(_) | Self::Other(_) => Self::Staged {
                stage,
                source: Box::new(self),
            },
            other => other,
        }
    }

    /// Sources that were retrieved before the failure, if any
    #[inline]
    pub fn retrieved_context(&self) -> Option<&AssembledContext> {
        match self {
            Self::Generation { context, .. } => Some(context),
            Self::Staged { source, .. } => source.retrieved_context(),
            _ => None,
        }
    }
}

pub mod commands;
pub mod config;
pub mod corpus;
pub mod database;
pub mod embeddings;
pub mod extraction;
pub mod generation;
pub mod retrieval;
