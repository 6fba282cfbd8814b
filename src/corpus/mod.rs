//! The corpus ties the pipeline together: ingestion on one side, questions on the other


use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::sqlite::models::{DocumentRecord, NewDocumentRecord};
use crate::database::{Database, VectorRecord, VectorStore, open_vector_store};
use crate::embeddings::chunking::chunk_document;
use crate::embeddings::{Embedder, create_embedder};
use crate::extraction::{Document, FileExtractor, TextExtractor, source_name};
use crate::generation::{Answer, Answerer, LanguageModel, OllamaGenerator};
use crate::retrieval::{AssembledContext, ContextAssembler, Retriever};
use crate::{RagError, Result, Stage};

/// Collaborators a [`Corpus`] is assembled from
pub struct CorpusParts {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub registry: Database,
    pub extractor: Arc<dyn TextExtractor>,
    pub model: Arc<dyn LanguageModel>,
}

/// A file that was ingested by [`Corpus::ingest_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFile {
    pub path: PathBuf,
    pub document_id: String,
    pub chunks: usize,
}

#[derive(Debug)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: RagError,
}

/// Outcome of ingesting several files; one failure does not stop the rest
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<IngestedFile>,
    /// Files whose name is already registered
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<IngestFailure>,
}

impl IngestReport {
    #[inline]
    pub fn total_chunks(&self) -> usize {
        self.ingested.iter().map(|file| file.chunks).sum()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress of one file during [`Corpus::ingest_files_with_progress`]
#[derive(Debug)]
pub enum IngestEvent<'a> {
    Ingested(&'a IngestedFile),
    Skipped(&'a Path),
    Failed(&'a IngestFailure),
}

/// Counts shown by the `status` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: Option<usize>,
    pub embedding_model: String,
    pub generation_model: String,
}

enum FileOutcome {
    Ingested(IngestedFile),
    Skipped(PathBuf),
    Failed(IngestFailure),
}

/// A searchable collection of documents with question answering on top
pub struct Corpus {
    config: Config,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    registry: Database,
    extractor: Arc<dyn TextExtractor>,
    retriever: Retriever,
    answerer: Answerer,
}

impl Corpus {
    /// Build every collaborator from configuration
    #[inline]
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        info!("Opening corpus in {}", config.get_base_dir().display());

        let embedder = create_embedder(&config)?;
        let store = open_vector_store(&config).await?;
        let registry = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(|e| RagError::Store(format!("{e:#}")))?;
        let model = OllamaGenerator::new(
            &config.ollama,
            Duration::from_secs(config.generation.timeout_secs),
        )?;

        Self::new(
            config,
            CorpusParts {
                embedder,
                store,
                registry,
                extractor: Arc::new(FileExtractor::new()),
                model: Arc::new(model),
            },
        )
        .await
    }

    /// Assemble a corpus from existing collaborators
    ///
    /// Fails when the store already holds vectors of a different dimension
    /// than the embedder produces.
    #[inline]
    pub async fn new(config: Config, parts: CorpusParts) -> Result<Self> {
        config.chunking.validate()?;

        if let Some(stored) = parts.store.dimension().await? {
            let expected = parts.embedder.dimension();
            if stored != expected {
                warn!(
                    "Vector store holds {}-dimensional vectors but {} produces {}",
                    stored,
                    parts.embedder.model_id(),
                    expected
                );
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: stored,
                });
            }
        }

        let retriever = Retriever::new(Arc::clone(&parts.embedder), Arc::clone(&parts.store))
            .with_timeout(Duration::from_secs(config.retrieval.timeout_secs));
        let answerer = Answerer::new(parts.model, config.generation.clone());

        Ok(Self {
            config,
            embedder: parts.embedder,
            store: parts.store,
            registry: parts.registry,
            extractor: parts.extractor,
            retriever,
            answerer,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Chunk, embed and store a document, returning how many chunks were created
    ///
    /// Documents without text are still registered, with zero chunks.
    #[inline]
    pub async fn ingest(&self, document: &Document) -> Result<usize> {
        let chunks = chunk_document(document, &self.config.chunking)?;

        if chunks.is_empty() {
            warn!(
                "Document '{}' has no extractable text, registering it without chunks",
                document.source_name
            );
        } else {
            let batch_size = (self.config.ollama.batch_size as usize).max(1);
            let mut records = Vec::with_capacity(chunks.len());

            for batch in chunks.chunks(batch_size) {
                let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
                let vectors = self.embedder.embed(&texts).await?;

                records.extend(
                    batch
                        .iter()
                        .zip(vectors)
                        .map(|(chunk, vector)| VectorRecord::from_chunk(chunk, vector)),
                );
                debug!(
                    "Embedded {}/{} chunks of '{}'",
                    records.len(),
                    chunks.len(),
                    document.source_name
                );
            }

            self.store
                .upsert(records)
                .await
                .map_err(|e| e.during(Stage::Ingestion))?;
        }

        self.registry
            .register_document(NewDocumentRecord::for_document(
                document,
                chunks.len(),
                self.embedder.model_id(),
            ))
            .await
            .map_err(|e| RagError::Store(format!("{e:#}")).during(Stage::Ingestion))?;

        info!(
            "Ingested '{}': {} pages, {} chunks",
            document.source_name,
            document.pages.len(),
            chunks.len()
        );
        Ok(chunks.len())
    }

    /// Extract and ingest a single file
    #[inline]
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestedFile> {
        let document = self.extractor.extract_document(path).await?;
        let chunks = self.ingest(&document).await?;

        Ok(IngestedFile {
            path: path.to_path_buf(),
            document_id: document.id,
            chunks,
        })
    }

    #[inline]
    pub async fn ingest_files(&self, paths: &[PathBuf]) -> IngestReport {
        self.ingest_files_with_progress(paths, |_| {}).await
    }

    /// Ingest files concurrently, bounded by `ingestion.parallel_documents`
    ///
    /// Files already registered under the same name are skipped.
    #[inline]
    pub async fn ingest_files_with_progress<F>(
        &self,
        paths: &[PathBuf],
        mut on_event: F,
    ) -> IngestReport
    where
        F: FnMut(IngestEvent<'_>) + Send,
    {
        let parallel = self.config.ingestion.parallel_documents.max(1);
        info!("Ingesting {} files ({} at a time)", paths.len(), parallel);

        let mut outcomes = stream::iter(paths.iter().cloned())
            .map(|path| self.ingest_one(path))
            .buffer_unordered(parallel);

        let mut report = IngestReport::default();
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                FileOutcome::Ingested(file) => {
                    on_event(IngestEvent::Ingested(&file));
                    report.ingested.push(file);
                }
                FileOutcome::Skipped(path) => {
                    on_event(IngestEvent::Skipped(&path));
                    report.skipped.push(path);
                }
                FileOutcome::Failed(failure) => {
                    on_event(IngestEvent::Failed(&failure));
                    report.failed.push(failure);
                }
            }
        }

        info!(
            "Ingestion finished: {} ingested, {} skipped, {} failed",
            report.ingested.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    async fn ingest_one(&self, path: PathBuf) -> FileOutcome {
        match self.is_registered(&path).await {
            Ok(true) => {
                info!("Skipping {}, already ingested", path.display());
                return FileOutcome::Skipped(path);
            }
            Ok(false) => {}
            Err(error) => return FileOutcome::Failed(IngestFailure { path, error }),
        }

        match self.ingest_file(&path).await {
            Ok(file) => FileOutcome::Ingested(file),
            Err(error) => {
                warn!("Failed to ingest {}: {}", path.display(), error);
                FileOutcome::Failed(IngestFailure { path, error })
            }
        }
    }

    async fn is_registered(&self, path: &Path) -> Result<bool> {
        let existing = self
            .registry
            .find_documents_by_source(&source_name(path))
            .await
            .map_err(|e| RagError::Store(format!("{e:#}")).during(Stage::Ingestion))?;
        Ok(!existing.is_empty())
    }

    /// Retrieve and assemble context for a question
    #[inline]
    pub async fn retrieve_context(
        &self,
        question: &str,
        k: usize,
        max_context_size: usize,
    ) -> Result<AssembledContext> {
        let hits = self
            .retriever
            .retrieve(question, k, self.config.retrieval.score_threshold)
            .await?;

        Ok(ContextAssembler::new(max_context_size).assemble(&hits))
    }

    /// Generate an answer from context that was already retrieved
    ///
    /// On failure the context is handed back inside [`RagError::Generation`]
    /// so generation can be retried without retrieving again.
    #[inline]
    pub async fn answer_with_context(
        &self,
        question: &str,
        context: AssembledContext,
    ) -> Result<Answer> {
        match self.answerer.answer(question, &context).await {
            Ok(answer) => Ok(answer),
            Err(source) => {
                warn!(
                    "Answer generation failed with {} sources retrieved: {}",
                    context.sources.len(),
                    source
                );
                Err(RagError::Generation {
                    source,
                    context: Box::new(context),
                })
            }
        }
    }

    #[inline]
    pub async fn ask(&self, question: &str, k: usize, max_context_size: usize) -> Result<Answer> {
        let context = self.retrieve_context(question, k, max_context_size).await?;
        self.answer_with_context(question, context).await
    }

    /// [`Corpus::ask`] with `k` and the context budget from configuration
    #[inline]
    pub async fn ask_default(&self, question: &str) -> Result<Answer> {
        self.ask(
            question,
            self.config.retrieval.k,
            self.config.retrieval.max_context_size,
        )
        .await
    }

    /// Remove every chunk and document
    #[inline]
    pub async fn clear_corpus(&self) -> Result<()> {
        self.store.clear().await?;
        let removed = self
            .registry
            .clear_documents()
            .await
            .map_err(|e| RagError::Store(format!("{e:#}")))?;

        info!("Cleared corpus ({} documents removed)", removed);
        Ok(())
    }

    #[inline]
    pub async fn document_count(&self) -> Result<usize> {
        self.registry
            .document_count()
            .await
            .map_err(|e| RagError::Store(format!("{e:#}")))
    }

    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        self.registry
            .list_documents()
            .await
            .map_err(|e| RagError::Store(format!("{e:#}")))
    }

    #[inline]
    pub async fn stats(&self) -> Result<CorpusStats> {
        Ok(CorpusStats {
            documents: self.document_count().await?,
            chunks: self.store.count().await?,
            dimension: self.store.dimension().await?,
            embedding_model: self.embedder.model_id().to_string(),
            generation_model: self.answerer.model_id().to_string(),
        })
    }
}
