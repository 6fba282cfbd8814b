#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests of the retrieval pipeline with offline collaborators:
// the hashing embedder, the in-memory store and a scripted language model

use async_trait::async_trait;
use pdf_rag::config::{Config, EmbeddingConfig, VectorBackend};
use pdf_rag::corpus::{Corpus, CorpusParts};
use pdf_rag::database::{Database, MemoryVectorStore, VectorStore};
use pdf_rag::embeddings::{ChunkingConfig, Embedder, HashingEmbedder, chunk_document};
use pdf_rag::extraction::{Document, FileExtractor};
use pdf_rag::generation::{GenerationError, LanguageModel};
use pdf_rag::retrieval::ENTRY_DELIMITER;
use pdf_rag::{RagError, Stage};
use std::sync::Arc;
use tempfile::TempDir;

/// Answers with the first line of context it was given
struct FirstLineModel;

#[async_trait]
impl LanguageModel for FirstLineModel {
    async fn generate(
        &self,
        prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let context = prompt
            .split_once("Context: ")
            .map(|(_, rest)| rest)
            .ok_or_else(|| GenerationError::InvalidResponse("no context".to_string()))?;
        let answer = context.lines().nth(1).unwrap_or_default();
        Ok(answer.to_string())
    }

    fn model_id(&self) -> &str {
        "first-line"
    }
}

struct OfflineModel;

#[async_trait]
impl LanguageModel for OfflineModel {
    async fn generate(
        &self,
        _prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable("model is offline".to_string()))
    }

    fn model_id(&self) -> &str {
        "offline"
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn offline_config(temp_dir: &TempDir) -> Config {
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        embedding: EmbeddingConfig::hashing(),
        ..Config::default()
    };
    config.vector_store.backend = VectorBackend::Memory;
    config
}

async fn offline_corpus(model: Arc<dyn LanguageModel>) -> Corpus {
    let parts = CorpusParts {
        embedder: Arc::new(HashingEmbedder::default()),
        store: Arc::new(MemoryVectorStore::new()),
        registry: Database::in_memory().await.expect("in-memory registry"),
        extractor: Arc::new(FileExtractor::new()),
        model,
    };
    Corpus::new(
        Config {
            embedding: EmbeddingConfig::hashing(),
            ..Config::default()
        },
        parts,
    )
    .await
    .expect("corpus should build")
}

fn three_facts() -> Document {
    Document::from_pages(
        "facts.pdf",
        vec![
            "The sky is blue.".to_string(),
            "Water is wet.".to_string(),
            "Fire is hot.".to_string(),
        ],
    )
}

#[tokio::test]
async fn sky_question_ranks_the_sky_page_first() {
    let corpus = offline_corpus(Arc::new(FirstLineModel)).await;
    let document = three_facts();

    assert_eq!(corpus.ingest(&document).await.expect("ingest"), 3);

    let context = corpus
        .retrieve_context("What color is the sky?", 3, 4000)
        .await
        .expect("retrieval succeeds");

    assert_eq!(context.chunks[0].id, format!("{}:0", document.id));
    assert_eq!(context.chunks[0].text, "The sky is blue.");
    assert!(context.text.contains("[Source: facts.pdf, page 1]\nThe sky is blue."));
    assert!(context.sources[0].score > context.sources[1].score);
}

fn long_report() -> Document {
    let text: String = (0..150)
        .map(|i| {
            let ending = if i % 9 == 8 { "\n\n" } else { " " };
            format!(
                "Clause {i} assigns duty{} to team{} before milestone{}.{ending}",
                i * 7,
                i * 13,
                i * 3
            )
        })
        .collect();
    Document::from_pages("report.pdf", vec![text])
}

#[tokio::test]
async fn chunk_count_follows_size_and_overlap() {
    let corpus = offline_corpus(Arc::new(FirstLineModel)).await;
    let document = long_report();
    let total = document.char_count();

    let created = corpus.ingest(&document).await.expect("ingest");

    // Boundary snapping may shorten the stride by up to a fifth of the chunk size
    let lower = (total - 200).div_ceil(800);
    let upper = total.div_ceil(600) + 1;
    assert!(
        (lower..=upper).contains(&created),
        "{created} chunks for {total} characters"
    );
}

#[tokio::test]
async fn chunk_text_as_query_finds_that_chunk() {
    let corpus = offline_corpus(Arc::new(FirstLineModel)).await;
    let document = long_report();
    corpus.ingest(&document).await.expect("ingest");

    let chunks = chunk_document(&document, &ChunkingConfig::default()).expect("valid config");
    assert!(chunks.len() > 3);

    for chunk in &chunks {
        let context = corpus
            .retrieve_context(&chunk.text, 3, 100_000)
            .await
            .expect("retrieval succeeds");

        let top = context.sources[0].score;
        let own = context
            .sources
            .iter()
            .find(|source| source.chunk_id == chunk.id)
            .unwrap_or_else(|| panic!("chunk {} not retrieved by its own text", chunk.id));
        assert!(top - own.score < 1e-5, "chunk {} is not top or tied-top", chunk.id);
        assert!(own.score > 0.999);
    }
}

#[tokio::test]
async fn question_is_answered_from_the_matching_page() {
    init_test_tracing();
    let corpus = offline_corpus(Arc::new(FirstLineModel)).await;

    assert_eq!(corpus.ingest(&three_facts()).await.expect("ingest"), 3);

    let answer = corpus
        .ask("What color is the sky?", 3, 4000)
        .await
        .expect("ask succeeds");

    assert_eq!(answer.text, "The sky is blue.");
    assert_eq!(answer.sources().len(), 3);
    assert_eq!(answer.sources()[0].source_name, "facts.pdf");
    assert_eq!(answer.sources()[0].page_number, Some(1));
    assert!(
        answer
            .sources()
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score)
    );
    assert_eq!(answer.context.text.matches(ENTRY_DELIMITER).count(), 2);
}

#[tokio::test]
async fn retrieval_is_deterministic() {
    let corpus = offline_corpus(Arc::new(FirstLineModel)).await;
    corpus.ingest(&three_facts()).await.expect("ingest");

    let first = corpus
        .retrieve_context("Is fire hot?", 2, 4000)
        .await
        .expect("retrieval");
    let second = corpus
        .retrieve_context("Is fire hot?", 2, 4000)
        .await
        .expect("retrieval");

    assert_eq!(first, second);
    assert_eq!(first.sources[0].page_number, Some(3));
}

#[tokio::test]
async fn overlapping_chunks_are_not_repeated_in_context() {
    let corpus = offline_corpus(Arc::new(FirstLineModel)).await;
    let long_page = "Retrieval augmented generation combines search with a language model. "
        .repeat(40);
    let document = Document::from_pages("rag.pdf", vec![long_page.clone(), long_page]);
    let created = corpus.ingest(&document).await.expect("ingest");
    assert!(created > 2);

    let context = corpus
        .retrieve_context("What does retrieval augmented generation combine?", created, 100_000)
        .await
        .expect("retrieval");

    let mut texts: Vec<&str> = context.chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    let before = texts.len();
    texts.sort_unstable();
    texts.dedup();
    assert_eq!(texts.len(), before, "identical chunk text appears twice");
    assert!(context.chunks.len() < created);
}

#[tokio::test]
async fn generation_failure_names_the_stage_and_keeps_sources() {
    let corpus = offline_corpus(Arc::new(OfflineModel)).await;
    corpus.ingest(&three_facts()).await.expect("ingest");

    let error = corpus
        .ask("What color is the sky?", 3, 4000)
        .await
        .expect_err("generation should fail");

    assert_eq!(error.stage(), Stage::Generation);
    assert!(error.to_string().contains("model is offline"));
    let context = error.retrieved_context().expect("sources kept");
    assert_eq!(context.sources.len(), 3);
    assert!(matches!(
        error,
        RagError::Generation {
            source: GenerationError::Unavailable(_),
            ..
        }
    ));
}

#[tokio::test]
async fn corpus_persists_across_reopen() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let notes = temp_dir.path().join("notes.txt");
    std::fs::write(&notes, "The sky is blue.\u{c}Water is wet.\u{c}Fire is hot.\u{c}")
        .expect("write notes");

    {
        let corpus = Corpus::open(offline_config(&temp_dir))
            .await
            .expect("open corpus");
        let report = corpus.ingest_files(&[notes.clone()]).await;
        assert!(report.is_success());
        assert_eq!(report.total_chunks(), 3);
    }

    assert!(temp_dir.path().join("vectors.json").exists());
    assert!(temp_dir.path().join("metadata.db").exists());

    let corpus = Corpus::open(offline_config(&temp_dir))
        .await
        .expect("reopen corpus");
    assert_eq!(corpus.document_count().await.expect("count"), 1);

    let context = corpus
        .retrieve_context("What color is the sky?", 1, 4000)
        .await
        .expect("retrieval");
    assert_eq!(context.sources[0].source_name, "notes.txt");
    assert_eq!(context.sources[0].page_number, Some(1));

    corpus.clear_corpus().await.expect("clear");
    assert_eq!(corpus.document_count().await.expect("count"), 0);
    assert_eq!(corpus.stats().await.expect("stats").chunks, 0);
}

#[tokio::test]
async fn embedder_change_is_rejected_on_open() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    {
        let corpus = Corpus::open(offline_config(&temp_dir))
            .await
            .expect("open corpus");
        corpus.ingest(&three_facts()).await.expect("ingest");
    }

    let mut narrower = offline_config(&temp_dir);
    narrower.embedding.dimension = 128;

    let result = Corpus::open(narrower).await;
    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 128,
            actual: 384
        })
    ));
}

#[tokio::test]
async fn concurrent_questions_during_ingestion() {
    let embedder = Arc::new(HashingEmbedder::default());
    let store = Arc::new(MemoryVectorStore::new());
    let parts = CorpusParts {
        embedder: embedder.clone(),
        store: store.clone(),
        registry: Database::in_memory().await.expect("in-memory registry"),
        extractor: Arc::new(FileExtractor::new()),
        model: Arc::new(FirstLineModel),
    };
    let corpus = Arc::new(
        Corpus::new(
            Config {
                embedding: EmbeddingConfig::hashing(),
                ..Config::default()
            },
            parts,
        )
        .await
        .expect("corpus should build"),
    );
    corpus.ingest(&three_facts()).await.expect("ingest");

    let writer = {
        let corpus = Arc::clone(&corpus);
        tokio::spawn(async move {
            for i in 0..10 {
                let document = Document::from_pages(
                    format!("extra-{i}.pdf"),
                    vec![format!("Extra page {i} about oceans.")],
                );
                corpus.ingest(&document).await.expect("ingest");
            }
        })
    };

    let query = embedder
        .embed_one("What color is the sky?")
        .await
        .expect("embed");
    for _ in 0..20 {
        let hits = store.search(&query, 3, None).await.expect("search");
        assert_eq!(hits[0].chunk.text, "The sky is blue.");
        tokio::task::yield_now().await;
    }

    writer.await.expect("writer task");
    assert_eq!(store.count().await.expect("count"), 13);
}
