use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::RagError;
use crate::config::{Config, EmbeddingProvider};
use crate::corpus::{Corpus, IngestEvent};
use crate::embeddings::OllamaClient;
use crate::extraction::{is_supported, source_name};
use crate::generation::Answer;
use crate::retrieval::AssembledContext;

/// Ingest files, and every supported file directly inside given directories
#[inline]
pub async fn ingest(config: Config, paths: &[PathBuf]) -> Result<()> {
    let files = collect_inputs(paths)?;
    if files.is_empty() {
        println!("No PDF or text files found.");
        return Ok(());
    }

    let corpus = Corpus::open(config)
        .await
        .context("Failed to open corpus")?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(files.len() as u64).with_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                .context("Invalid progress bar template")?,
        )
    } else {
        ProgressBar::hidden()
    };

    let report = corpus
        .ingest_files_with_progress(&files, |event| {
            match event {
                IngestEvent::Ingested(file) => {
                    bar.set_message(source_name(&file.path));
                }
                IngestEvent::Skipped(path) => {
                    bar.println(format!("Skipped {} (already ingested)", path.display()));
                }
                IngestEvent::Failed(failure) => {
                    bar.println(format!(
                        "{} {}: {}",
                        style("✗").red(),
                        failure.path.display(),
                        failure.error
                    ));
                }
            }
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();

    for file in &report.ingested {
        println!(
            "{} {} ({} chunks)",
            style("✓").green(),
            file.path.display(),
            file.chunks
        );
    }

    println!();
    println!("Ingestion complete:");
    println!("  Documents ingested: {}", report.ingested.len());
    println!("  Chunks created: {}", report.total_chunks());
    if !report.skipped.is_empty() {
        println!("  Already ingested: {}", report.skipped.len());
    }

    if report.is_success() {
        Ok(())
    } else {
        for failure in &report.failed {
            warn!("{} failed: {}", failure.path.display(), failure.error);
        }
        Err(anyhow::anyhow!(
            "{} of {} files failed to ingest",
            report.failed.len(),
            files.len()
        ))
    }
}

/// Answer a question from the ingested documents
#[inline]
pub async fn ask(
    config: Config,
    question: &str,
    k: Option<usize>,
    max_context_size: Option<usize>,
    show_context: bool,
) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.k);
    let max_context_size = max_context_size.unwrap_or(config.retrieval.max_context_size);

    let corpus = Corpus::open(config)
        .await
        .context("Failed to open corpus")?;

    info!("Answering question with k={}, budget={}", k, max_context_size);

    match corpus.ask(question, k, max_context_size).await {
        Ok(answer) => {
            print_answer(&answer, show_context);
            Ok(())
        }
        Err(error @ RagError::Generation { .. }) => {
            println!("{}", style("Answer generation failed.").red().bold());
            if let Some(context) = error.retrieved_context() {
                print_sources(context);
            }
            Err(error.into())
        }
        Err(error) => Err(anyhow::Error::new(error).context("Failed to answer the question")),
    }
}

/// One line typed at the chat prompt
#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Exit,
    Blank,
    Question(&'a str),
}

impl<'a> ChatInput<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            Self::Blank
        } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            Self::Exit
        } else {
            Self::Question(line)
        }
    }
}

/// Answer questions typed at a prompt until `exit`
#[inline]
pub async fn chat(
    config: Config,
    k: Option<usize>,
    max_context_size: Option<usize>,
) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.k);
    let max_context_size = max_context_size.unwrap_or(config.retrieval.max_context_size);

    let corpus = Corpus::open(config)
        .await
        .context("Failed to open corpus")?;

    if corpus.document_count().await? == 0 {
        println!("No documents have been ingested yet.");
        println!("Use 'pdf-rag ingest <file.pdf>' to add one.");
        return Ok(());
    }

    println!("{}", "=".repeat(60));
    println!("{}", style("PDF question answering").bold());
    println!("{}", "=".repeat(60));
    println!("Ask about your documents. Type 'exit' to quit.");
    println!();

    loop {
        let line = match Input::<String>::new()
            .with_prompt("Your question")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                info!("Leaving chat: {}", e);
                break;
            }
        };

        let question = match ChatInput::parse(&line) {
            ChatInput::Exit => break,
            ChatInput::Blank => {
                println!("Please enter a question.");
                continue;
            }
            ChatInput::Question(question) => question,
        };

        match corpus.ask(question, k, max_context_size).await {
            Ok(answer) => print_answer(&answer, false),
            Err(error) => {
                println!("{} {} failed: {}", style("✗").red(), error.stage(), error);
                if let Some(context) = error.retrieved_context() {
                    print_sources(context);
                }
            }
        }
        println!();
        println!("{}", "-".repeat(60));
        println!();
    }

    println!("Goodbye!");
    Ok(())
}

/// Show the context that would be sent for a question, without generating
#[inline]
pub async fn search(config: Config, question: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.k);
    let max_context_size = config.retrieval.max_context_size;

    let corpus = Corpus::open(config)
        .await
        .context("Failed to open corpus")?;

    let context = corpus
        .retrieve_context(question, k, max_context_size)
        .await
        .context("Retrieval failed")?;

    if context.is_empty() {
        println!("No relevant passages found.");
        return Ok(());
    }

    println!("{}", context.text);
    println!();
    print_sources(&context);
    Ok(())
}

/// List ingested documents
#[inline]
pub async fn list_documents(config: Config) -> Result<()> {
    let corpus = Corpus::open(config)
        .await
        .context("Failed to open corpus")?;
    let documents = corpus
        .list_documents()
        .await
        .context("Failed to list documents")?;

    if documents.is_empty() {
        println!("No documents have been ingested yet.");
        println!("Use 'pdf-rag ingest <file.pdf>' to add one.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    println!();

    for document in &documents {
        println!("📄 {}", document.source_name);
        println!("   ID: {}", document.id);
        println!(
            "   Pages: {}, Chunks: {}, Characters: {}",
            document.page_count, document.chunk_count, document.char_count
        );
        if document.is_empty() {
            println!("   ⚠️  No extractable text");
        }
        println!("   Embedding Model: {}", document.embedding_model);
        println!(
            "   Ingested: {}",
            document.ingested_date.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    Ok(())
}

/// Remove every document and vector
#[inline]
pub async fn clear(config: Config, assume_yes: bool) -> Result<()> {
    let corpus = Corpus::open(config)
        .await
        .context("Failed to open corpus")?;
    let count = corpus.document_count().await?;

    if count == 0 {
        println!("The corpus is already empty.");
        return Ok(());
    }

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!(
                "Delete {count} documents and their embeddings? This cannot be undone."
            ))
            .default(false)
            .interact()?
    {
        println!("Nothing deleted.");
        return Ok(());
    }

    corpus.clear_corpus().await.context("Failed to clear corpus")?;
    println!("✓ Removed {} documents", count);
    Ok(())
}

/// Report on Ollama connectivity and corpus contents
#[inline]
pub async fn show_status(config: Config) -> Result<()> {
    println!("📊 PDF RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            let client = client.with_retry_attempts(1);
            match client.ping() {
                Ok(()) => {
                    println!(
                        "   ✅ Ollama: Connected ({}:{})",
                        config.ollama.host, config.ollama.port
                    );
                    if config.embedding.provider == EmbeddingProvider::Ollama {
                        report_model(&client, &config.ollama.model, "Embedding Model");
                    }
                    report_model(&client, &config.ollama.generation_model, "Generation Model");
                }
                Err(e) => println!("   ❌ Ollama: Unreachable - {:#}", e),
            }
        }
        Err(e) => println!("   ❌ Ollama: Invalid configuration - {:#}", e),
    }

    println!();
    println!("📚 Corpus Status:");
    match Corpus::open(config).await {
        Ok(corpus) => match corpus.stats().await {
            Ok(stats) => {
                println!("   Documents: {}", stats.documents);
                println!("   Chunks: {}", stats.chunks);
                match stats.dimension {
                    Some(dimension) => println!("   Vector Dimension: {}", dimension),
                    None => println!("   Vector Dimension: (empty store)"),
                }
                println!("   Embedder: {}", stats.embedding_model);
            }
            Err(e) => println!("   ⚠️  Statistics unavailable - {}", e),
        },
        Err(e) => println!("   ❌ Failed to open corpus - {}", e),
    }

    Ok(())
}

fn report_model(client: &OllamaClient, model: &str, label: &str) {
    match client.require_model(model) {
        Ok(()) => println!("   ✅ {}: {}", label, model),
        Err(e) => println!("   ⚠️  {}: {} - {:#}", label, model, e),
    }
}

fn print_answer(answer: &Answer, show_context: bool) {
    println!("{}", answer.text);

    if show_context && answer.context_used {
        println!();
        println!("{}", style("Context:").bold().yellow());
        println!("{}", answer.context.text);
    }

    if answer.context_used {
        println!();
        print_sources(&answer.context);
    }
}

fn print_sources(context: &AssembledContext) {
    if context.sources.is_empty() {
        println!("No sources were retrieved.");
        return;
    }

    println!("{}", style("Sources:").bold().yellow());
    for (rank, source) in context.sources.iter().enumerate() {
        println!("  {}. {} (score {:.3})", rank + 1, source.label(), source.score);
    }
}

/// Expand directories into the supported files they contain, sorted by path
fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|entry| entry.is_file() && is_supported(entry))
                .collect();
            found.sort();
            info!("Found {} files in {}", found.len(), path.display());
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    Ok(files)
}
