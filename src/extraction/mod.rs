
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{RagError, Result};

/// Inserted between consecutive pages when a document is viewed as one text
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Form feed, emitted by `pdftotext` after every page
const PAGE_BREAK: char = '\u{c}';

/// File extensions [`FileExtractor`] can read
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "text"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub text: String,
}

/// An ingested document; immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_name: String,
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document with a fresh id, numbering pages from 1
    #[inline]
    pub fn from_pages(source_name: impl Into<String>, pages: Vec<String>) -> Self {
        let pages = pages
            .into_iter()
            .zip(1..)
            .map(|(text, number)| Page { number, text })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            source_name: source_name.into(),
            pages,
        }
    }

    /// Build a document from already numbered pages
    #[inline]
    pub fn from_numbered_pages(source_name: impl Into<String>, pages: Vec<(u32, String)>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_name: source_name.into(),
            pages: pages
                .into_iter()
                .map(|(number, text)| Page { number, text })
                .collect(),
        }
    }

    /// The full document text, pages joined by [`PAGE_SEPARATOR`]
    #[inline]
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    #[inline]
    pub fn char_count(&self) -> usize {
        let separators = self.pages.len().saturating_sub(1) * PAGE_SEPARATOR.chars().count();
        self.pages
            .iter()
            .map(|page| page.text.chars().count())
            .sum::<usize>()
            + separators
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|page| page.text.trim().is_empty())
    }
}

/// Turns a file on disk into `(page_number, page_text)` pairs
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<Vec<(u32, String)>>;

    /// Extract a file and wrap it as a [`Document`] named after the file
    async fn extract_document(&self, path: &Path) -> Result<Document> {
        let pages = self.extract_text(path).await?;
        Ok(Document::from_numbered_pages(source_name(path), pages))
    }
}

/// Extracts PDFs with poppler's `pdftotext` and reads text files directly
#[derive(Debug, Clone)]
pub struct FileExtractor {
    pdftotext: String,
}

impl Default for FileExtractor {
    #[inline]
    fn default() -> Self {
        Self {
            pdftotext: "pdftotext".to_string(),
        }
    }
}

impl FileExtractor {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `pdftotext` binary
    #[inline]
    pub fn with_pdftotext(mut self, program: impl Into<String>) -> Self {
        self.pdftotext = program.into();
        self
    }

    async fn extract_pdf(&self, path: &Path) -> Result<Vec<(u32, String)>> {
        info!("Extracting PDF text from {}", path.display());

        let output = Command::new(&self.pdftotext)
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .await
            .map_err(|e| {
                warn!("Failed to run {}: {}", self.pdftotext, e);
                extraction_error(
                    path,
                    format!("{} could not be run: {e} (is poppler installed?)", self.pdftotext),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("pdftotext failed for {}: {}", path.display(), stderr.trim());
            return Err(extraction_error(
                path,
                format!("pdftotext failed: {}", stderr.trim()),
            ));
        }

        let pages = split_pages(&String::from_utf8_lossy(&output.stdout));
        debug!("Extracted {} pages from {}", pages.len(), path.display());

        if pages.iter().all(|(_, text)| text.trim().is_empty()) {
            warn!("pdftotext extracted no text from {}", path.display());
        }

        Ok(pages)
    }
}

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract_text(&self, path: &Path) -> Result<Vec<(u32, String)>> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => self.extract_pdf(path).await,
            Some("txt" | "md" | "text") => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| extraction_error(path, e.to_string()))?;
                Ok(split_pages(&text))
            }
            _ => Err(extraction_error(
                path,
                "unsupported file type (expected .pdf or .txt)".to_string(),
            )),
        }
    }
}

/// Split extractor output on form feeds into numbered pages
///
/// The trailing form feed after the last page does not start a new page.
#[inline]
pub fn split_pages(raw: &str) -> Vec<(u32, String)> {
    let raw = raw.strip_suffix(PAGE_BREAK).unwrap_or(raw);
    if raw.is_empty() {
        return Vec::new();
    }

    raw.split(PAGE_BREAK)
        .zip(1..)
        .map(|(text, number)| (number, clean_text(text)))
        .collect()
}

/// Normalise extracted page text
///
/// NUL characters are dropped, runs of spaces and tabs (layout padding)
/// collapse to one space, and consecutive blank lines collapse to a single
/// paragraph break.
#[inline]
pub fn clean_text(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut blank_run = false;

    for line in text.lines() {
        let line = line.replace('\0', "");
        let mut words = line.split_whitespace().peekable();

        if words.peek().is_none() {
            blank_run = !cleaned.is_empty();
            continue;
        }

        if !cleaned.is_empty() {
            cleaned.push_str(if blank_run { "\n\n" } else { "\n" });
        }
        blank_run = false;

        for (i, word) in words.enumerate() {
            if i > 0 {
                cleaned.push(' ');
            }
            cleaned.push_str(word);
        }
    }

    cleaned
}

/// Whether [`FileExtractor`] handles this file, judged by its extension
#[inline]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// The display name of a file: its file name, or the whole path as a fallback
#[inline]
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn extraction_error(path: &Path, message: String) -> RagError {
    RagError::Extraction {
        source_name: source_name(path),
        message,
    }
}
