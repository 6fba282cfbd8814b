//! Answer generation from a question and its retrieved context


pub mod ollama;

pub use ollama::OllamaGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{EmptyContextPolicy, GenerationConfig};
use crate::retrieval::{AssembledContext, context::SourceRef};

/// Returned instead of calling the model when nothing relevant was retrieved
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the ingested documents to answer your question.";

const PROMPT_INSTRUCTIONS: &str = "Use the following context to answer the question.\n\
If you don't know the answer from the context, say \"I don't have enough information\".";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Language model unavailable: {0}")]
    Unavailable(String),

    #[error("Language model timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response from language model: {0}")]
    InvalidResponse(String),
}

/// A remote text generation capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;

    fn model_id(&self) -> &str;
}

/// A generated answer and the context it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub context: AssembledContext,
    /// False when the answer was produced without any retrieved context
    pub context_used: bool,
}

impl Answer {
    #[inline]
    pub fn sources(&self) -> &[SourceRef] {
        &self.context.sources
    }
}

/// Prompt sent to the model for a question and its context
///
/// With no context the question is sent on its own.
#[inline]
pub fn build_prompt(question: &str, context: &AssembledContext) -> String {
    if context.is_empty() {
        return question.to_string();
    }

    format!(
        "{PROMPT_INSTRUCTIONS}\n\nContext: {}\n\nQuestion: {}\n\nAnswer:",
        context.text, question
    )
}

/// Turns retrieved context into an answer through a [`LanguageModel`]
#[derive(Clone)]
pub struct Answerer {
    model: Arc<dyn LanguageModel>,
    config: GenerationConfig,
}

impl Answerer {
    #[inline]
    pub fn new(model: Arc<dyn LanguageModel>, config: GenerationConfig) -> Self {
        Self { model, config }
    }

    #[inline]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    #[inline]
    pub async fn answer(
        &self,
        question: &str,
        context: &AssembledContext,
    ) -> Result<Answer, GenerationError> {
        if context.is_empty() && self.config.empty_context == EmptyContextPolicy::Refuse {
            info!("No relevant context retrieved, not calling the language model");
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                context: context.clone(),
                context_used: false,
            });
        }

        let prompt = build_prompt(question, context);
        let limit = Duration::from_secs(self.config.timeout_secs);
        debug!(
            "Generating answer with {} ({} prompt chars, {} sources)",
            self.model.model_id(),
            prompt.chars().count(),
            context.sources.len()
        );

        let text = tokio::time::timeout(
            limit,
            self.model
                .generate(&prompt, self.config.temperature, self.config.max_tokens),
        )
        .await
        .map_err(|_| {
            warn!("Answer generation timed out after {:?}", limit);
            GenerationError::Timeout(limit)
        })??;

        Ok(Answer {
            text: text.trim().to_string(),
            context: context.clone(),
            context_used: !context.is_empty(),
        })
    }
}
