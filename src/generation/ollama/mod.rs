#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{GenerationError, LanguageModel};
use crate::RagError;
use crate::config::OllamaConfig;
use crate::embeddings::OllamaClient;

/// Generation is slow, so a failed request is retried once at most
const GENERATION_RETRY_ATTEMPTS: u32 = 2;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// [`LanguageModel`] backed by Ollama's non-streaming `/api/generate` endpoint
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Arc<OllamaClient>,
}

impl OllamaGenerator {
    /// Uses `generation_model` from the config, with `request_timeout` per attempt
    #[inline]
    pub fn new(config: &OllamaConfig, request_timeout: Duration) -> crate::Result<Self> {
        let client = OllamaClient::new(config)
            .map_err(|e| RagError::Config(format!("{e:#}")))?
            .with_model(config.generation_model.clone())
            .with_timeout(request_timeout)
            .with_retry_attempts(GENERATION_RETRY_ATTEMPTS);
        Ok(Self::from_client(client))
    }

    #[inline]
    pub fn from_client(client: OllamaClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    #[inline]
    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

#[async_trait]
impl LanguageModel for OllamaGenerator {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let client = Arc::clone(&self.client);
        let prompt = prompt.to_string();

        let body = tokio::task::spawn_blocking(move || {
            let request = GenerateRequest {
                model: client.model(),
                prompt: &prompt,
                stream: false,
                options: GenerateOptions {
                    temperature,
                    num_predict: max_tokens,
                },
            };
            client.post_json("/api/generate", &request)
        })
        .await
        .map_err(|e| GenerationError::Unavailable(format!("Generation task failed: {e}")))?
        .map_err(|e| {
            warn!("Ollama generation request failed: {:#}", e);
            GenerationError::Unavailable(format!("{e:#}"))
        })?;

        let response: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        if !response.done {
            debug!("Ollama reported an unfinished generation");
        }

        if response.response.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(
                "model returned an empty answer".to_string(),
            ));
        }

        Ok(response.response)
    }

    fn model_id(&self) -> &str {
        self.client.model()
    }
}
