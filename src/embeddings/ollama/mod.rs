
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Embedder, validate_embeddings};
use crate::config::OllamaConfig;
use crate::{RagError, Stage};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Blocking HTTP client for a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
    request_timeout: Duration,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;
        let request_timeout = Duration::from_secs(config.timeout_secs);

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            agent: build_agent(request_timeout),
            request_timeout,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.request_timeout = timeout;
        self
    }

    /// Use a different model, e.g. the generation model, on the same server
    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Longest a single call can take, counting every retry and backoff
    #[inline]
    pub fn call_budget(&self) -> Duration {
        let backoff: Duration = (1..self.retry_attempts).map(backoff_delay).sum();
        self.request_timeout * self.retry_attempts + backoff
    }

    /// Test connection to Ollama server and verify model availability
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping().context("Server ping failed")?;
        self.validate_model().context("Model validation failed")?;

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        debug!("Pinging Ollama server at {}", self.base_url);

        self.get_text("/api/tags")
            .context("Failed to ping Ollama server")?;

        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that the configured embedding model is available
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        self.require_model(&self.model)
    }

    /// Fail unless `model` is among the server's installed models
    #[inline]
    pub fn require_model(&self, model: &str) -> Result<()> {
        debug!("Validating model: {}", model);

        let models = self.list_models().context("Failed to list models")?;

        if models.iter().any(|m| m.name == model) {
            debug!("Model {} is available", model);
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                model, available_models
            );
            Err(anyhow::anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                model,
                available_models
            ))
        }
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        debug!("Fetching available models from {}", self.base_url);

        let response_text = self
            .get_text("/api/tags")
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Embed texts, sending at most `batch_size` inputs per request
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for chunk in texts.chunks(self.batch_size as usize) {
            let batch_results = self
                .embed_single_batch(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;

            results.extend(batch_results);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response_text = self
            .post_json("/api/embed", &request)
            .context("Failed to generate batch embeddings")?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse batch embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }

    /// POST a JSON body to an API endpoint and return the raw response text
    #[inline]
    pub fn post_json<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<String> {
        let url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("Failed to build URL for {endpoint}"))?;

        let request_json = serde_json::to_string(body).context("Failed to serialize request")?;

        let body = self.send_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;
        Ok(body)
    }

    fn get_text(&self, endpoint: &str) -> Result<String> {
        let url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("Failed to build URL for {endpoint}"))?;

        let body = self.send_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;
        Ok(body)
    }

    /// Run `send` until it succeeds, fails permanently or runs out of attempts
    ///
    /// Attempt `n` is followed by a `2^(n-1)` second pause.
    fn send_with_retry<F>(&self, mut send: F) -> Result<String, RequestError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            let failure = match send() {
                Ok(body) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(body);
                }
                Err(error) => RequestError::from(error),
            };

            if !failure.is_transient() {
                warn!("{}, not retrying", failure);
                return Err(failure);
            }
            if attempt >= self.retry_attempts {
                error!(
                    "Giving up on {} after {} attempts: {}",
                    self.base_url, attempt, failure
                );
                return Err(failure);
            }

            let delay = backoff_delay(attempt);
            warn!(
                "{} (attempt {}/{}), retrying in {:?}",
                failure, attempt, self.retry_attempts, delay
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}

/// Why a request to Ollama failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Ollama answered with HTTP {0}")]
    Status(u16),
    #[error("Could not reach Ollama: {0}")]
    Transport(String),
    #[error("Request to Ollama failed: {0}")]
    Other(String),
}

impl RequestError {
    /// Server errors and transport failures may clear up on their own
    #[inline]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status(status) => *status >= 500,
            Self::Transport(_) => true,
            Self::Other(_) => false,
        }
    }
}

impl From<ureq::Error> for RequestError {
    #[inline]
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::StatusCode(status) => Self::Status(status),
            ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_) => Self::Transport(error.to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(EXPONENTIAL_BACKOFF_BASE.pow(attempt.saturating_sub(1)))
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// [`Embedder`] backed by Ollama's `/api/embed` endpoint
///
/// Requests run on the blocking thread pool. A call that outlives its
/// budget is reported as a timeout; the request itself is left to finish.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    dimension: usize,
    timeout: Duration,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(config: &OllamaConfig, dimension: usize) -> crate::Result<Self> {
        let client = OllamaClient::new(config).map_err(|e| RagError::Config(format!("{e:#}")))?;
        Ok(Self::from_client(client, dimension))
    }

    #[inline]
    pub fn from_client(client: OllamaClient, dimension: usize) -> Self {
        let timeout = client.call_budget();
        Self {
            client: Arc::new(client),
            dimension,
            timeout,
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = Arc::clone(&self.client);
        let inputs = texts.to_vec();
        let task = tokio::task::spawn_blocking(move || client.embed_batch(&inputs));

        let vectors = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                warn!("Embedding request timed out after {:?}", self.timeout);
                return Err(RagError::Timeout {
                    stage: Stage::Embedding,
                    after: self.timeout,
                });
            }
            Ok(Err(join_error)) => {
                return Err(RagError::Embedding(format!(
                    "Embedding task failed: {join_error}"
                )));
            }
            Ok(Ok(result)) => result.map_err(|e| RagError::Embedding(format!("{e:#}")))?,
        };

        validate_embeddings(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        self.client.model()
    }
}
