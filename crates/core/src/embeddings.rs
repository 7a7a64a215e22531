use crate::error::EmbedError;
use crate::models::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Dimensionality of the default remote embedding model; the zero-vector
/// fallback must match it so queries never see ragged entries.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

#[derive(Debug, Clone)]
pub struct EmbeddingServiceConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub dimensions: usize,
    pub retry: RetryPolicy,
}

impl EmbeddingServiceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model: None,
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP adapter for the external embedding service. Transient failures
/// (connect/timeout, 429, 5xx) are retried up to the policy's attempt count;
/// 4xx responses are permanent.
pub struct RemoteEmbedder {
    config: EmbeddingServiceConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(config: EmbeddingServiceConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut request = self.client.post(&self.config.endpoint).json(&EmbedRequest {
            text,
            model: self.config.model.as_deref(),
        });
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(classify_send_error)?;
        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(EmbedError::Transient(status.to_string()));
        }
        if !status.is_success() {
            return Err(EmbedError::Permanent(status.to_string()));
        }

        let payload: EmbedResponse = response
            .json()
            .await
            .map_err(|error| EmbedError::MalformedResponse(error.to_string()))?;

        if payload.embedding.len() != self.config.dimensions {
            return Err(EmbedError::MalformedResponse(format!(
                "expected {} dimensions, got {}",
                self.config.dimensions,
                payload.embedding.len()
            )));
        }

        Ok(payload.embedding)
    }
}

fn classify_send_error(error: reqwest::Error) -> EmbedError {
    if error.is_timeout() || error.is_connect() {
        EmbedError::Transient(error.to_string())
    } else {
        EmbedError::Permanent(error.to_string())
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut last_failure = None;

        for attempt in 1..=self.config.retry.max_attempts {
            match self.request_embedding(text).await {
                Ok(vector) => return Ok(vector),
                Err(EmbedError::Transient(details)) => {
                    tracing::debug!(attempt, %details, "transient embedding failure");
                    last_failure = Some(details);
                    if attempt < self.config.retry.max_attempts {
                        tokio::time::sleep(self.config.retry.base_delay * attempt as u32).await;
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Err(EmbedError::Transient(
            last_failure.unwrap_or_else(|| "retries exhausted".to_string()),
        ))
    }
}

/// Embeds `text`, substituting the canonical zero vector on any final
/// failure so ingestion and queries never abort on the embedding service.
pub async fn embed_or_zero<E: Embedder + ?Sized>(embedder: &E, text: &str) -> Vec<f32> {
    match embedder.embed(text).await {
        Ok(vector) => vector,
        Err(error) => {
            tracing::warn!(%error, "embedding failed, substituting zero vector");
            vec![0.0; embedder.dimensions()]
        }
    }
}

/// Deterministic character-trigram hashing embedder. No network, stable
/// across runs; used for offline retrieval and in tests.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}
