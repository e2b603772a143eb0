//! Embedding provider abstraction and the cache-aware embedder.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: no credential or provider configured; never called.
//! - **[`OpenAIProvider`]**: calls an OpenAI-compatible `POST /embeddings` endpoint.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! [`Embedder`] wraps a provider with the embedding cache and a hard
//! timeout. It is the only way the rest of the crate obtains vectors.
//!
//! # Degradation
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Provider disabled | zero vector, no network I/O, warning logged once |
//! | Cache hit | cached vector, no remote call |
//! | Remote error or timeout | zero vector, cached, warning logged |
//! | Wrong dimensionality | `Err` (not cached) |
//!
//! Remote calls are never retried within one request.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use historia_core::cache::{CacheStats, TtlCache};
use historia_core::embedding::{text_hash, zero_vector};

use crate::config::{CacheTierConfig, EmbeddingConfig};

/// Trait for embedding providers.
///
/// Implementations perform exactly one remote call per [`embed`](EmbeddingProvider::embed)
/// and report failures as `Err`; caching, timeouts, and degradation are
/// handled by [`Embedder`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// `false` if the provider has no backend to call.
    fn is_enabled(&self) -> bool {
        true
    }
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ Disabled Provider ============

/// Stand-in used when no provider or credential is configured.
pub struct DisabledProvider {
    dims: usize,
}

impl DisabledProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn is_enabled(&self) -> bool {
        false
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Embedding provider for OpenAI-compatible APIs.
///
/// Sends `{model, input, dimensions}` to `POST {url}/embeddings` with a
/// bearer token read from the environment variable named by
/// `embedding.api_key_env`.
pub struct OpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if the API key variable is unset or empty, or the
    /// HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("{} environment variable not set", config.api_key_env)
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base.trim_end_matches('/')),
            api_key: api_key.trim().to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "dimensions": self.dims,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        first_embedding(parse_openai_response(&json)?)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map_or(position, |i| i as usize);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        indexed.push((index, json_floats(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const OLLAMA_DEFAULT_MODEL: &str = "nomic-embed-text";

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST {url}/api/embed` (default `http://localhost:11434`).
/// Requires an embedding model pulled locally (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string()),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        first_embedding(parse_ollama_response(&json)?)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding.as_array().ok_or_else(|| {
                anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
            })?;
            json_floats(values)
        })
        .collect()
}

fn json_floats(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow::anyhow!("Invalid embedding value: {}", v))
        })
        .collect()
}

fn first_embedding(embeddings: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    embeddings
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`], or [`DisabledProvider`] when the key is unset |
/// | `"ollama"` | [`OllamaProvider`] |
///
/// A missing credential is not an error: search keeps working with
/// zero vectors and returns no matches.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider::new(config.dims))),
        "openai" => match OpenAIProvider::new(config) {
            Ok(provider) => Ok(Arc::new(provider)),
            Err(e) => {
                tracing::warn!(error = %e, "OpenAI provider unavailable; semantic search disabled");
                Ok(Arc::new(DisabledProvider::new(config.dims)))
            }
        },
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Embedder ============

/// Cache-aware, timeout-bounded front for an [`EmbeddingProvider`].
///
/// Vectors are cached under [`text_hash`] of the exact input text.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: TtlCache<Vec<f32>>,
    timeout: Duration,
    warned_disabled: AtomicBool,
}

impl Embedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: TtlCache<Vec<f32>>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            timeout,
            warned_disabled: AtomicBool::new(false),
        }
    }

    pub fn from_config(
        provider: Arc<dyn EmbeddingProvider>,
        embedding: &EmbeddingConfig,
        cache: &CacheTierConfig,
    ) -> Self {
        Self::new(
            provider,
            TtlCache::new(cache.capacity, cache.ttl()),
            embedding.timeout(),
        )
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_enabled()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Embed `text`, returning a vector of exactly [`dims`](Self::dims) floats.
    ///
    /// Transient provider failures yield a cached zero vector. The only
    /// error is a provider answering with the wrong dimensionality.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let dims = self.dims();

        if !self.provider.is_enabled() {
            if !self.warned_disabled.swap(true, Ordering::Relaxed) {
                tracing::warn!("embedding provider not configured; using zero vectors");
            }
            return Ok(zero_vector(dims));
        }

        let key = text_hash(text);
        if let Some(vector) = self.cache.get(&key) {
            tracing::debug!(key = %key, "embedding cache hit");
            return Ok(vector);
        }

        let vector = match tokio::time::timeout(self.timeout, self.provider.embed(text)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "embedding failed; degrading to zero vector");
                zero_vector(dims)
            }
            Err(_) => {
                tracing::warn!(
                    key = %key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "embedding timed out; degrading to zero vector"
                );
                zero_vector(dims)
            }
        };

        if vector.len() != dims {
            bail!(
                "Embedding provider '{}' returned {} dimensions, expected {}",
                self.provider.model_name(),
                vector.len(),
                dims
            );
        }

        self.cache.set(key, vector.clone());
        Ok(vector)
    }
}
