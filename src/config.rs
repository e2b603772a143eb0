use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL of the provider API. Falls back to the provider's public default.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            timeout_secs: default_timeout_secs(),
            url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Pause between consecutive embedding calls during a build.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
        }
    }
}

fn default_throttle_ms() -> u64 {
    100
}

impl CorpusConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_embedding_cache")]
    pub embeddings: CacheTierConfig,
    #[serde(default = "default_search_cache")]
    pub search: CacheTierConfig,
    #[serde(default = "default_context_cache")]
    pub context: CacheTierConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embeddings: default_embedding_cache(),
            search: default_search_cache(),
            context: default_context_cache(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CacheTierConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl CacheTierConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_embedding_cache() -> CacheTierConfig {
    CacheTierConfig {
        capacity: 1000,
        ttl_secs: 24 * 60 * 60,
    }
}
fn default_search_cache() -> CacheTierConfig {
    CacheTierConfig {
        capacity: 500,
        ttl_secs: 60 * 60,
    }
}
fn default_context_cache() -> CacheTierConfig {
    CacheTierConfig {
        capacity: 200,
        ttl_secs: 30 * 60,
    }
}

/// Check the invariants a parsed [`Config`] must hold.
pub fn validate(config: &Config) -> Result<()> {
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    for (name, tier) in [
        ("embeddings", &config.cache.embeddings),
        ("search", &config.cache.search),
        ("context", &config.cache.context),
    ] {
        if tier.capacity == 0 {
            anyhow::bail!("cache.{}.capacity must be > 0", name);
        }
        if tier.ttl_secs == 0 {
            anyhow::bail!("cache.{}.ttl_secs must be > 0", name);
        }
    }

    Ok(())
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
