//! # Historia
//!
//! Semantic retrieval over a corpus of historical events and book
//! chapters, with a three-tier cache and a historical-context
//! aggregator for fact-checking claims.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Document     │──▶│ Corpus       │──▶│ In-memory    │
//! │ source       │   │ builder      │   │ corpus (Arc) │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           │                  │
//!                    ┌──────▼───────┐   ┌──────▼───────┐
//!                    │ Embedder     │◀──│ Retrieval    │
//!                    │ + emb. cache │   │ engine       │
//!                    └──────────────┘   │ + result &   │
//!                                       │ context cache│
//!                                       └──────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. At first use the **corpus builder** ([`corpus`]) fetches every event
//!    and chapter from the [`DocumentSource`](historia_core::source::DocumentSource),
//!    flattens each record to text, and embeds it through the [`embedding::Embedder`].
//! 2. The built corpus is published to the **engine** ([`engine`]) in one swap.
//! 3. A query is embedded, every corpus entry is scored by cosine
//!    similarity, and the filtered, sorted, truncated list is cached.
//! 4. Historical context and chapter context are assembled from two
//!    searches each.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`embedding`] | Provider trait, OpenAI/Ollama providers, cache-aware embedder |
//! | [`corpus`] | Corpus builder with rate-limit throttle |
//! | [`engine`] | `RetrievalEngine`: search, context, refresh, cache admin |
//! | [`source_json`] | Document source backed by a JSON file |
//!
//! Models, ranking, aggregation, and caches live in [`historia_core`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use historia::config::Config;
//! use historia::engine::RetrievalEngine;
//! use historia::source_json::JsonFileSource;
//! use historia_core::models::SearchOptions;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let source = Arc::new(JsonFileSource::open("data/documents.json".as_ref())?);
//! let engine = RetrievalEngine::from_config(source, &Config::default())?;
//! let results = engine.search("fall of Rome", &SearchOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod source_json;

pub use engine::RetrievalEngine;
pub use historia_core::models;
pub use historia_core::source;
