//! The retrieval engine consumed by request handlers.
//!
//! [`RetrievalEngine`] owns the realized corpus and the search and
//! context caches, and shares the [`Embedder`] (with its embedding
//! cache) with the [`CorpusBuilder`]. The hosting process constructs one
//! engine and hands an `Arc` of it to whatever serves requests.
//!
//! # Corpus lifecycle
//!
//! - The first query (or an explicit [`ensure_initialized`](RetrievalEngine::ensure_initialized))
//!   builds the corpus. Concurrent callers wait for that one build
//!   instead of starting their own.
//! - A finished build is published as a single `Arc` swap; readers see
//!   either no corpus or a complete one.
//! - A failed build leaves the engine un-initialized; the next call retries.
//! - [`refresh`](RetrievalEngine::refresh) discards the corpus and the
//!   result caches, then rebuilds.
//! - Every published corpus gets a new generation number, and search and
//!   context cache keys carry it. A query still running against an older
//!   corpus can only write under that corpus's generation, which no later
//!   lookup asks for.

use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use historia_core::cache::{CacheStats, TtlCache};
use historia_core::context;
use historia_core::models::{
    ChapterContext, ContextOptions, ContextResult, DocumentClass, SearchOptions, SearchResult,
};
use historia_core::search;
use historia_core::source::DocumentSource;
use historia_core::text::chapter_query;

use crate::config::{CacheConfig, Config};
use crate::corpus::{BuildStats, Corpus, CorpusBuilder};
use crate::embedding::{create_provider, Embedder, EmbeddingProvider};

/// Per-cache statistics for the three cache tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineCacheStats {
    pub embeddings: CacheStats,
    pub search: CacheStats,
    pub context: CacheStats,
}

/// Snapshot of the engine for health and admin endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub initialized: bool,
    pub embeddings_enabled: bool,
    pub model: String,
    pub dims: usize,
    pub document_count: usize,
    pub event_count: usize,
    pub chapter_count: usize,
    pub built_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_build: Option<BuildStats>,
}

/// A published corpus and the generation it was published under.
#[derive(Clone)]
struct Snapshot {
    generation: u64,
    corpus: Arc<Corpus>,
}

/// Semantic retrieval over events and chapters.
pub struct RetrievalEngine {
    source: Arc<dyn DocumentSource>,
    embedder: Arc<Embedder>,
    builder: CorpusBuilder,
    corpus: RwLock<Option<Snapshot>>,
    generation: AtomicU64,
    last_build: RwLock<Option<BuildStats>>,
    build_lock: tokio::sync::Mutex<()>,
    search_cache: TtlCache<Vec<SearchResult>>,
    context_cache: TtlCache<ContextResult>,
}

impl RetrievalEngine {
    /// Assemble an engine from an existing embedder.
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: Arc<Embedder>,
        throttle: std::time::Duration,
        cache: &CacheConfig,
    ) -> Self {
        let builder = CorpusBuilder::new(source.clone(), embedder.clone(), throttle);
        Self {
            source,
            embedder,
            builder,
            corpus: RwLock::new(None),
            generation: AtomicU64::new(0),
            last_build: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
            search_cache: TtlCache::new(cache.search.capacity, cache.search.ttl()),
            context_cache: TtlCache::new(cache.context.capacity, cache.context.ttl()),
        }
    }

    /// Build an engine around `provider` using the cache, timeout, and
    /// throttle settings in `config`.
    pub fn with_provider(
        source: Arc<dyn DocumentSource>,
        provider: Arc<dyn EmbeddingProvider>,
        config: &Config,
    ) -> Self {
        let embedder = Arc::new(Embedder::from_config(
            provider,
            &config.embedding,
            &config.cache.embeddings,
        ));
        Self::new(source, embedder, config.corpus.throttle(), &config.cache)
    }

    /// Build an engine with the provider selected by `config.embedding`.
    ///
    /// # Errors
    ///
    /// Fails if `config` does not pass [`validate`](crate::config::validate) or the
    /// provider cannot be created.
    pub fn from_config(source: Arc<dyn DocumentSource>, config: &Config) -> Result<Self> {
        crate::config::validate(config)?;
        let provider = create_provider(&config.embedding)?;
        Ok(Self::with_provider(source, provider, config))
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    fn snapshot(&self) -> Option<Snapshot> {
        self.corpus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current corpus, if one has been built.
    pub fn corpus(&self) -> Option<Arc<Corpus>> {
        self.snapshot().map(|s| s.corpus)
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Generation of the current corpus; `0` before the first build.
    pub fn generation(&self) -> u64 {
        self.snapshot().map_or(0, |s| s.generation)
    }

    fn unpublish(&self) {
        *self.corpus.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn build_and_publish(&self) -> Result<Snapshot> {
        let (corpus, stats) = self.builder.build().await?;
        let snapshot = Snapshot {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            corpus: Arc::new(corpus),
        };
        *self.corpus.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        *self.last_build.write().unwrap_or_else(PoisonError::into_inner) = Some(stats);
        tracing::debug!(generation = snapshot.generation, "corpus published");
        Ok(snapshot)
    }

    async fn current(&self) -> Result<Snapshot> {
        if let Some(snapshot) = self.snapshot() {
            return Ok(snapshot);
        }

        let _guard = self.build_lock.lock().await;
        if let Some(snapshot) = self.snapshot() {
            return Ok(snapshot);
        }

        self.build_and_publish().await
    }

    /// Build the corpus unless it already exists. Idempotent; concurrent
    /// callers share one build.
    pub async fn ensure_initialized(&self) -> Result<Arc<Corpus>> {
        Ok(self.current().await?.corpus)
    }

    /// Discard the corpus and cached results, then rebuild.
    pub async fn refresh(&self) -> Result<Arc<Corpus>> {
        let _guard = self.build_lock.lock().await;
        self.unpublish();
        self.search_cache.clear();
        self.context_cache.clear();
        tracing::info!("corpus refresh requested");
        Ok(self.build_and_publish().await?.corpus)
    }

    /// Rank the corpus against `query`.
    ///
    /// Builds the corpus on first use. A blank query returns no results
    /// without embedding anything.
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let snapshot = self.current().await?;

        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let key = generation_key(snapshot.generation, &search::cache_key(query, opts));
        if let Some(results) = self.search_cache.get(&key) {
            tracing::debug!(query, "search cache hit");
            return Ok(results);
        }

        let query_vec = self.embedder.embed(query).await?;
        let results = search::rank(&snapshot.corpus.documents, &query_vec, opts);

        tracing::debug!(query, results = results.len(), "search computed");
        self.search_cache.set(key, results.clone());
        Ok(results)
    }

    /// Gather direct and related events for a claim, with a confidence
    /// score and source titles.
    pub async fn find_historical_context(
        &self,
        claim: &str,
        opts: &ContextOptions,
    ) -> Result<ContextResult> {
        let snapshot = self.current().await?;
        let key = generation_key(snapshot.generation, &context::cache_key(claim, opts));
        if let Some(result) = self.context_cache.get(&key) {
            tracing::debug!(claim, "context cache hit");
            return Ok(result);
        }

        let direct = self.search(claim, &context::direct_options()).await?;
        let related = if opts.include_similar() {
            self.search(claim, &context::related_options()).await?
        } else {
            Vec::new()
        };

        let result = context::aggregate(direct, related, opts);
        self.context_cache.set(key, result.clone());
        Ok(result)
    }

    /// Events and other chapters related to one chapter.
    ///
    /// An unknown chapter, or one the store cannot return, yields an
    /// empty [`ChapterContext`].
    pub async fn get_chapter_context(&self, chapter_id: &str) -> Result<ChapterContext> {
        let chapter = match self.source.get_chapter_by_id(chapter_id).await {
            Ok(Some(chapter)) => chapter,
            Ok(None) => return Ok(ChapterContext::default()),
            Err(e) => {
                tracing::warn!(chapter_id, error = %e, "chapter lookup failed; no context");
                return Ok(ChapterContext::default());
            }
        };

        let query = chapter_query(&chapter);
        let related_events = self
            .search(&query, &context::chapter_event_options())
            .await?;
        let related_chapters = self
            .search(&query, &context::chapter_chapter_options())
            .await?;

        Ok(context::chapter_context(
            chapter,
            related_events,
            related_chapters,
        ))
    }

    /// Empty the embedding, search, and context caches.
    pub fn clear_all_caches(&self) {
        self.embedder.clear_cache();
        self.search_cache.clear();
        self.context_cache.clear();
    }

    pub fn cache_stats(&self) -> EngineCacheStats {
        EngineCacheStats {
            embeddings: self.embedder.cache_stats(),
            search: self.search_cache.stats(),
            context: self.context_cache.stats(),
        }
    }

    pub fn status(&self) -> EngineStatus {
        let corpus = self.corpus();
        EngineStatus {
            initialized: corpus.is_some(),
            embeddings_enabled: self.embedder.is_enabled(),
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            document_count: corpus.as_ref().map_or(0, |c| c.len()),
            event_count: corpus.as_ref().map_or(0, |c| c.count(DocumentClass::Event)),
            chapter_count: corpus.as_ref().map_or(0, |c| c.count(DocumentClass::Chapter)),
            built_at: corpus.as_ref().map(|c| c.built_at),
            last_build: *self
                .last_build
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

fn generation_key(generation: u64, key: &str) -> String {
    format!("{generation}:{key}")
}
