//! End-to-end tests for the retrieval engine.
//!
//! A keyword provider maps marker strings in the flattened document text
//! to fixed vectors, so every similarity below is known in advance:
//!
//! | marker            | vector             | cos to `query:rome` |
//! |-------------------|--------------------|---------------------|
//! | `marker:exact`    | `[1, 0, 0]`        | 1.00                |
//! | `marker:near`     | `[0.85, 0.53, 0]`  | 0.85                |
//! | `marker:far`      | `[0.65, 0.76, 0]`  | 0.65                |
//! | anything else     | `[0, 0, 1]`        | 0.00                |

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use historia::config::Config;
use historia::embedding::{Embedder, EmbeddingProvider};
use historia::engine::RetrievalEngine;
use historia_core::cache::TtlCache;
use historia_core::models::{
    Chapter, ContextOptions, DocumentClass, HistoricalEvent, SearchOptions, TimeRange,
};
use historia_core::source::memory::InMemorySource;
use historia_core::source::DocumentSource;

// ============ Fixtures ============

fn unit_at(cos: f32) -> Vec<f32> {
    vec![cos, (1.0 - cos * cos).sqrt(), 0.0]
}

struct KeywordProvider {
    calls: AtomicUsize,
    slow: Duration,
}

impl KeywordProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            slow: Duration::ZERO,
        })
    }

    fn with_slow(slow: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            slow,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn model_name(&self) -> &str {
        "keyword"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("query:slow") {
            tokio::time::sleep(self.slow).await;
        }

        let vector = if text.contains("marker:corrupt") {
            vec![1.0, 0.0]
        } else if text.contains("marker:exact") || text.contains("query:rome") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("marker:near") {
            unit_at(0.85)
        } else if text.contains("marker:far") {
            unit_at(0.65)
        } else if text.contains("marker:fresh") || text.contains("query:fresh") {
            vec![0.0, 1.0, 0.0]
        } else if text.contains("query:loose") {
            vec![0.7, 0.0, (1.0f32 - 0.49).sqrt()]
        } else {
            vec![0.0, 0.0, 1.0]
        };
        Ok(vector)
    }
}

fn event(id: &str, title: &str, marker: &str, year: i32, era: &str) -> HistoricalEvent {
    HistoricalEvent {
        id: id.to_string(),
        title: title.to_string(),
        description: marker.to_string(),
        year,
        era: era.to_string(),
        region: Some("Europe".to_string()),
        tags: Vec::new(),
    }
}

fn chapter(id: &str, title: &str, marker: &str) -> Chapter {
    Chapter {
        id: id.to_string(),
        title: title.to_string(),
        narrative: marker.to_string(),
        commentary: None,
        era: None,
        tags: Vec::new(),
    }
}

fn library() -> InMemorySource {
    InMemorySource::new(
        vec![
            event("e1", "Sack of Rome", "marker:exact", 410, "late antiquity"),
            event("e2", "Fall of the Western Empire", "marker:near", 476, "late antiquity"),
            event("e3", "Plague of Justinian", "marker:far", 541, "early medieval"),
            event("e4", "Battle of Hastings", "marker:none", 1066, "medieval"),
        ],
        vec![
            chapter("c1", "Twilight of Rome", "marker:exact"),
            chapter("c2", "The Last Emperors", "marker:near"),
            chapter("c3", "Norman Conquest", "marker:none"),
        ],
    )
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.corpus.throttle_ms = 0;
    config
}

fn engine_with(source: Arc<dyn DocumentSource>, provider: Arc<KeywordProvider>) -> RetrievalEngine {
    RetrievalEngine::with_provider(source, provider, &test_config())
}

fn ids(results: &[historia_core::models::SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

/// Counts `list_events` calls; optionally fails the first one.
struct CountingSource {
    inner: InMemorySource,
    fetches: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingSource {
    fn new(fail_first: bool) -> Self {
        Self {
            inner: library(),
            fetches: AtomicUsize::new(0),
            fail_next: AtomicBool::new(fail_first),
        }
    }
}

#[async_trait]
impl DocumentSource for CountingSource {
    async fn list_events(&self) -> Result<Vec<HistoricalEvent>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("database unavailable");
        }
        self.inner.list_events().await
    }

    async fn list_chapters(&self) -> Result<Vec<Chapter>> {
        self.inner.list_chapters().await
    }

    async fn get_chapter_by_id(&self, id: &str) -> Result<Option<Chapter>> {
        self.inner.get_chapter_by_id(id).await
    }
}

// ============ Search ============

#[tokio::test]
async fn test_search_default_threshold_and_tie_order() {
    let engine = engine_with(Arc::new(library()), KeywordProvider::new());

    let results = engine
        .search("query:rome", &SearchOptions::default())
        .await
        .unwrap();

    // Equal scores keep corpus order: events before chapters.
    assert_eq!(ids(&results), vec!["e1", "c1", "e2", "c2"]);
    assert!((results[0].similarity - 1.0).abs() < 1e-5);
    assert!((results[2].similarity - 0.85).abs() < 1e-4);
    assert!(results.iter().all(|r| r.similarity >= 0.7));
    assert_eq!(results[1].document_class, DocumentClass::Chapter);
}

#[tokio::test]
async fn test_search_threshold_limit_and_filters() {
    let engine = engine_with(Arc::new(library()), KeywordProvider::new());

    let loose = SearchOptions {
        threshold: Some(0.6),
        ..SearchOptions::default()
    };
    let results = engine.search("query:rome", &loose).await.unwrap();
    assert_eq!(ids(&results), vec!["e1", "c1", "e2", "c2", "e3"]);

    let top_two = SearchOptions {
        limit: Some(2),
        ..SearchOptions::default()
    };
    let results = engine.search("query:rome", &top_two).await.unwrap();
    assert_eq!(ids(&results), vec!["e1", "c1"]);

    let events_only = SearchOptions {
        document_class: Some(DocumentClass::Event),
        ..SearchOptions::default()
    };
    let results = engine.search("query:rome", &events_only).await.unwrap();
    assert_eq!(ids(&results), vec!["e1", "e2"]);

    let by_era = SearchOptions {
        threshold: Some(0.6),
        era: Some("early medieval".to_string()),
        ..SearchOptions::default()
    };
    let results = engine.search("query:rome", &by_era).await.unwrap();
    assert_eq!(ids(&results), vec!["e3"]);
}

#[tokio::test]
async fn test_search_is_deterministic_and_cached() {
    let provider = KeywordProvider::new();
    let engine = engine_with(Arc::new(library()), provider.clone());

    let first = engine
        .search("query:rome", &SearchOptions::default())
        .await
        .unwrap();
    let after_first = provider.calls();
    // 7 documents plus the query.
    assert_eq!(after_first, 8);

    let second = engine
        .search("query:rome", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(provider.calls(), after_first);

    // New options miss the search cache but hit the embedding cache.
    let other = SearchOptions {
        limit: Some(1),
        ..SearchOptions::default()
    };
    engine.search("query:rome", &other).await.unwrap();
    assert_eq!(provider.calls(), after_first);

    engine.clear_all_caches();
    let recomputed = engine
        .search("query:rome", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(first, recomputed);
    assert_eq!(provider.calls(), after_first + 1);
}

#[tokio::test]
async fn test_blank_query_returns_nothing() {
    let provider = KeywordProvider::new();
    let engine = engine_with(Arc::new(library()), provider.clone());

    let results = engine.search("   ", &SearchOptions::default()).await.unwrap();
    assert!(results.is_empty());
    assert!(engine.is_initialized());
    assert_eq!(provider.calls(), 7);
}

#[tokio::test]
async fn test_slow_provider_times_out_to_empty_results() {
    let provider = KeywordProvider::with_slow(Duration::from_millis(500));
    let embedder = Arc::new(Embedder::new(
        provider.clone(),
        TtlCache::new(100, Duration::from_secs(60)),
        Duration::from_millis(50),
    ));
    let engine = RetrievalEngine::new(
        Arc::new(library()),
        embedder,
        Duration::ZERO,
        &test_config().cache,
    );

    let results = engine
        .search("query:slow", &SearchOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());

    // The zero vector was cached; nothing slow happens a second time.
    let calls = provider.calls();
    let top_three = SearchOptions {
        limit: Some(3),
        ..SearchOptions::default()
    };
    let again = engine.search("query:slow", &top_three).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(provider.calls(), calls);
}

#[tokio::test]
async fn test_disabled_provider_builds_but_finds_nothing() {
    let engine = RetrievalEngine::from_config(Arc::new(library()), &test_config()).unwrap();

    let results = engine
        .search("query:rome", &SearchOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());

    let status = engine.status();
    assert!(status.initialized);
    assert!(!status.embeddings_enabled);
    assert_eq!(status.document_count, 7);
    assert_eq!(status.dims, 768);
}

// ============ Corpus lifecycle ============

#[tokio::test]
async fn test_partial_build_skips_failed_document() {
    let source = InMemorySource::new(
        vec![
            event("e1", "Sack of Rome", "marker:exact", 410, "late antiquity"),
            event("e2", "Fall of the Western Empire", "marker:near", 476, "late antiquity"),
            event("e3", "Lost Annal", "marker:corrupt", 500, "late antiquity"),
            event("e4", "Plague of Justinian", "marker:far", 541, "early medieval"),
            event("e5", "Battle of Hastings", "marker:none", 1066, "medieval"),
        ],
        Vec::new(),
    );
    let engine = engine_with(Arc::new(source), KeywordProvider::new());

    let corpus = engine.ensure_initialized().await.unwrap();
    assert_eq!(corpus.len(), 4);
    assert!(corpus.documents.iter().all(|d| d.id != "e3"));

    let status = engine.status();
    let build = status.last_build.unwrap();
    assert_eq!((build.fetched, build.embedded, build.skipped), (5, 4, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_queries_build_once() {
    let source = Arc::new(CountingSource::new(false));
    let mut config = test_config();
    config.corpus.throttle_ms = 5;
    let engine = Arc::new(RetrievalEngine::with_provider(
        source.clone(),
        KeywordProvider::new(),
        &config,
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .search("query:rome", &SearchOptions::default())
                .await
                .map(|r| r.len())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 4);
    }

    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_build_leaves_engine_uninitialized_and_retries() {
    let source = Arc::new(CountingSource::new(true));
    let engine = engine_with(source.clone(), KeywordProvider::new());

    let err = engine
        .search("query:rome", &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("database unavailable"));
    assert!(!engine.is_initialized());

    let results = engine
        .search("query:rome", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
    assert!(engine.is_initialized());
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_refresh_picks_up_new_documents() {
    let source = Arc::new(library());
    let engine = engine_with(source.clone(), KeywordProvider::new());
    let strict = SearchOptions {
        threshold: Some(0.95),
        ..SearchOptions::default()
    };

    assert!(engine.search("query:fresh", &strict).await.unwrap().is_empty());

    source.push_event(event(
        "e5",
        "Coronation of Charlemagne",
        "marker:fresh",
        800,
        "medieval",
    ));
    // Still served from the old corpus and the search cache.
    assert!(engine.search("query:fresh", &strict).await.unwrap().is_empty());

    let corpus = engine.refresh().await.unwrap();
    assert_eq!(corpus.len(), 8);

    let results = engine.search("query:fresh", &strict).await.unwrap();
    assert_eq!(ids(&results), vec!["e5"]);
}

#[tokio::test]
async fn test_query_in_flight_across_refresh_does_not_leave_stale_cache() {
    let source = Arc::new(library());
    let engine = Arc::new(engine_with(
        source.clone(),
        KeywordProvider::with_slow(Duration::from_millis(300)),
    ));
    engine.ensure_initialized().await.unwrap();
    assert_eq!(engine.generation(), 1);

    let claim = "query:slow query:fresh";
    let strict = SearchOptions {
        threshold: Some(0.95),
        ..SearchOptions::default()
    };

    let search_task = {
        let engine = engine.clone();
        let strict = strict.clone();
        tokio::spawn(async move { engine.search(claim, &strict).await })
    };
    let context_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .find_historical_context(claim, &ContextOptions::default())
                .await
        })
    };

    // Both queries hold the old corpus and are waiting on the provider.
    tokio::time::sleep(Duration::from_millis(50)).await;
    source.push_event(event(
        "e5",
        "Coronation of Charlemagne",
        "marker:fresh",
        800,
        "medieval",
    ));
    engine.refresh().await.unwrap();
    assert_eq!(engine.generation(), 2);

    // The in-flight queries finish against the corpus they started with.
    assert!(search_task.await.unwrap().unwrap().is_empty());
    let stale = context_task.await.unwrap().unwrap();
    assert!(stale.direct_matches.is_empty());

    // Their late cache writes are not served for the new corpus.
    let results = engine.search(claim, &strict).await.unwrap();
    assert_eq!(ids(&results), vec!["e5"]);

    let context = engine
        .find_historical_context(claim, &ContextOptions::default())
        .await
        .unwrap();
    assert_eq!(ids(&context.direct_matches), vec!["e5"]);
    assert!((context.confidence - 1.0).abs() < 1e-5);
}

#[test]
fn test_from_config_rejects_invalid_config() {
    let mut config = test_config();
    config.cache.search.capacity = 0;
    let err = RetrievalEngine::from_config(Arc::new(library()), &config)
        .err()
        .unwrap();
    assert!(err.to_string().contains("cache.search.capacity must be > 0"));

    let mut config = test_config();
    config.embedding.timeout_secs = 0;
    assert!(RetrievalEngine::from_config(Arc::new(library()), &config).is_err());
}

// ============ Historical context ============

#[tokio::test]
async fn test_context_splits_direct_and_related() {
    let engine = engine_with(Arc::new(library()), KeywordProvider::new());

    let result = engine
        .find_historical_context("query:rome", &ContextOptions::default())
        .await
        .unwrap();

    assert_eq!(ids(&result.direct_matches), vec!["e1", "e2"]);
    assert_eq!(ids(&result.related_events), vec!["e3"]);
    assert!((result.confidence - 1.0).abs() < 1e-5);
    assert_eq!(
        result.sources,
        vec!["Sack of Rome", "Fall of the Western Empire", "Plague of Justinian"]
    );
    assert!(result
        .direct_matches
        .iter()
        .chain(&result.related_events)
        .all(|r| r.document_class == DocumentClass::Event));
}

#[tokio::test]
async fn test_context_time_range_and_similar_toggle() {
    let engine = engine_with(Arc::new(library()), KeywordProvider::new());

    let ranged = ContextOptions {
        time_range: Some(TimeRange { start: 450, end: 600 }),
        ..ContextOptions::default()
    };
    let result = engine
        .find_historical_context("query:rome", &ranged)
        .await
        .unwrap();
    assert_eq!(ids(&result.direct_matches), vec!["e2"]);
    assert_eq!(ids(&result.related_events), vec!["e3"]);
    assert!((result.confidence - 0.85).abs() < 1e-4);

    let direct_only = ContextOptions {
        include_similar: Some(false),
        ..ContextOptions::default()
    };
    let result = engine
        .find_historical_context("query:rome", &direct_only)
        .await
        .unwrap();
    assert!(result.related_events.is_empty());
    assert_eq!(result.sources.len(), 2);
}

#[tokio::test]
async fn test_context_without_direct_match_has_zero_confidence() {
    let engine = engine_with(Arc::new(library()), KeywordProvider::new());

    let result = engine
        .find_historical_context("query:loose", &ContextOptions::default())
        .await
        .unwrap();

    assert!(result.direct_matches.is_empty());
    assert_eq!(ids(&result.related_events), vec!["e4", "e1"]);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.sources, vec!["Battle of Hastings", "Sack of Rome"]);
}

#[tokio::test]
async fn test_context_is_cached() {
    let provider = KeywordProvider::new();
    let engine = engine_with(Arc::new(library()), provider.clone());

    let first = engine
        .find_historical_context("query:rome", &ContextOptions::default())
        .await
        .unwrap();
    let stats = engine.cache_stats();
    assert_eq!(stats.context.entry_count, 1);
    // Direct and related searches use different options.
    assert_eq!(stats.search.entry_count, 2);

    let second = engine
        .find_historical_context("query:rome", &ContextOptions::default())
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.cache_stats().search.entry_count, 2);
}

// ============ Chapter context ============

#[tokio::test]
async fn test_chapter_context_excludes_itself() {
    let engine = engine_with(Arc::new(library()), KeywordProvider::new());

    let context = engine.get_chapter_context("c1").await.unwrap();

    assert_eq!(context.chapter.as_ref().map(|c| c.id.as_str()), Some("c1"));
    assert_eq!(ids(&context.related_events), vec!["e1", "e2", "e3"]);
    assert_eq!(ids(&context.related_chapters), vec!["c2"]);
}

#[tokio::test]
async fn test_unknown_chapter_yields_empty_context() {
    let provider = KeywordProvider::new();
    let engine = engine_with(Arc::new(library()), provider.clone());

    let context = engine.get_chapter_context("missing").await.unwrap();

    assert!(context.chapter.is_none());
    assert!(context.related_events.is_empty());
    assert!(context.related_chapters.is_empty());
    assert_eq!(provider.calls(), 0);
}

// ============ Cache admin and status ============

#[tokio::test]
async fn test_cache_stats_and_clear_all() {
    let engine = engine_with(Arc::new(library()), KeywordProvider::new());
    assert_eq!(engine.cache_stats().embeddings.entry_count, 0);

    engine
        .search("query:rome", &SearchOptions::default())
        .await
        .unwrap();
    engine
        .find_historical_context("query:rome", &ContextOptions::default())
        .await
        .unwrap();

    let stats = engine.cache_stats();
    assert_eq!(stats.embeddings.entry_count, 8);
    assert_eq!(stats.search.entry_count, 3);
    assert_eq!(stats.context.entry_count, 1);
    assert!(stats.embeddings.approx_size_bytes > 0);
    assert!(stats.search.approx_size_bytes > 0);

    engine.clear_all_caches();
    let stats = engine.cache_stats();
    assert_eq!(stats.embeddings.entry_count, 0);
    assert_eq!(stats.search.entry_count, 0);
    assert_eq!(stats.context.entry_count, 0);
    assert_eq!(stats.search.approx_size_bytes, 0);

    // Clearing caches does not discard the corpus.
    assert!(engine.is_initialized());
}

#[tokio::test]
async fn test_status_reports_corpus_shape() {
    let engine = engine_with(Arc::new(library()), KeywordProvider::new());
    assert!(!engine.status().initialized);
    assert!(engine.status().built_at.is_none());

    engine.ensure_initialized().await.unwrap();
    let status = engine.status();
    assert!(status.initialized);
    assert!(status.embeddings_enabled);
    assert_eq!(status.model, "keyword");
    assert_eq!(status.dims, 3);
    assert_eq!(status.event_count, 4);
    assert_eq!(status.chapter_count, 3);
    assert_eq!(status.document_count, 7);
    assert!(status.built_at.is_some());
}
