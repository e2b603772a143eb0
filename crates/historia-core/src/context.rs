//! Historical-context aggregation for fact-checking a claim.
//!
//! Given two raw result lists for the same claim, one from a tight
//! search ([`direct_options`]) and one from a loose search
//! ([`related_options`]), [`aggregate`] builds the final
//! [`ContextResult`]:
//!
//! - related entries already present among the direct matches are dropped
//! - an optional [`TimeRange`](crate::models::TimeRange) keeps only entries
//!   whose year falls inside it; entries without a year are dropped
//! - related events are capped at [`RELATED_LIMIT`]
//! - `confidence` is the best direct similarity, scaled by
//!   [`NO_DIRECT_FACTOR`] when there is no direct match
//! - `sources` lists every direct title, then up to
//!   [`RELATED_SOURCE_LIMIT`] related titles

use serde::Serialize;

use crate::models::{
    Chapter, ChapterContext, ContextOptions, ContextResult, DocumentClass, SearchOptions,
    SearchResult, TimeRange,
};

pub const DIRECT_THRESHOLD: f32 = 0.8;
pub const DIRECT_LIMIT: usize = 5;
pub const RELATED_THRESHOLD: f32 = 0.6;
/// How many related candidates are fetched before de-duplication.
pub const RELATED_FETCH_LIMIT: usize = 10;
pub const RELATED_LIMIT: usize = 5;
pub const RELATED_SOURCE_LIMIT: usize = 3;
pub const NO_DIRECT_FACTOR: f32 = 0.5;

pub const CHAPTER_EVENT_THRESHOLD: f32 = 0.6;
pub const CHAPTER_EVENT_LIMIT: usize = 5;
pub const CHAPTER_CHAPTER_THRESHOLD: f32 = 0.7;
pub const CHAPTER_CHAPTER_LIMIT: usize = 3;

fn class_search(class: DocumentClass, threshold: f32, limit: usize) -> SearchOptions {
    SearchOptions {
        limit: Some(limit),
        threshold: Some(threshold),
        document_class: Some(class),
        era: None,
    }
}

/// Search options for direct matches: events only, tight threshold.
pub fn direct_options() -> SearchOptions {
    class_search(DocumentClass::Event, DIRECT_THRESHOLD, DIRECT_LIMIT)
}

/// Search options for related events: events only, loose threshold.
pub fn related_options() -> SearchOptions {
    class_search(DocumentClass::Event, RELATED_THRESHOLD, RELATED_FETCH_LIMIT)
}

/// Search options for the events related to a chapter.
pub fn chapter_event_options() -> SearchOptions {
    class_search(
        DocumentClass::Event,
        CHAPTER_EVENT_THRESHOLD,
        CHAPTER_EVENT_LIMIT,
    )
}

/// Search options for the chapters related to a chapter.
pub fn chapter_chapter_options() -> SearchOptions {
    class_search(
        DocumentClass::Chapter,
        CHAPTER_CHAPTER_THRESHOLD,
        CHAPTER_CHAPTER_LIMIT,
    )
}

fn within(range: Option<TimeRange>, result: &SearchResult) -> bool {
    match range {
        None => true,
        Some(range) => result.metadata.year().is_some_and(|y| range.contains(y)),
    }
}

/// Best direct similarity, or `0.0` without direct matches, scaled by
/// `1.0` if a direct match exists and [`NO_DIRECT_FACTOR`] otherwise.
pub fn confidence(direct: &[SearchResult]) -> f32 {
    let best = direct
        .iter()
        .map(|r| r.similarity)
        .fold(0.0f32, f32::max);
    let factor = if direct.is_empty() {
        NO_DIRECT_FACTOR
    } else {
        1.0
    };
    (best * factor).clamp(0.0, 1.0)
}

/// Combine raw direct and related results into a [`ContextResult`].
pub fn aggregate(
    direct: Vec<SearchResult>,
    related: Vec<SearchResult>,
    opts: &ContextOptions,
) -> ContextResult {
    let related: Vec<SearchResult> = if opts.include_similar() {
        related
            .into_iter()
            .filter(|r| !direct.iter().any(|d| d.same_entry(r)))
            .filter(|r| within(opts.time_range, r))
            .take(RELATED_LIMIT)
            .collect()
    } else {
        Vec::new()
    };

    let direct: Vec<SearchResult> = direct
        .into_iter()
        .filter(|r| within(opts.time_range, r))
        .collect();

    let sources = direct
        .iter()
        .map(|r| r.metadata.title().to_string())
        .chain(
            related
                .iter()
                .take(RELATED_SOURCE_LIMIT)
                .map(|r| r.metadata.title().to_string()),
        )
        .collect();

    ContextResult {
        confidence: confidence(&direct),
        direct_matches: direct,
        related_events: related,
        sources,
    }
}

/// Assemble a [`ChapterContext`], removing the chapter itself from the
/// related chapters.
pub fn chapter_context(
    chapter: Chapter,
    related_events: Vec<SearchResult>,
    related_chapters: Vec<SearchResult>,
) -> ChapterContext {
    let related_chapters = related_chapters
        .into_iter()
        .filter(|r| r.id != chapter.id)
        .collect();
    ChapterContext {
        chapter: Some(chapter),
        related_events,
        related_chapters,
    }
}

#[derive(Serialize)]
struct ContextKey<'a> {
    kind: &'static str,
    claim: &'a str,
    include_similar: bool,
    time_range: Option<TimeRange>,
}

/// Deterministic cache key for `(claim, options)`.
pub fn cache_key(claim: &str, opts: &ContextOptions) -> String {
    let key = ContextKey {
        kind: "context",
        claim,
        include_similar: opts.include_similar(),
        time_range: opts.time_range,
    };
    serde_json::to_string(&key).unwrap_or_else(|_| format!("context:{claim}"))
}
