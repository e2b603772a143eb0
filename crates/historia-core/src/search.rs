//! Brute-force similarity ranking over an in-memory corpus.
//!
//! # Ranking
//!
//! 1. Return nothing for an empty corpus or an all-zero query vector.
//! 2. Drop entries that fail the `document_class` / `era` filters (exact match).
//! 3. Score the rest by cosine similarity against the query vector.
//! 4. Keep entries with `similarity >= threshold`.
//! 5. Sort by similarity (desc); ties keep corpus order.
//! 6. Truncate to `limit`.
//!
//! Embedding the query and caching results is the caller's job.

use serde::Serialize;

use crate::embedding::{cosine_similarity, is_zero_vector};
use crate::models::{DocumentClass, EmbeddedDocument, SearchOptions, SearchResult};

/// Default maximum number of results.
pub const DEFAULT_LIMIT: usize = 10;
/// Default minimum similarity.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

fn passes_filters(doc: &EmbeddedDocument, opts: &SearchOptions) -> bool {
    if let Some(class) = opts.document_class {
        if doc.class() != class {
            return false;
        }
    }
    if let Some(era) = opts.era.as_deref() {
        if doc.metadata.era() != Some(era) {
            return false;
        }
    }
    true
}

/// Rank `corpus` against `query_vec` and return the filtered, sorted,
/// truncated results.
pub fn rank(
    corpus: &[EmbeddedDocument],
    query_vec: &[f32],
    opts: &SearchOptions,
) -> Vec<SearchResult> {
    if corpus.is_empty() || is_zero_vector(query_vec) {
        return Vec::new();
    }

    let threshold = opts.threshold();

    let mut scored: Vec<(f32, &EmbeddedDocument)> = corpus
        .iter()
        .filter(|doc| passes_filters(doc, opts))
        .map(|doc| (cosine_similarity(query_vec, &doc.embedding), doc))
        .filter(|(sim, _)| *sim >= threshold)
        .collect();

    // `sort_by` is stable, so equal scores stay in corpus order.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(opts.limit());

    scored
        .into_iter()
        .map(|(similarity, doc)| SearchResult {
            id: doc.id.clone(),
            content: doc.content.clone(),
            similarity,
            document_class: doc.class(),
            metadata: doc.metadata.clone(),
        })
        .collect()
}

#[derive(Serialize)]
struct SearchKey<'a> {
    kind: &'static str,
    query: &'a str,
    limit: usize,
    threshold: f32,
    document_class: Option<DocumentClass>,
    era: Option<&'a str>,
}

/// Deterministic cache key for `(query, options)`.
///
/// Defaults are resolved first, so omitting an option and passing its
/// default value produce the same key.
pub fn cache_key(query: &str, opts: &SearchOptions) -> String {
    let key = SearchKey {
        kind: "search",
        query,
        limit: opts.limit(),
        threshold: opts.threshold(),
        document_class: opts.document_class,
        era: opts.era.as_deref(),
    };
    serde_json::to_string(&key).unwrap_or_else(|_| format!("search:{query}"))
}
