//! Core data models for the retrieval engine.
//!
//! Source records ([`HistoricalEvent`], [`Chapter`]) arrive from the
//! external document store. The builder turns each into an
//! [`EmbeddedDocument`], and queries produce [`SearchResult`]s,
//! [`ContextResult`]s and [`ChapterContext`]s.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::CacheWeight;

/// The two kinds of source document that feed the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentClass {
    Event,
    Chapter,
}

impl DocumentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentClass::Event => "event",
            DocumentClass::Chapter => "chapter",
        }
    }
}

impl fmt::Display for DocumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A historical event as returned by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Negative for BCE.
    pub year: i32,
    pub era: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A book chapter as returned by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub narrative: String,
    #[serde(default)]
    pub commentary: Option<String>,
    #[serde(default)]
    pub era: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Metadata carried by an event entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub title: String,
    pub era: String,
    pub year: i32,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Metadata carried by a chapter entry. Chapters have no year or region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterMetadata {
    pub title: String,
    #[serde(default)]
    pub era: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-class metadata. The variant is the document class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum DocumentMetadata {
    Event(EventMetadata),
    Chapter(ChapterMetadata),
}

impl DocumentMetadata {
    pub fn class(&self) -> DocumentClass {
        match self {
            DocumentMetadata::Event(_) => DocumentClass::Event,
            DocumentMetadata::Chapter(_) => DocumentClass::Chapter,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            DocumentMetadata::Event(m) => &m.title,
            DocumentMetadata::Chapter(m) => &m.title,
        }
    }

    pub fn era(&self) -> Option<&str> {
        match self {
            DocumentMetadata::Event(m) => Some(&m.era),
            DocumentMetadata::Chapter(m) => m.era.as_deref(),
        }
    }

    /// Only events carry a year.
    pub fn year(&self) -> Option<i32> {
        match self {
            DocumentMetadata::Event(m) => Some(m.year),
            DocumentMetadata::Chapter(_) => None,
        }
    }

    pub fn region(&self) -> Option<&str> {
        match self {
            DocumentMetadata::Event(m) => m.region.as_deref(),
            DocumentMetadata::Chapter(_) => None,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            DocumentMetadata::Event(m) => &m.tags,
            DocumentMetadata::Chapter(m) => &m.tags,
        }
    }
}

impl From<&HistoricalEvent> for DocumentMetadata {
    fn from(event: &HistoricalEvent) -> Self {
        DocumentMetadata::Event(EventMetadata {
            title: event.title.clone(),
            era: event.era.clone(),
            year: event.year,
            region: event.region.clone(),
            tags: event.tags.clone(),
        })
    }
}

impl From<&Chapter> for DocumentMetadata {
    fn from(chapter: &Chapter) -> Self {
        DocumentMetadata::Chapter(ChapterMetadata {
            title: chapter.title.clone(),
            era: chapter.era.clone(),
            tags: chapter.tags.clone(),
        })
    }
}

/// A single corpus entry: flattened text, its embedding, and metadata.
///
/// `id` is only unique within its document class; `(id, class)` is
/// unique within a corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

impl EmbeddedDocument {
    pub fn class(&self) -> DocumentClass {
        self.metadata.class()
    }
}

/// A scored corpus entry returned from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub similarity: f32,
    pub document_class: DocumentClass,
    pub metadata: DocumentMetadata,
}

impl SearchResult {
    /// Returns at most `max_chars` characters of `content`.
    pub fn snippet(&self, max_chars: usize) -> &str {
        match self.content.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.content[..idx],
            None => &self.content,
        }
    }

    /// Whether this result refers to the same corpus entry as `other`.
    pub fn same_entry(&self, other: &SearchResult) -> bool {
        self.id == other.id && self.document_class == other.document_class
    }
}

/// Options for a similarity search. Unset fields take the defaults in
/// [`crate::search`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub document_class: Option<DocumentClass>,
    #[serde(default)]
    pub era: Option<String>,
}

impl SearchOptions {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(crate::search::DEFAULT_LIMIT)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.unwrap_or(crate::search::DEFAULT_THRESHOLD)
    }
}

/// Inclusive year range. Negative years are BCE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i32,
    pub end: i32,
}

impl TimeRange {
    pub fn contains(&self, year: i32) -> bool {
        self.start <= year && year <= self.end
    }
}

/// Options for a historical-context lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Defaults to `true`.
    #[serde(default)]
    pub include_similar: Option<bool>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

impl ContextOptions {
    pub fn include_similar(&self) -> bool {
        self.include_similar.unwrap_or(true)
    }
}

/// Historical context assembled for a claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    pub direct_matches: Vec<SearchResult>,
    pub related_events: Vec<SearchResult>,
    /// In `[0.0, 1.0]`.
    pub confidence: f32,
    pub sources: Vec<String>,
}

/// Events and chapters related to one chapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterContext {
    pub chapter: Option<Chapter>,
    pub related_events: Vec<SearchResult>,
    pub related_chapters: Vec<SearchResult>,
}

fn metadata_bytes(metadata: &DocumentMetadata) -> usize {
    let title = metadata.title().len();
    let era = metadata.era().map_or(0, str::len);
    let region = metadata.region().map_or(0, str::len);
    let tags: usize = metadata.tags().iter().map(String::len).sum();
    title + era + region + tags + std::mem::size_of::<DocumentMetadata>()
}

impl CacheWeight for SearchResult {
    fn approx_bytes(&self) -> usize {
        self.id.len()
            + self.content.len()
            + metadata_bytes(&self.metadata)
            + std::mem::size_of::<SearchResult>()
    }
}

impl CacheWeight for ContextResult {
    fn approx_bytes(&self) -> usize {
        self.direct_matches.approx_bytes()
            + self.related_events.approx_bytes()
            + self.sources.iter().map(String::len).sum::<usize>()
            + std::mem::size_of::<ContextResult>()
    }
}
