//! JSON fixture [`DocumentSource`].
//!
//! Reads a single file of the form
//!
//! ```json
//! {
//!   "events":   [{ "id": "...", "title": "...", "description": "...", "year": 1066, "era": "..." }],
//!   "chapters": [{ "id": "...", "title": "...", "narrative": "..." }]
//! }
//! ```
//!
//! and serves it from memory. Useful for demos, seeding, and tests when
//! no relational store is available.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use historia_core::models::{Chapter, HistoricalEvent};
use historia_core::source::memory::InMemorySource;
use historia_core::source::DocumentSource;

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    events: Vec<HistoricalEvent>,
    #[serde(default)]
    chapters: Vec<Chapter>,
}

/// A document source loaded from a JSON file.
pub struct JsonFileSource {
    inner: InMemorySource,
}

impl JsonFileSource {
    /// Load and validate a fixture file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or if an id repeats
    /// within a document class.
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid document file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let fixture: Fixture = serde_json::from_str(content)?;

        check_unique("event", fixture.events.iter().map(|e| e.id.as_str()))?;
        check_unique("chapter", fixture.chapters.iter().map(|c| c.id.as_str()))?;

        Ok(Self {
            inner: InMemorySource::new(fixture.events, fixture.chapters),
        })
    }
}

fn check_unique<'a>(class: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            bail!("duplicate {} id: {}", class, id);
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentSource for JsonFileSource {
    async fn list_events(&self) -> Result<Vec<HistoricalEvent>> {
        self.inner.list_events().await
    }

    async fn list_chapters(&self) -> Result<Vec<Chapter>> {
        self.inner.list_chapters().await
    }

    async fn get_chapter_by_id(&self, id: &str) -> Result<Option<Chapter>> {
        self.inner.get_chapter_by_id(id).await
    }
}
