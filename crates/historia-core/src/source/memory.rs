//! In-memory [`DocumentSource`] for tests and fixture-driven hosts.
//!
//! Records live in `Vec`s behind `std::sync::RwLock`, so they can be
//! replaced between corpus builds.

use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chapter, HistoricalEvent};

use super::DocumentSource;

/// In-memory document source.
#[derive(Default)]
pub struct InMemorySource {
    events: RwLock<Vec<HistoricalEvent>>,
    chapters: RwLock<Vec<Chapter>>,
}

impl InMemorySource {
    pub fn new(events: Vec<HistoricalEvent>, chapters: Vec<Chapter>) -> Self {
        Self {
            events: RwLock::new(events),
            chapters: RwLock::new(chapters),
        }
    }

    pub fn push_event(&self, event: HistoricalEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn push_chapter(&self, chapter: Chapter) {
        self.chapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chapter);
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    async fn list_events(&self) -> Result<Vec<HistoricalEvent>> {
        Ok(self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn list_chapters(&self) -> Result<Vec<Chapter>> {
        Ok(self
            .chapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn get_chapter_by_id(&self, id: &str) -> Result<Option<Chapter>> {
        let chapters = self.chapters.read().unwrap_or_else(PoisonError::into_inner);
        Ok(chapters.iter().find(|c| c.id == id).cloned())
    }
}
