//! Document source abstraction.
//!
//! The [`DocumentSource`] trait is the engine's only view of the
//! external document store: two full listings used to build the corpus,
//! and a point lookup used for chapter context. Implementations must be
//! `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chapter, HistoricalEvent};

/// Read-only access to the external document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_events`](DocumentSource::list_events) | Every event, for a corpus build |
/// | [`list_chapters`](DocumentSource::list_chapters) | Every chapter, for a corpus build |
/// | [`get_chapter_by_id`](DocumentSource::get_chapter_by_id) | One chapter, for chapter context |
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch every event. An error aborts the corpus build.
    async fn list_events(&self) -> Result<Vec<HistoricalEvent>>;

    /// Fetch every chapter. An error aborts the corpus build.
    async fn list_chapters(&self) -> Result<Vec<Chapter>>;

    /// Fetch one chapter; `Ok(None)` if it does not exist.
    async fn get_chapter_by_id(&self, id: &str) -> Result<Option<Chapter>>;
}
