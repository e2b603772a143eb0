//! Corpus builder: source documents → flattened text → embeddings.
//!
//! A build fetches every event and chapter from the [`DocumentSource`],
//! flattens each into text, and embeds them one at a time with a fixed
//! pause between calls to stay under the provider's rate limit. Events
//! come first, then chapters, each in fetch order; ranking ties resolve
//! by this order.
//!
//! A fetch failure aborts the build. A single document that cannot be
//! embedded is logged and left out.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use historia_core::models::{DocumentClass, DocumentMetadata, EmbeddedDocument};
use historia_core::source::DocumentSource;
use historia_core::text::{chapter_content, event_content};

use crate::embedding::Embedder;

/// A realized, immutable corpus.
#[derive(Debug, Clone, Serialize)]
pub struct Corpus {
    pub documents: Vec<EmbeddedDocument>,
    /// Shared length of every `embedding`.
    pub dims: usize,
    pub built_at: DateTime<Utc>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn count(&self, class: DocumentClass) -> usize {
        self.documents.iter().filter(|d| d.class() == class).count()
    }
}

/// Counts reported by one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub fetched: usize,
    pub embedded: usize,
    pub skipped: usize,
}

/// Builds a [`Corpus`] from a [`DocumentSource`].
pub struct CorpusBuilder {
    source: Arc<dyn DocumentSource>,
    embedder: Arc<Embedder>,
    throttle: Duration,
}

impl CorpusBuilder {
    /// `throttle` is the pause between consecutive embedding calls; zero
    /// disables it.
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: Arc<Embedder>,
        throttle: Duration,
    ) -> Self {
        Self {
            source,
            embedder,
            throttle,
        }
    }

    /// Fetch, flatten, and embed every source document.
    pub async fn build(&self) -> Result<(Corpus, BuildStats)> {
        let started = Instant::now();

        let (events, chapters) = tokio::try_join!(
            async {
                self.source
                    .list_events()
                    .await
                    .context("Failed to fetch events")
            },
            async {
                self.source
                    .list_chapters()
                    .await
                    .context("Failed to fetch chapters")
            },
        )?;

        let pending: Vec<(String, String, DocumentMetadata)> = events
            .iter()
            .map(|e| (e.id.clone(), event_content(e), DocumentMetadata::from(e)))
            .chain(
                chapters
                    .iter()
                    .map(|c| (c.id.clone(), chapter_content(c), DocumentMetadata::from(c))),
            )
            .collect();

        tracing::info!(
            events = events.len(),
            chapters = chapters.len(),
            "building corpus"
        );

        let mut stats = BuildStats {
            fetched: pending.len(),
            ..BuildStats::default()
        };
        let mut documents = Vec::with_capacity(pending.len());

        for (i, (id, content, metadata)) in pending.into_iter().enumerate() {
            if i > 0 && !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }

            match self.embedder.embed(&content).await {
                Ok(embedding) => {
                    documents.push(EmbeddedDocument {
                        id,
                        content,
                        embedding,
                        metadata,
                    });
                    stats.embedded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        class = %metadata.class(),
                        id = %id,
                        error = %e,
                        "skipping document that could not be embedded"
                    );
                    stats.skipped += 1;
                }
            }
        }

        tracing::info!(
            embedded = stats.embedded,
            skipped = stats.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "corpus built"
        );

        let corpus = Corpus {
            documents,
            dims: self.embedder.dims(),
            built_at: Utc::now(),
        };
        Ok((corpus, stats))
    }
}
