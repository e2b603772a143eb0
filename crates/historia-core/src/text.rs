//! Flattening of source records into the text that gets embedded.
//!
//! The output is also what search results display, and its hash is the
//! embedding-cache key, so the format must stay stable for a given
//! record. Fields are emitted in a fixed order; absent optional fields
//! and blank strings are left out entirely.

use crate::models::{Chapter, HistoricalEvent};

fn push_line(out: &mut String, label: Option<&str>, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    if let Some(label) = label {
        out.push_str(label);
        out.push_str(": ");
    }
    out.push_str(value);
}

/// Flatten an event into embeddable text.
pub fn event_content(event: &HistoricalEvent) -> String {
    let mut out = String::new();
    push_line(&mut out, None, &event.title);
    push_line(&mut out, None, &event.description);
    push_line(&mut out, Some("Year"), &event.year.to_string());
    push_line(&mut out, Some("Era"), &event.era);
    if let Some(region) = &event.region {
        push_line(&mut out, Some("Region"), region);
    }
    if !event.tags.is_empty() {
        push_line(&mut out, Some("Tags"), &event.tags.join(", "));
    }
    out
}

/// Flatten a chapter into embeddable text.
pub fn chapter_content(chapter: &Chapter) -> String {
    let mut out = String::new();
    push_line(&mut out, None, &chapter.title);
    push_line(&mut out, None, &chapter.narrative);
    if let Some(commentary) = &chapter.commentary {
        push_line(&mut out, Some("Commentary"), commentary);
    }
    if let Some(era) = &chapter.era {
        push_line(&mut out, Some("Era"), era);
    }
    if !chapter.tags.is_empty() {
        push_line(&mut out, Some("Tags"), &chapter.tags.join(", "));
    }
    out
}

/// Query text used to find context for a chapter.
pub fn chapter_query(chapter: &Chapter) -> String {
    format!("{} {}", chapter.title.trim(), chapter.narrative.trim())
}
