use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, SubsecRound};
use tracing::debug;

use crate::data::AnalyticsStore;
use crate::types::{EventType, SourceEvent};

/// Where the next extraction of one event type starts.
///
/// `since` is the newest synced `created_at` floored to whole seconds, so it
/// never sits above a source timestamp whatever precision `ad_events` keeps.
/// `seen` holds the ids already logged at or after `since`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub since: NaiveDateTime,
    pub seen: HashSet<i64>,
}

impl SyncCursor {
    /// True for a source row not yet present in the event log.
    pub fn admits(&self, event: &SourceEvent) -> bool {
        event.created_at >= self.since && !self.seen.contains(&event.id)
    }
}

/// Sync cursors for both event types. `None` means nothing synced yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watermarks {
    pub impression: Option<SyncCursor>,
    pub click: Option<SyncCursor>,
}

impl Watermarks {
    pub fn get(&self, event_type: EventType) -> Option<&SyncCursor> {
        match event_type {
            EventType::Impression => self.impression.as_ref(),
            EventType::Click => self.click.as_ref(),
        }
    }
}

/// Read the sync cursor per event type from `ad_events`.
pub fn read_watermarks(analytics: &mut dyn AnalyticsStore) -> Result<Watermarks> {
    let mut marks = Watermarks::default();
    for event_type in EventType::ALL {
        let wm = analytics
            .latest_watermark(event_type)
            .with_context(|| format!("failed to read {} watermark", event_type))?;

        let cursor = match wm {
            Some(w) => {
                let since = w.created_at.trunc_subsecs(0);
                let seen = analytics
                    .event_ids_since(event_type, since)
                    .with_context(|| format!("failed to read {} boundary ids", event_type))?;
                debug!(%event_type, watermark = %w, boundary_ids = seen.len(), "read watermark");
                Some(SyncCursor { since, seen })
            }
            None => {
                debug!(%event_type, "no watermark, syncing from the beginning");
                None
            }
        };

        match event_type {
            EventType::Impression => marks.impression = cursor,
            EventType::Click => marks.click = cursor,
        }
    }
    Ok(marks)
}
