use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tracing::debug;

use crate::data::SourceStore;
use crate::types::{EventType, SourceEvent};

use super::watermark::Watermarks;

/// Events pulled from both source tables, merged and ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub events: Vec<SourceEvent>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

/// Pull every impression and click past its cursor and union them.
///
/// The merge is a set union ordered by `(created_at, event_type, id)`, so a
/// row returned twice collapses to one. Rows the cursor has already seen, or
/// that fall before its boundary, are dropped.
pub fn extract_events(source: &mut dyn SourceStore, marks: &Watermarks) -> Result<Extraction> {
    let mut merged: BTreeSet<SourceEvent> = BTreeSet::new();

    for event_type in EventType::ALL {
        let cursor = marks.get(event_type);
        let rows = source
            .fetch_events(event_type, cursor.map(|c| c.since))
            .with_context(|| format!("failed to extract {} rows", event_type))?;
        let fetched = rows.len();

        merged.extend(rows.into_iter().filter(|e| cursor.map_or(true, |c| c.admits(e))));
        debug!(%event_type, fetched, "fetched source rows");
    }

    Ok(Extraction {
        events: merged.into_iter().collect(),
    })
}
