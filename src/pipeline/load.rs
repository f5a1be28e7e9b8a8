use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use crate::data::AnalyticsStore;
use crate::types::{AdEvent, SourceEvent};

/// What the loader did with an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing was extracted; no write was issued.
    Empty,
    Appended(usize),
}

impl LoadOutcome {
    pub fn rows(&self) -> usize {
        match self {
            LoadOutcome::Empty => 0,
            LoadOutcome::Appended(n) => *n,
        }
    }
}

/// Append extracted events to `ad_events` in a single bulk write,
/// stamping every row with `inserted_at`.
pub fn load_events(
    analytics: &mut dyn AnalyticsStore,
    events: &[SourceEvent],
    inserted_at: NaiveDateTime,
) -> Result<LoadOutcome> {
    if events.is_empty() {
        return Ok(LoadOutcome::Empty);
    }

    let rows: Vec<AdEvent> = events
        .iter()
        .map(|e| AdEvent {
            event_id: e.id,
            campaign_id: e.campaign_id,
            event_type: e.event_type,
            created_at: e.created_at,
            inserted_at,
        })
        .collect();

    analytics
        .append_events(&rows)
        .with_context(|| format!("failed to append {} events", rows.len()))?;

    Ok(LoadOutcome::Appended(rows.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::ts;
    use crate::data::SqliteStore;
    use crate::types::{EventType, Table};

    fn setup() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.init().unwrap();
        store
    }

    #[test]
    fn test_empty_input_skips_write() {
        let mut store = setup();
        let outcome = load_events(&mut store, &[], ts(0)).unwrap();
        assert_eq!(outcome, LoadOutcome::Empty);
        assert_eq!(outcome.rows(), 0);
        assert_eq!(store.count_rows(Table::AdEvents).unwrap(), 0);
    }

    #[test]
    fn test_rows_stamped_with_load_time() {
        let mut store = setup();
        let events = vec![
            SourceEvent {
                created_at: ts(1),
                event_type: EventType::Impression,
                id: 1,
                campaign_id: 3,
            },
            SourceEvent {
                created_at: ts(2),
                event_type: EventType::Click,
                id: 1,
                campaign_id: 3,
            },
        ];
        let outcome = load_events(&mut store, &events, ts(500)).unwrap();
        assert_eq!(outcome, LoadOutcome::Appended(2));

        let stored = store.load_events().unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|e| e.inserted_at == ts(500)));
        assert_eq!(stored[0].created_at, ts(1));
        assert_eq!(stored[1].event_type, EventType::Click);
    }
}
