use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};

use crate::types::{
    AdEvent, CampaignDimension, CampaignEventCounts, CampaignPerformance, EventType,
    SourceCampaign, SourceEvent, Table, Watermark,
};

use super::schema;

/// Read-only access to the transactional source tables.
pub trait SourceStore {
    /// Rows of one event table with `created_at >= since`, ordered by
    /// `(created_at, id)`. `None` means from the beginning.
    fn fetch_events(
        &mut self,
        event_type: EventType,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<SourceEvent>>;

    /// Every campaign joined to its advertiser name.
    fn fetch_campaigns(&mut self) -> Result<Vec<SourceCampaign>>;
}

/// Read/write access to the analytical tables.
pub trait AnalyticsStore {
    /// Greatest `(created_at, event_id)` already in `ad_events` for this type.
    /// An empty log yields `Ok(None)`.
    fn latest_watermark(&mut self, event_type: EventType) -> Result<Option<Watermark>>;

    /// Ids of this type already in `ad_events` with `created_at >= since`.
    fn event_ids_since(
        &mut self,
        event_type: EventType,
        since: NaiveDateTime,
    ) -> Result<HashSet<i64>>;

    /// Append rows to `ad_events` as one bulk write.
    fn append_events(&mut self, events: &[AdEvent]) -> Result<()>;

    /// Remove every row of one table.
    fn truncate(&mut self, table: Table) -> Result<()>;

    /// Atomically swap the contents of `campaign_dimension` for `rows`.
    fn replace_dimension(&mut self, rows: &[CampaignDimension]) -> Result<()>;

    fn load_dimension(&mut self) -> Result<Vec<CampaignDimension>>;

    /// Impression and click counts per campaign present in `ad_events`.
    fn event_counts(&mut self) -> Result<Vec<CampaignEventCounts>>;

    /// Atomically swap the contents of `daily_campaign_performance` for `rows`.
    fn replace_metrics(&mut self, rows: &[CampaignPerformance]) -> Result<()>;
}

/// SQLite-backed implementation of both stores.
///
/// One database can hold the source tables, the analytical tables, or both.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open a file-backed database.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Create source and analytical tables.
    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(schema::CREATE_SOURCE_TABLES)?;
        self.conn.execute_batch(schema::CREATE_ANALYTICS_TABLES)?;
        self.conn.execute_batch(schema::CREATE_INDEXES)?;
        Ok(())
    }

    /// Borrow the underlying connection (for seeding and inspection).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Number of rows in an analytical table.
    pub fn count_rows(&self, table: Table) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn load_events(&self) -> Result<Vec<AdEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, campaign_id, event_type, created_at, inserted_at
             FROM ad_events ORDER BY created_at, event_type, event_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let type_str: String = row.get(2)?;
            let event_type = EventType::parse(&type_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("unknown event type '{}'", type_str).into(),
                )
            })?;
            Ok(AdEvent {
                event_id: row.get(0)?,
                campaign_id: row.get(1)?,
                event_type,
                created_at: row.get(3)?,
                inserted_at: row.get(4)?,
            })
        })?;

        let mut events = Vec::new();
        for r in rows {
            events.push(r?);
        }
        Ok(events)
    }

    pub fn load_metrics(&self) -> Result<Vec<CampaignPerformance>> {
        let mut stmt = self.conn.prepare(
            "SELECT campaign_id, impressions_count, clicks_count, spend_amount, ctr, cpm
             FROM daily_campaign_performance ORDER BY campaign_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CampaignPerformance {
                    campaign_id: row.get(0)?,
                    impressions_count: row.get::<_, i64>(1)? as u64,
                    clicks_count: row.get::<_, i64>(2)? as u64,
                    spend_amount: row.get(3)?,
                    ctr: row.get(4)?,
                    cpm: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl SourceStore for SqliteStore {
    fn fetch_events(
        &mut self,
        event_type: EventType,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<SourceEvent>> {
        let table = event_type.source_table();
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<SourceEvent> {
            Ok(SourceEvent {
                id: row.get(0)?,
                campaign_id: row.get(1)?,
                event_type,
                created_at: row.get(2)?,
            })
        };

        let events = match since {
            Some(since) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT id, campaign_id, created_at FROM {}
                     WHERE created_at >= ?1
                     ORDER BY created_at, id",
                    table
                ))?;
                let rows = stmt.query_map([since], map_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT id, campaign_id, created_at FROM {} ORDER BY created_at, id",
                    table
                ))?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(events)
    }

    fn fetch_campaigns(&mut self) -> Result<Vec<SourceCampaign>> {
        let mut stmt = self.conn.prepare(schema::SQLITE_CAMPAIGNS)?;
        let rows = stmt.query_map([], |row| {
            Ok(SourceCampaign {
                id: row.get(0)?,
                name: row.get(1)?,
                advertiser_name: row.get(2)?,
                bid: row.get(3)?,
                budget: row.get(4)?,
                start_date: row.get(5)?,
                end_date: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })?;

        let mut campaigns = Vec::new();
        for r in rows {
            campaigns.push(r?);
        }
        Ok(campaigns)
    }
}

impl AnalyticsStore for SqliteStore {
    fn latest_watermark(&mut self, event_type: EventType) -> Result<Option<Watermark>> {
        let wm = self
            .conn
            .query_row(
                "SELECT created_at, event_id FROM ad_events
                 WHERE event_type = ?1
                 ORDER BY created_at DESC, event_id DESC
                 LIMIT 1",
                [event_type.label()],
                |row| {
                    Ok(Watermark {
                        created_at: row.get(0)?,
                        event_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(wm)
    }

    fn event_ids_since(
        &mut self,
        event_type: EventType,
        since: NaiveDateTime,
    ) -> Result<HashSet<i64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT event_id FROM ad_events WHERE event_type = ?1 AND created_at >= ?2",
        )?;
        let ids = stmt
            .query_map(rusqlite::params![event_type.label(), since], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<i64>, _>>()?;
        Ok(ids)
    }

    fn append_events(&mut self, events: &[AdEvent]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO ad_events (event_id, campaign_id, event_type, created_at, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for e in events {
                stmt.execute(rusqlite::params![
                    e.event_id,
                    e.campaign_id,
                    e.event_type.label(),
                    e.created_at,
                    e.inserted_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn truncate(&mut self, table: Table) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", table.name()), [])
            .with_context(|| format!("failed to truncate {}", table))?;
        Ok(())
    }

    fn replace_dimension(&mut self, rows: &[CampaignDimension]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM campaign_dimension", [])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO campaign_dimension
                 (campaign_id, campaign_name, advertiser_name, bid_amount, budget_amount,
                  duration_days, is_active, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for d in rows {
                stmt.execute(rusqlite::params![
                    d.campaign_id,
                    d.campaign_name,
                    d.advertiser_name,
                    d.bid_amount,
                    d.budget_amount,
                    d.duration_days,
                    d.is_active,
                    d.updated_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_dimension(&mut self) -> Result<Vec<CampaignDimension>> {
        let mut stmt = self.conn.prepare(
            "SELECT campaign_id, campaign_name, advertiser_name, bid_amount, budget_amount,
                    duration_days, is_active, updated_at
             FROM campaign_dimension ORDER BY campaign_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CampaignDimension {
                    campaign_id: row.get(0)?,
                    campaign_name: row.get(1)?,
                    advertiser_name: row.get(2)?,
                    bid_amount: row.get(3)?,
                    budget_amount: row.get(4)?,
                    duration_days: row.get(5)?,
                    is_active: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn event_counts(&mut self) -> Result<Vec<CampaignEventCounts>> {
        let mut stmt = self.conn.prepare(
            "SELECT campaign_id,
                    SUM(CASE WHEN event_type = 'impression' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN event_type = 'click' THEN 1 ELSE 0 END)
             FROM ad_events
             GROUP BY campaign_id
             ORDER BY campaign_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CampaignEventCounts {
                    campaign_id: row.get(0)?,
                    impressions: row.get::<_, i64>(1)? as u64,
                    clicks: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn replace_metrics(&mut self, rows: &[CampaignPerformance]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM daily_campaign_performance", [])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO daily_campaign_performance
                 (campaign_id, impressions_count, clicks_count, spend_amount, ctr, cpm)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for m in rows {
                stmt.execute(rusqlite::params![
                    m.campaign_id,
                    m.impressions_count as i64,
                    m.clicks_count as i64,
                    m.spend_amount,
                    m.ctr,
                    m.cpm,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{seed_campaign, seed_event, ts};
    use chrono::Duration;

    fn setup() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.init().unwrap();
        store
    }

    fn ad_event(id: i64, event_type: EventType, secs: i64) -> AdEvent {
        AdEvent {
            event_id: id,
            campaign_id: 1,
            event_type,
            created_at: ts(secs),
            inserted_at: ts(3_000),
        }
    }

    #[test]
    fn test_fetch_events_since_is_inclusive() {
        let mut store = setup();
        seed_event(&store, EventType::Impression, 1, 1, ts(9));
        seed_event(&store, EventType::Impression, 2, 1, ts(10));
        seed_event(&store, EventType::Impression, 3, 1, ts(10) + Duration::milliseconds(250));
        seed_event(&store, EventType::Impression, 4, 1, ts(20));

        let all = store.fetch_events(EventType::Impression, None).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].id, 1);

        let rest = store
            .fetch_events(EventType::Impression, Some(ts(10)))
            .unwrap();
        let ids: Vec<i64> = rest.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(rest[1].created_at, ts(10) + Duration::milliseconds(250));

        assert!(store
            .fetch_events(EventType::Impression, Some(ts(21)))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_fetch_events_reads_only_its_table() {
        let mut store = setup();
        seed_event(&store, EventType::Impression, 1, 1, ts(10));
        seed_event(&store, EventType::Click, 1, 1, ts(11));

        let clicks = store.fetch_events(EventType::Click, None).unwrap();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].event_type, EventType::Click);
        assert_eq!(clicks[0].created_at, ts(11));
    }

    #[test]
    fn test_latest_watermark_empty_and_populated() {
        let mut store = setup();
        assert_eq!(store.latest_watermark(EventType::Click).unwrap(), None);

        store
            .append_events(&[
                ad_event(7, EventType::Click, 50),
                ad_event(3, EventType::Click, 60),
                ad_event(9, EventType::Click, 60),
                ad_event(100, EventType::Impression, 90),
            ])
            .unwrap();

        let wm = store.latest_watermark(EventType::Click).unwrap().unwrap();
        assert_eq!(
            wm,
            Watermark {
                created_at: ts(60),
                event_id: 9,
            }
        );
        let wm = store.latest_watermark(EventType::Impression).unwrap().unwrap();
        assert_eq!(wm.event_id, 100);
    }

    #[test]
    fn test_event_ids_since_filters_type_and_time() {
        let mut store = setup();
        store
            .append_events(&[
                ad_event(1, EventType::Click, 50),
                ad_event(2, EventType::Click, 60),
                ad_event(3, EventType::Click, 61),
                ad_event(4, EventType::Impression, 60),
            ])
            .unwrap();

        let ids = store.event_ids_since(EventType::Click, ts(60)).unwrap();
        assert_eq!(ids, HashSet::from([2, 3]));
        assert!(store
            .event_ids_since(EventType::Impression, ts(61))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_fetch_campaigns_joins_advertiser() {
        let mut store = setup();
        seed_campaign(&store, 1, "Spring Sale", "Acme", 0.02, ts(0), ts(86_400 * 10));

        let campaigns = store.fetch_campaigns().unwrap();
        assert_eq!(campaigns.len(), 1);
        assert_eq!(campaigns[0].advertiser_name, "Acme");
        assert!((campaigns[0].bid - 0.02).abs() < 1e-12);
        assert_eq!(campaigns[0].end_date, ts(86_400 * 10));
    }

    #[test]
    fn test_replace_dimension_discards_previous_rows() {
        let mut store = setup();
        let row = |id: i64| CampaignDimension {
            campaign_id: id,
            campaign_name: format!("c{}", id),
            advertiser_name: "Acme".to_string(),
            bid_amount: 0.5,
            budget_amount: 100.0,
            duration_days: 3,
            is_active: true,
            updated_at: ts(0),
        };

        store.replace_dimension(&[row(1), row(2)]).unwrap();
        store.replace_dimension(&[row(2), row(3)]).unwrap();

        let loaded = store.load_dimension().unwrap();
        let ids: Vec<i64> = loaded.iter().map(|d| d.campaign_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(loaded[0].is_active);
    }

    #[test]
    fn test_event_counts_by_campaign() {
        let mut store = setup();
        let mut events = vec![
            ad_event(1, EventType::Impression, 1),
            ad_event(2, EventType::Impression, 2),
            ad_event(1, EventType::Click, 3),
        ];
        events.push(AdEvent {
            campaign_id: 2,
            ..ad_event(3, EventType::Impression, 4)
        });
        store.append_events(&events).unwrap();

        let counts = store.event_counts().unwrap();
        assert_eq!(
            counts,
            vec![
                CampaignEventCounts {
                    campaign_id: 1,
                    impressions: 2,
                    clicks: 1,
                },
                CampaignEventCounts {
                    campaign_id: 2,
                    impressions: 1,
                    clicks: 0,
                },
            ]
        );
    }

    #[test]
    fn test_truncate_and_missing_table() {
        let mut store = setup();
        store.append_events(&[ad_event(1, EventType::Click, 1)]).unwrap();
        store.truncate(Table::AdEvents).unwrap();
        assert_eq!(store.count_rows(Table::AdEvents).unwrap(), 0);

        store.conn().execute_batch("DROP TABLE campaign_dimension").unwrap();
        assert!(store.truncate(Table::CampaignDimension).is_err());
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.init().unwrap();
            store.append_events(&[ad_event(1, EventType::Click, 1)]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count_rows(Table::AdEvents).unwrap(), 1);
        assert_eq!(store.load_events().unwrap()[0].event_type, EventType::Click);
    }
}
