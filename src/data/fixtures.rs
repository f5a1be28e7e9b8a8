//! Seeding helpers for tests that drive a `SqliteStore` as the source.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::types::EventType;

use super::store::SqliteStore;

/// `2024-03-01 00:00:00` plus `secs` seconds.
pub fn ts(secs: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::seconds(secs)
}

pub fn seed_event(
    store: &SqliteStore,
    event_type: EventType,
    id: i64,
    campaign_id: i64,
    created_at: NaiveDateTime,
) {
    store
        .conn()
        .execute(
            &format!(
                "INSERT INTO {} (id, campaign_id, created_at) VALUES (?1, ?2, ?3)",
                event_type.source_table()
            ),
            rusqlite::params![id, campaign_id, created_at],
        )
        .unwrap();
}

/// Insert a campaign and, if missing, an advertiser named `advertiser`.
pub fn seed_campaign(
    store: &SqliteStore,
    id: i64,
    name: &str,
    advertiser: &str,
    bid: f64,
    start_date: NaiveDateTime,
    end_date: NaiveDateTime,
) {
    let conn = store.conn();
    conn.execute(
        "INSERT INTO advertiser (name)
         SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM advertiser WHERE name = ?1)",
        [advertiser],
    )
    .unwrap();
    let advertiser_id: i64 = conn
        .query_row("SELECT id FROM advertiser WHERE name = ?1", [advertiser], |row| {
            row.get(0)
        })
        .unwrap();
    conn.execute(
        "INSERT INTO campaign
         (id, name, bid, budget, advertiser_id, start_date, end_date, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![id, name, bid, 1000.0, advertiser_id, start_date, end_date, start_date],
    )
    .unwrap();
}
