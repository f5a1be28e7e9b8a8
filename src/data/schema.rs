//! DDL for the embedded SQLite rendition of both stores.
//!
//! Mirrors the Postgres source tables and the ClickHouse analytical tables
//! column for column. Timestamps are stored as `YYYY-MM-DD HH:MM:SS[.f]` text.

pub const CREATE_SOURCE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS advertiser (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS campaign (
    id            INTEGER PRIMARY KEY,
    name          TEXT NOT NULL,
    bid           REAL NOT NULL,
    budget        REAL NOT NULL,
    advertiser_id INTEGER NOT NULL REFERENCES advertiser(id),
    start_date    TEXT NOT NULL,
    end_date      TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS impressions (
    id          INTEGER PRIMARY KEY,
    campaign_id INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clicks (
    id          INTEGER PRIMARY KEY,
    campaign_id INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);
";

pub const CREATE_ANALYTICS_TABLES: &str = "
CREATE TABLE IF NOT EXISTS ad_events (
    event_id    INTEGER NOT NULL,
    campaign_id INTEGER NOT NULL,
    event_type  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    inserted_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS campaign_dimension (
    campaign_id     INTEGER NOT NULL,
    campaign_name   TEXT NOT NULL,
    advertiser_name TEXT NOT NULL,
    bid_amount      REAL NOT NULL,
    budget_amount   REAL NOT NULL,
    duration_days   INTEGER NOT NULL,
    is_active       INTEGER NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_campaign_performance (
    campaign_id       INTEGER NOT NULL,
    impressions_count INTEGER NOT NULL,
    clicks_count      INTEGER NOT NULL,
    spend_amount      REAL NOT NULL,
    ctr               REAL NOT NULL,
    cpm               REAL NOT NULL
);
";

pub const CREATE_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_impressions_cursor ON impressions(created_at, id);
CREATE INDEX IF NOT EXISTS idx_clicks_cursor ON clicks(created_at, id);
CREATE INDEX IF NOT EXISTS idx_ad_events_cursor ON ad_events(event_type, created_at, event_id);
";

// ---------------------------------------------------------------------------
// Campaign snapshot query shared by the SQL sources.
// ---------------------------------------------------------------------------

/// Campaigns joined to their advertiser, ordered by id.
pub const SQLITE_CAMPAIGNS: &str = "
SELECT c.id, c.name, a.name, c.bid, c.budget, c.start_date, c.end_date, c.updated_at
FROM campaign c
JOIN advertiser a ON c.advertiser_id = a.id
ORDER BY c.id
";

/// Postgres flavour: normalizes ids to bigint, money to float8, dates to timestamp.
pub const PG_CAMPAIGNS: &str = "
SELECT c.id::bigint, c.name, a.name, c.bid::float8, c.budget::float8,
       c.start_date::timestamp, c.end_date::timestamp, c.updated_at::timestamp
FROM campaign c
JOIN advertiser a ON c.advertiser_id = a.id
ORDER BY c.id
";
