//! ClickHouse adapter over the HTTP interface.
//!
//! Rows travel as `JSONEachRow`: one JSON object per line, both for reads
//! (`... FORMAT JSONEachRow` appended to the query) and for bulk inserts
//! (the statement goes in the `query` parameter, rows in the body).

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ClickHouseConfig;
use crate::types::{
    AdEvent, CampaignDimension, CampaignEventCounts, CampaignPerformance, EventType, Table,
    Watermark,
};

use super::store::AnalyticsStore;

const EVENT_COLUMNS: &str = "event_id, campaign_id, event_type, created_at, inserted_at";
const DIMENSION_COLUMNS: &str = "campaign_id, campaign_name, advertiser_name, bid_amount, \
                                 budget_amount, duration_days, is_active, updated_at";
const METRIC_COLUMNS: &str = "campaign_id, impressions_count, clicks_count, spend_amount, ctr, cpm";

// ---------------------------------------------------------------------------
// Wire rows
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct EventRow {
    event_id: i64,
    campaign_id: i64,
    event_type: String,
    #[serde(with = "ch_datetime")]
    created_at: NaiveDateTime,
    #[serde(with = "ch_datetime")]
    inserted_at: NaiveDateTime,
}

impl From<&AdEvent> for EventRow {
    fn from(e: &AdEvent) -> Self {
        Self {
            event_id: e.event_id,
            campaign_id: e.campaign_id,
            event_type: e.event_type.label().to_string(),
            created_at: e.created_at,
            inserted_at: e.inserted_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CursorRow {
    #[serde(with = "ch_datetime")]
    created_at: NaiveDateTime,
    event_id: i64,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    event_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DimensionRow {
    campaign_id: i64,
    campaign_name: String,
    advertiser_name: String,
    bid_amount: f64,
    budget_amount: f64,
    duration_days: i64,
    #[serde(with = "ch_bool")]
    is_active: bool,
    #[serde(with = "ch_datetime")]
    updated_at: NaiveDateTime,
}

impl From<&CampaignDimension> for DimensionRow {
    fn from(d: &CampaignDimension) -> Self {
        Self {
            campaign_id: d.campaign_id,
            campaign_name: d.campaign_name.clone(),
            advertiser_name: d.advertiser_name.clone(),
            bid_amount: d.bid_amount,
            budget_amount: d.budget_amount,
            duration_days: d.duration_days,
            is_active: d.is_active,
            updated_at: d.updated_at,
        }
    }
}

impl From<DimensionRow> for CampaignDimension {
    fn from(r: DimensionRow) -> Self {
        Self {
            campaign_id: r.campaign_id,
            campaign_name: r.campaign_name,
            advertiser_name: r.advertiser_name,
            bid_amount: r.bid_amount,
            budget_amount: r.budget_amount,
            duration_days: r.duration_days,
            is_active: r.is_active,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    campaign_id: i64,
    impressions: u64,
    clicks: u64,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Sends statements to ClickHouse.
pub trait Executor {
    /// Run a statement whose result is discarded.
    fn execute(&self, sql: &str) -> Result<()>;

    /// Run a query and return the raw response body.
    fn query(&self, sql: &str) -> Result<String>;

    /// Run an `INSERT ... FORMAT` statement with `body` as its data.
    fn insert(&self, statement: &str, body: &str) -> Result<()>;
}

/// Executor over the HTTP interface.
pub struct HttpExecutor {
    agent: ureq::Agent,
    url: String,
    database: String,
    user: String,
    password: Option<String>,
}

impl HttpExecutor {
    pub fn new(cfg: &ClickHouseConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(cfg.timeout).build(),
            url: cfg.url(),
            database: cfg.database.clone(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
        }
    }

    fn request(&self) -> ureq::Request {
        let req = self
            .agent
            .post(&self.url)
            .query("database", &self.database)
            .query("output_format_json_quote_64bit_integers", "0")
            .query("date_time_input_format", "best_effort")
            .set("X-ClickHouse-User", &self.user);
        match self.password {
            Some(ref password) => req.set("X-ClickHouse-Key", password),
            None => req,
        }
    }
}

impl Executor for HttpExecutor {
    fn execute(&self, sql: &str) -> Result<()> {
        self.request()
            .send_string(sql)
            .map_err(describe_error)
            .with_context(|| format!("failed to execute: {}", truncate_sql(sql)))?;
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<String> {
        self.request()
            .send_string(sql)
            .map_err(describe_error)
            .with_context(|| format!("failed to query: {}", truncate_sql(sql)))?
            .into_string()
            .context("failed to read ClickHouse response body")
    }

    fn insert(&self, statement: &str, body: &str) -> Result<()> {
        self.request()
            .query("query", statement)
            .send_string(body)
            .map_err(describe_error)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ClickHouseStore
// ---------------------------------------------------------------------------

pub struct ClickHouseStore<E = HttpExecutor> {
    exec: E,
}

impl ClickHouseStore {
    /// Build the HTTP client and check the server answers.
    pub fn connect(cfg: &ClickHouseConfig) -> Result<Self> {
        let exec = HttpExecutor::new(cfg);
        exec.execute("SELECT 1")
            .with_context(|| format!("failed to reach ClickHouse at {}", exec.url))?;

        info!(url = %exec.url, database = %exec.database, "connected to ClickHouse");
        Ok(Self::with_executor(exec))
    }
}

impl<E: Executor> ClickHouseStore<E> {
    pub fn with_executor(exec: E) -> Self {
        Self { exec }
    }

    pub fn executor(&self) -> &E {
        &self.exec
    }

    /// Execute a statement whose result is discarded.
    pub fn execute(&self, sql: &str) -> Result<()> {
        self.exec.execute(sql)
    }

    fn query_rows<T: DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>> {
        let body = self.exec.query(&format!("{} FORMAT JSONEachRow", sql.trim_end()))?;
        parse_json_each_row(&body)
    }

    fn insert_rows<T: Serialize>(&self, table: &str, columns: &str, rows: &[T]) -> Result<()> {
        let body = to_json_each_row(rows)?;
        let statement = format!("INSERT INTO {} ({}) FORMAT JSONEachRow", table, columns);
        self.exec
            .insert(&statement, &body)
            .with_context(|| format!("failed to insert {} rows into {}", rows.len(), table))
    }

    /// Fill `<table>_staging` and swap it with `table` in one `EXCHANGE TABLES`.
    fn replace_table<T: Serialize>(&self, table: Table, columns: &str, rows: &[T]) -> Result<()> {
        let staging = format!("{}_staging", table.name());
        self.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} AS {}",
            staging,
            table.name()
        ))?;
        self.execute(&format!("TRUNCATE TABLE {}", staging))?;
        if !rows.is_empty() {
            self.insert_rows(&staging, columns, rows)?;
        }
        self.execute(&format!("EXCHANGE TABLES {} AND {}", table.name(), staging))?;

        // Staging now holds the previous generation.
        if let Err(e) = self.execute(&format!("TRUNCATE TABLE {}", staging)) {
            warn!(table = %staging, "failed to clear staging table: {:#}", e);
        }

        debug!(table = %table, rows = rows.len(), "replaced table contents");
        Ok(())
    }
}

impl<E: Executor> AnalyticsStore for ClickHouseStore<E> {
    fn latest_watermark(&mut self, event_type: EventType) -> Result<Option<Watermark>> {
        let sql = format!(
            "SELECT created_at, event_id FROM ad_events \
             WHERE event_type = '{}' \
             ORDER BY created_at DESC, event_id DESC \
             LIMIT 1",
            event_type.label()
        );
        let rows: Vec<CursorRow> = self.query_rows(&sql)?;
        Ok(rows.into_iter().next().map(|r| Watermark {
            created_at: r.created_at,
            event_id: r.event_id,
        }))
    }

    fn event_ids_since(
        &mut self,
        event_type: EventType,
        since: NaiveDateTime,
    ) -> Result<HashSet<i64>> {
        let sql = format!(
            "SELECT event_id FROM ad_events \
             WHERE event_type = '{}' AND created_at >= '{}'",
            event_type.label(),
            since.format(ch_datetime::FORMAT)
        );
        let rows: Vec<IdRow> = self.query_rows(&sql)?;
        Ok(rows.into_iter().map(|r| r.event_id).collect())
    }

    fn append_events(&mut self, events: &[AdEvent]) -> Result<()> {
        let rows: Vec<EventRow> = events.iter().map(EventRow::from).collect();
        self.insert_rows(Table::AdEvents.name(), EVENT_COLUMNS, &rows)
    }

    fn truncate(&mut self, table: Table) -> Result<()> {
        self.execute(&format!("TRUNCATE TABLE IF EXISTS {}", table.name()))
    }

    fn replace_dimension(&mut self, rows: &[CampaignDimension]) -> Result<()> {
        let rows: Vec<DimensionRow> = rows.iter().map(DimensionRow::from).collect();
        self.replace_table(Table::CampaignDimension, DIMENSION_COLUMNS, &rows)
    }

    fn load_dimension(&mut self) -> Result<Vec<CampaignDimension>> {
        let sql = format!(
            "SELECT {} FROM campaign_dimension ORDER BY campaign_id",
            DIMENSION_COLUMNS
        );
        let rows: Vec<DimensionRow> = self.query_rows(&sql)?;
        Ok(rows.into_iter().map(CampaignDimension::from).collect())
    }

    fn event_counts(&mut self) -> Result<Vec<CampaignEventCounts>> {
        let rows: Vec<CountRow> = self.query_rows(
            "SELECT campaign_id, \
                    countIf(event_type = 'impression') AS impressions, \
                    countIf(event_type = 'click') AS clicks \
             FROM ad_events \
             GROUP BY campaign_id \
             ORDER BY campaign_id",
        )?;
        Ok(rows
            .into_iter()
            .map(|r| CampaignEventCounts {
                campaign_id: r.campaign_id,
                impressions: r.impressions,
                clicks: r.clicks,
            })
            .collect())
    }

    fn replace_metrics(&mut self, rows: &[CampaignPerformance]) -> Result<()> {
        self.replace_table(Table::DailyCampaignPerformance, METRIC_COLUMNS, rows)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Surface the server's error text for HTTP status failures.
fn describe_error(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            anyhow!("ClickHouse returned HTTP {}: {}", code, body.trim())
        }
        other => anyhow::Error::new(other),
    }
}

fn parse_json_each_row<T: DeserializeOwned>(body: &str) -> Result<Vec<T>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("failed to parse JSONEachRow line {}", i + 1))
        })
        .collect()
}

fn to_json_each_row<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut body = String::new();
    for row in rows {
        body.push_str(&serde_json::to_string(row).context("failed to encode row")?);
        body.push('\n');
    }
    Ok(body)
}

/// First line of a statement, capped for log and error messages.
fn truncate_sql(sql: &str) -> String {
    let first_line = sql.trim().lines().next().unwrap_or("");
    if first_line.len() > 80 {
        let cut = (0..=80)
            .rev()
            .find(|&i| first_line.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &first_line[..cut])
    } else {
        first_line.to_string()
    }
}

/// `DateTime` / `DateTime64` text as ClickHouse prints and parses it.
mod ch_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Booleans go out as `UInt8`; `Bool` and `UInt8` columns are both accepted on read.
mod ch_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(u64),
    }

    pub fn serialize<S: Serializer>(v: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Raw::deserialize(d)? {
            Raw::Bool(b) => b,
            Raw::Int(n) => n != 0,
        })
    }
}
