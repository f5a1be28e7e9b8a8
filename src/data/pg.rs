use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use postgres::{Client, NoTls, Row};
use tracing::{debug, info};

use crate::config::PostgresConfig;
use crate::types::{EventType, SourceCampaign, SourceEvent};

use super::schema;
use super::store::SourceStore;

// ---------------------------------------------------------------------------
// PostgresSource — read-only access to the transactional tables
// ---------------------------------------------------------------------------

/// Pins the session time zone, so `::timestamp` casts render UTC wall time
/// and compare against the pipeline's UTC clock.
const SESSION_OPTIONS: &str = "-c TimeZone=UTC";

/// Blocking Postgres client over the `impressions`, `clicks`, `campaign`
/// and `advertiser` tables.
pub struct PostgresSource {
    client: Client,
}

impl PostgresSource {
    /// Connect and verify the session with a trivial query.
    pub fn connect(cfg: &PostgresConfig) -> Result<Self> {
        let mut client = client_config(cfg)
            .connect(NoTls)
            .with_context(|| {
                format!("failed to connect to Postgres at {}:{}", cfg.host, cfg.port)
            })?;
        client
            .simple_query("SELECT 1")
            .context("Postgres connection check failed")?;

        info!(host = %cfg.host, database = %cfg.database, "connected to Postgres");
        Ok(Self { client })
    }
}

fn client_config(cfg: &PostgresConfig) -> postgres::Config {
    let mut pg = postgres::Config::new();
    pg.host(&cfg.host)
        .port(cfg.port)
        .dbname(&cfg.database)
        .user(&cfg.user)
        .options(SESSION_OPTIONS);
    if let Some(ref password) = cfg.password {
        pg.password(password);
    }
    pg
}

impl SourceStore for PostgresSource {
    fn fetch_events(
        &mut self,
        event_type: EventType,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<SourceEvent>> {
        let table = event_type.source_table();
        let rows = match since {
            Some(since) => {
                let sql = format!(
                    "SELECT id::bigint, campaign_id::bigint, created_at::timestamp
                     FROM {}
                     WHERE created_at >= $1::timestamp
                     ORDER BY created_at, id",
                    table
                );
                self.client.query(sql.as_str(), &[&since])
            }
            None => {
                let sql = format!(
                    "SELECT id::bigint, campaign_id::bigint, created_at::timestamp
                     FROM {}
                     ORDER BY created_at, id",
                    table
                );
                self.client.query(sql.as_str(), &[])
            }
        }
        .with_context(|| format!("failed to extract rows from {}", table))?;

        let events = rows
            .iter()
            .map(|row| map_event(row, event_type))
            .collect::<Result<Vec<_>>>()?;

        debug!(table, rows = events.len(), "extracted source events");
        Ok(events)
    }

    fn fetch_campaigns(&mut self) -> Result<Vec<SourceCampaign>> {
        let rows = self
            .client
            .query(schema::PG_CAMPAIGNS, &[])
            .context("failed to read campaigns")?;

        rows.iter().map(map_campaign).collect()
    }
}

fn map_event(row: &Row, event_type: EventType) -> Result<SourceEvent> {
    Ok(SourceEvent {
        id: row.try_get(0)?,
        campaign_id: row.try_get(1)?,
        event_type,
        created_at: row.try_get(2)?,
    })
}

fn map_campaign(row: &Row) -> Result<SourceCampaign> {
    Ok(SourceCampaign {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        advertiser_name: row.try_get(2)?,
        bid: row.try_get(3)?,
        budget: row.try_get(4)?,
        start_date: row.try_get(5)?,
        end_date: row.try_get(6)?,
        updated_at: row.try_get(7)?,
    })
}
