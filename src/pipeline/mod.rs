pub mod dimension;
pub mod extract;
pub mod load;
pub mod metrics;
pub mod watermark;

pub use dimension::{build_dimension, refresh_dimension};
pub use extract::{extract_events, Extraction};
pub use load::{load_events, LoadOutcome};
pub use metrics::{campaign_performance, compute_metrics, recompute_metrics};
pub use watermark::{read_watermarks, SyncCursor, Watermarks};

use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::data::{AnalyticsStore, ClickHouseStore, PostgresSource, SourceStore};
use crate::error::{PipelineError, Step, StoreKind};
use crate::report::{ResetFailure, RunSummary};
use crate::types::{CampaignPerformance, EventType, Table};

/// Flags controlling one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Truncate `ad_events` and `campaign_dimension` before syncing.
    pub full_refresh: bool,
    /// Stop after the dimension refresh.
    pub no_metrics_update: bool,
}

/// Result of the event sync step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSync {
    pub impressions: usize,
    pub clicks: usize,
    pub load: LoadOutcome,
}

/// Tables cleared by a full refresh, in order.
const RESET_TABLES: [Table; 2] = [Table::CampaignDimension, Table::AdEvents];

/// Sequences the sync steps over one source and one analytics store.
///
/// The pipeline owns both stores; they are released when it is dropped,
/// whichever way the run ends.
pub struct Pipeline<S, A> {
    source: S,
    analytics: A,
    clock: fn() -> NaiveDateTime,
}

impl Pipeline<PostgresSource, ClickHouseStore> {
    /// Open both connections. Either failure is fatal before any step runs.
    pub fn connect(cfg: &Config) -> Result<Self, PipelineError> {
        let source = PostgresSource::connect(&cfg.source)
            .map_err(PipelineError::connect(StoreKind::Source))?;
        let analytics = ClickHouseStore::connect(&cfg.analytics)
            .map_err(PipelineError::connect(StoreKind::Analytics))?;
        Ok(Self::new(source, analytics))
    }
}

impl<S: SourceStore, A: AnalyticsStore> Pipeline<S, A> {
    pub fn new(source: S, analytics: A) -> Self {
        Self {
            source,
            analytics,
            clock: || Utc::now().naive_utc(),
        }
    }

    /// Replace the wall clock used for `inserted_at` and `is_active`.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn analytics(&self) -> &A {
        &self.analytics
    }

    /// Best-effort truncate of the analytical tables. Each table is attempted
    /// regardless of earlier failures; failures are returned, not raised.
    pub fn reset(&mut self) -> Vec<ResetFailure> {
        info!("starting cleanup of analytical tables");
        let mut failures = Vec::new();
        for table in RESET_TABLES {
            if let Err(e) = self.analytics.truncate(table) {
                warn!(%table, "error cleaning up table: {:#}", e);
                failures.push(ResetFailure {
                    table,
                    error: format!("{:#}", e),
                });
            }
        }
        if failures.is_empty() {
            info!("analytical tables cleanup completed");
        }
        failures
    }

    /// Extract everything past the current watermarks and append it to the event log.
    pub fn sync_events(&mut self) -> Result<EventSync> {
        let marks = read_watermarks(&mut self.analytics)?;
        let extraction = extract_events(&mut self.source, &marks)?;
        let load = load_events(&mut self.analytics, &extraction.events, (self.clock)())?;

        match load {
            LoadOutcome::Empty => info!("no new records to sync"),
            LoadOutcome::Appended(n) => info!(rows = n, "successfully synced {} records", n),
        }

        Ok(EventSync {
            impressions: extraction.count(EventType::Impression),
            clicks: extraction.count(EventType::Click),
            load,
        })
    }

    pub fn refresh_dimension(&mut self) -> Result<usize> {
        let now = (self.clock)();
        let n = refresh_dimension(&mut self.source, &mut self.analytics, now)?;
        info!(rows = n, "successfully refreshed {} campaign dimension rows", n);
        Ok(n)
    }

    pub fn recompute_metrics(&mut self) -> Result<Vec<CampaignPerformance>> {
        let rows = recompute_metrics(&mut self.analytics)?;
        info!(rows = rows.len(), "successfully updated daily_campaign_performance");
        Ok(rows)
    }

    /// reset (optional) -> sync events -> refresh dimension -> metrics (optional).
    ///
    /// The first failing step aborts the run; nothing is rolled back.
    pub fn run(&mut self, opts: &RunOptions) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        if opts.full_refresh {
            summary.reset_failures = self.reset();
        }

        let sync = self
            .sync_events()
            .map_err(PipelineError::step(Step::SyncEvents))?;
        summary.impressions_synced = sync.impressions;
        summary.clicks_synced = sync.clicks;
        summary.load = Some(sync.load);

        summary.dimension_rows = self
            .refresh_dimension()
            .map_err(PipelineError::step(Step::RefreshDimension))?;

        if opts.no_metrics_update {
            info!("skipping metrics update");
        } else {
            let rows = self
                .recompute_metrics()
                .map_err(PipelineError::step(Step::RecomputeMetrics))?;
            summary.metrics = Some(rows);
        }

        Ok(summary)
    }
}
