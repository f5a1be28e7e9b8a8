use std::path::Path;

use anyhow::{Context, Result};

use crate::pipeline::LoadOutcome;
use crate::types::{CampaignPerformance, Table};

/// A table the full-refresh reset could not clear.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetFailure {
    pub table: Table,
    pub error: String,
}

/// What one pipeline run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub reset_failures: Vec<ResetFailure>,

    // Event sync
    pub impressions_synced: usize,
    pub clicks_synced: usize,
    pub load: Option<LoadOutcome>,

    pub dimension_rows: usize,

    /// `None` when the metrics step was skipped.
    pub metrics: Option<Vec<CampaignPerformance>>,
}

impl RunSummary {
    pub fn events_synced(&self) -> usize {
        self.load.map_or(0, |l| l.rows())
    }

    /// Print a formatted run summary to stdout.
    pub fn print(&self) {
        println!();
        println!("{}", "=".repeat(55));
        println!("  adpipe run summary");
        println!("{}", "=".repeat(55));
        println!();

        if !self.reset_failures.is_empty() {
            println!("  --- Reset warnings {}", "-".repeat(34));
            for f in &self.reset_failures {
                println!("  {:<28} {}", f.table.name(), f.error);
            }
            println!();
        }

        println!("  --- Events {}", "-".repeat(42));
        match self.load {
            Some(LoadOutcome::Appended(n)) => {
                println!("  Impressions:  {}", self.impressions_synced);
                println!("  Clicks:       {}", self.clicks_synced);
                println!("  Appended:     {}", n);
            }
            _ => println!("  No new records"),
        }

        println!();
        println!("  --- Dimension {}", "-".repeat(39));
        println!("  Campaigns:    {}", self.dimension_rows);

        println!();
        println!("  --- Metrics {}", "-".repeat(41));
        match self.metrics {
            None => println!("  Skipped"),
            Some(ref rows) => {
                let impressions: u64 = rows.iter().map(|r| r.impressions_count).sum();
                let clicks: u64 = rows.iter().map(|r| r.clicks_count).sum();
                let spend: f64 = rows.iter().map(|r| r.spend_amount).sum();
                println!("  Campaigns:    {}", rows.len());
                println!("  Impressions:  {}", impressions);
                println!("  Clicks:       {}", clicks);
                println!("  Spend:        {:.2}", spend);
            }
        }

        println!();
        println!("{}", "=".repeat(55));
        println!();
    }

    /// Export per-campaign metric rows to a CSV file.
    pub fn export_csv(rows: &[CampaignPerformance], path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create CSV at {}", path.display()))?;

        for r in rows {
            wtr.serialize(r).with_context(|| {
                format!("failed to write CSV row for campaign {}", r.campaign_id)
            })?;
        }

        wtr.flush().context("failed to flush CSV")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::campaign_performance;

    fn summary() -> RunSummary {
        RunSummary {
            reset_failures: vec![ResetFailure {
                table: Table::AdEvents,
                error: "connection reset".to_string(),
            }],
            impressions_synced: 100,
            clicks_synced: 5,
            load: Some(LoadOutcome::Appended(105)),
            dimension_rows: 2,
            metrics: Some(vec![
                campaign_performance(1, 0.02, 100, 5),
                campaign_performance(2, 0.5, 0, 0),
            ]),
        }
    }

    #[test]
    fn test_events_synced() {
        assert_eq!(summary().events_synced(), 105);
        assert_eq!(RunSummary::default().events_synced(), 0);
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let rows = summary().metrics.unwrap();

        RunSummary::export_csv(&rows, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        // Header + 2 data rows
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "campaign_id,impressions_count,clicks_count,spend_amount,ctr,cpm"
        );
        assert!(lines[2].starts_with("2,0,0,"));
    }

    #[test]
    fn test_print_does_not_panic() {
        summary().print();
        RunSummary::default().print();
    }
}
