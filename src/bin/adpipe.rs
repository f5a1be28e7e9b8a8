use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use adpipe::report::RunSummary;
use adpipe::{Config, Pipeline, RunOptions};

#[derive(Parser)]
#[command(
    name = "adpipe",
    about = "Sync ad events and campaigns from Postgres to ClickHouse and refresh metrics"
)]
struct Cli {
    /// Truncate ad_events and campaign_dimension before syncing
    #[arg(long)]
    full_refresh: bool,

    /// Skip recomputing daily_campaign_performance
    #[arg(long, alias = "no_metrics_update")]
    no_metrics_update: bool,

    /// Export the recomputed metrics to CSV
    #[arg(long)]
    csv: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("pipeline operation failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = Config::from_env()?;

    let opts = RunOptions {
        full_refresh: cli.full_refresh,
        no_metrics_update: cli.no_metrics_update,
    };

    // Both connections close when the pipeline drops, on success or error.
    let mut pipeline = Pipeline::connect(&cfg)?;
    let summary = pipeline.run(&opts)?;
    drop(pipeline);

    summary.print();

    if let Some(ref path) = cli.csv {
        match summary.metrics {
            Some(ref rows) => {
                RunSummary::export_csv(rows, &PathBuf::from(path))
                    .with_context(|| format!("failed to export CSV to {}", path))?;
                println!("Metrics exported to {}", path);
            }
            None => println!("Metrics update skipped; nothing exported to {}", path),
        }
    }

    Ok(())
}
