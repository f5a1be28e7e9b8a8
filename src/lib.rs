//! Incremental sync of ad events and campaign attributes from a transactional
//! Postgres store into ClickHouse, followed by a full recomputation of
//! per-campaign performance metrics.

pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod types;

pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{Pipeline, RunOptions};
pub use report::RunSummary;
