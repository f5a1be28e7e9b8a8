pub mod clickhouse;
pub mod pg;
pub mod schema;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;

pub use clickhouse::ClickHouseStore;
pub use pg::PostgresSource;
pub use store::{AnalyticsStore, SourceStore, SqliteStore};
