//! Connection settings for both stores, read from the environment.

use std::time::Duration;

use crate::error::PipelineError;

/// Postgres (source) connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
        }
    }
}

/// ClickHouse (analytics) connection settings. Talks to the HTTP interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl ClickHouseConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            database: "default".to_string(),
            user: "default".to_string(),
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub source: PostgresConfig,
    pub analytics: ClickHouseConfig,
}

impl Config {
    /// Read settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, PipelineError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(v) = lookup("PG_HOST") {
            cfg.source.host = v;
        }
        if let Some(v) = lookup("PG_PORT") {
            cfg.source.port = parse_num("PG_PORT", &v)?;
        }
        if let Some(v) = lookup("PG_DATABASE") {
            cfg.source.database = v;
        }
        if let Some(v) = lookup("PG_USER") {
            cfg.source.user = v;
        }
        cfg.source.password = lookup("PG_PASSWORD");

        if let Some(v) = lookup("CH_HOST") {
            cfg.analytics.host = v;
        }
        if let Some(v) = lookup("CH_PORT") {
            cfg.analytics.port = parse_num("CH_PORT", &v)?;
        }
        if let Some(v) = lookup("CH_DATABASE") {
            cfg.analytics.database = v;
        }
        if let Some(v) = lookup("CH_USER") {
            cfg.analytics.user = v;
        }
        cfg.analytics.password = lookup("CH_PASSWORD");
        if let Some(v) = lookup("CH_TIMEOUT_SECS") {
            cfg.analytics.timeout = Duration::from_secs(parse_num("CH_TIMEOUT_SECS", &v)?);
        }

        Ok(cfg)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, PipelineError> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("{} must be a number, got '{}'", key, value)))
}
