use anyhow::{Context, Result};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read once at startup from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL; without one the in-memory store is used.
    pub database_url: Option<String>,
    pub port: u16,
    pub request_timeout: Duration,
    /// Upper bound on concurrent enrollment lookups per dashboard request.
    pub dashboard_concurrency: usize,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let timeout_secs: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?;
        Ok(Self {
            database_url,
            port: parse_or(&lookup, "PORT", 8081)?,
            request_timeout: Duration::from_secs(timeout_secs),
            dashboard_concurrency: parse_or(&lookup, "DASHBOARD_CONCURRENCY", 8)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid {key}: {raw:?}")),
    }
}
