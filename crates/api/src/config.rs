//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};

use huachuca_auth::oauth_state::{DEFAULT_STATE_TTL, DEFAULT_SWEEP_INTERVAL};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Postgres adapters when true, in-memory maps otherwise.
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub oauth_state_ttl: Duration,
    pub oauth_sweep_interval: Duration,
    /// Create an organization + owner for unknown emails on first login.
    pub auto_provision_owners: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            use_persistent_stores: false,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            oauth_state_ttl: DEFAULT_STATE_TTL,
            oauth_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            auto_provision_owners: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:8080")?;

        let use_persistent_stores = parse_bool(&lookup, "USE_PERSISTENT_STORES", false)?;
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if use_persistent_stores && database_url.is_none() {
            bail!("USE_PERSISTENT_STORES=true requires DATABASE_URL");
        }

        Ok(Self {
            bind_addr,
            use_persistent_stores,
            database_url,
            db_max_connections: parse_u64(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS.into())?
                .try_into()
                .context("DB_MAX_CONNECTIONS is too large")?,
            oauth_state_ttl: parse_secs(&lookup, "OAUTH_STATE_TTL_SECS", DEFAULT_STATE_TTL)?,
            oauth_sweep_interval: parse_secs(
                &lookup,
                "OAUTH_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL,
            )?,
            auto_provision_owners: parse_bool(&lookup, "AUTO_PROVISION_OWNERS", false)?,
        })
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> anyhow::Result<bool> {
    match lookup(key) {
        None => Ok(default),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => bail!("{key} must be a boolean, got '{other}'"),
        },
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> anyhow::Result<u64> {
    match lookup(key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer")),
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> anyhow::Result<Duration> {
    let secs = parse_u64(lookup, key, default.as_secs())?;
    if secs == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}
