//! Server configuration.

use std::env;
use std::time::Duration;
use tracing::warn;

/// Runtime configuration for the datagrid server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// Rows returned per poll/fetch page
    pub fetch_batch: usize,
    /// Sessions not polled for this long are closed by the reaper
    pub idle_timeout: Duration,
    /// How often the reaper runs
    pub reap_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5050".to_string(),
            fetch_batch: 1000,
            idle_timeout: Duration::from_secs(1800), // 30 minutes
            reap_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Read configuration from `DATAGRID_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup; unset or invalid
    /// values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let number = |key: &str, default: u64| -> u64 {
            match lookup(key) {
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(value) if value > 0 => value,
                    _ => {
                        warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
                        default
                    }
                },
                None => default,
            }
        };

        Self {
            addr: lookup("DATAGRID_ADDR").unwrap_or(defaults.addr),
            fetch_batch: number("DATAGRID_FETCH_BATCH", defaults.fetch_batch as u64) as usize,
            idle_timeout: Duration::from_secs(number(
                "DATAGRID_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )),
            reap_interval: Duration::from_secs(number(
                "DATAGRID_REAP_INTERVAL_SECS",
                defaults.reap_interval.as_secs(),
            )),
        }
    }
}
