//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Process configuration.
///
/// | variable | default |
/// |---|---|
/// | `CREATIVES_BIND_ADDR` | `0.0.0.0:8080` |
/// | `USE_PERSISTENT_STORES` | `false` |
/// | `DATABASE_URL` | required when persistent |
/// | `WORKER_TRIGGER_URL` | unset (no-op dispatcher) |
/// | `WORKER_TRIGGER_TOKEN` | unset |
/// | `DISPATCH_TIMEOUT_MS` | `5000` |
/// | `SCAN_EVERY_N_EVENTS` | `10` |
/// | `REALTIME_BUFFER` | `256` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub bind_addr: SocketAddr,
    /// `Some` only when persistent stores are enabled.
    pub database_url: Option<String>,
    pub worker_trigger_url: Option<String>,
    pub worker_trigger_token: Option<String>,
    pub dispatch_timeout: Duration,
    pub scan_every: usize,
    pub realtime_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            worker_trigger_url: None,
            worker_trigger_token: None,
            dispatch_timeout: Duration::from_millis(5000),
            scan_every: 10,
            realtime_buffer: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let bind_addr = parse_or("CREATIVES_BIND_ADDR", get("CREATIVES_BIND_ADDR"), defaults.bind_addr)?;
        let persistent = parse_or("USE_PERSISTENT_STORES", get("USE_PERSISTENT_STORES"), false)?;

        let database_url = if persistent {
            Some(get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?)
        } else {
            None
        };

        let timeout_ms = parse_or("DISPATCH_TIMEOUT_MS", get("DISPATCH_TIMEOUT_MS"), 5000u64)?;
        let scan_every = parse_or("SCAN_EVERY_N_EVENTS", get("SCAN_EVERY_N_EVENTS"), defaults.scan_every)?;
        if scan_every == 0 {
            return Err(ConfigError::Invalid {
                key: "SCAN_EVERY_N_EVENTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let realtime_buffer = parse_or("REALTIME_BUFFER", get("REALTIME_BUFFER"), defaults.realtime_buffer)?;

        Ok(Self {
            bind_addr,
            database_url,
            worker_trigger_url: get("WORKER_TRIGGER_URL"),
            worker_trigger_token: get("WORKER_TRIGGER_TOKEN"),
            dispatch_timeout: Duration::from_millis(timeout_ms),
            scan_every,
            realtime_buffer: realtime_buffer.max(1),
        })
    }

    pub fn use_persistent_stores(&self) -> bool {
        self.database_url.is_some()
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<OrchestratorConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OrchestratorConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert!(!config.use_persistent_stores());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("CREATIVES_BIND_ADDR", "127.0.0.1:9000"),
            ("WORKER_TRIGGER_URL", "http://worker/trigger"),
            ("DISPATCH_TIMEOUT_MS", "750"),
            ("SCAN_EVERY_N_EVENTS", "4"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.worker_trigger_url.as_deref(), Some("http://worker/trigger"));
        assert_eq!(config.dispatch_timeout, Duration::from_millis(750));
        assert_eq!(config.scan_every, 4);
    }

    #[test]
    fn persistent_stores_need_database_url() {
        assert_eq!(
            load(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );

        let config = load(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/creatives"),
        ])
        .unwrap();
        assert!(config.use_persistent_stores());

        // A URL alone does not switch stores.
        let config = load(&[("DATABASE_URL", "postgres://localhost/creatives")]).unwrap();
        assert!(!config.use_persistent_stores());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            load(&[("SCAN_EVERY_N_EVENTS", "often")]),
            Err(ConfigError::Invalid { key: "SCAN_EVERY_N_EVENTS", .. })
        ));
        assert!(load(&[("SCAN_EVERY_N_EVENTS", "0")]).is_err());
    }
}
