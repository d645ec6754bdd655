//! Process configuration read from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `BIND_ADDR` | `0.0.0.0:8080` |
//! | `USE_PERSISTENT_STORES` | `false` |
//! | `DATABASE_URL` | required when persistent |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `SEED_DEMO_EVENTS` | `true` in-memory, `false` persistent |
//!
//! `LOG_FORMAT` and `RUST_LOG` are read by `ticketqueen-observability`.

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),

    #[error("invalid value `{value}` for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which inventory store backs the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres { url: String, max_connections: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    pub seed_demo_events: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            var: "BIND_ADDR",
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        let use_persistent = parse_flag("USE_PERSISTENT_STORES", lookup("USE_PERSISTENT_STORES"))?.unwrap_or(false);

        let store = if use_persistent {
            let url = lookup("DATABASE_URL")
                .filter(|u| !u.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
                None => DEFAULT_MAX_CONNECTIONS,
                Some(raw) => match raw.trim().parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    Ok(_) => {
                        return Err(ConfigError::Invalid {
                            var: "DATABASE_MAX_CONNECTIONS",
                            value: raw,
                            reason: "must be at least 1".to_string(),
                        });
                    }
                    Err(e) => {
                        return Err(ConfigError::Invalid {
                            var: "DATABASE_MAX_CONNECTIONS",
                            reason: e.to_string(),
                            value: raw,
                        });
                    }
                },
            };
            StoreConfig::Postgres { url, max_connections }
        } else {
            StoreConfig::InMemory
        };

        let seed_demo_events = parse_flag("SEED_DEMO_EVENTS", lookup("SEED_DEMO_EVENTS"))?.unwrap_or(!use_persistent);

        Ok(Self {
            bind_addr,
            store,
            seed_demo_events,
        })
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.store, StoreConfig::Postgres { .. })
    }
}

fn parse_flag(var: &'static str, raw: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}
