//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::AggregateKind;
use messaging::topology::DEFAULT_EXCHANGE_PREFIX;
use query::{CircuitBreakerConfig, PeerPolicy};
use thiserror::Error;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SERVICES: unknown context `{0}`")]
    UnknownService(String),

    #[error("REGISTRY: expected `name=url`, got `{0}`")]
    RegistryEntry(String),
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human output
/// - `DATABASE_URL`: write store; in-memory when unset
/// - `READ_DATABASE_URL`: read store; in-memory when unset
/// - `SERVICES`: comma separated contexts to host (default all four)
/// - `REGISTRY`: `member-service=http://host:port,...`
/// - `PEER_TIMEOUT_MS` (default 2000)
/// - `BREAKER_FAILURE_THRESHOLD` (default 5), `BREAKER_COOLDOWN_MS` (default 30000)
/// - `OUTBOX_RELAY_INTERVAL_MS` (default 1000, `0` disables the relay)
/// - `EXCHANGE_PREFIX` (default `library`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub read_database_url: Option<String>,
    pub services: Vec<AggregateKind>,
    pub registry: Vec<(String, String)>,
    pub peer_timeout: Duration,
    pub breaker_failure_threshold: usize,
    pub breaker_cooldown: Duration,
    pub outbox_relay_interval: Option<Duration>,
    pub exchange_prefix: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        let services = match var("SERVICES") {
            Some(list) => parse_services(&list)?,
            None => defaults.services,
        };
        let registry = match var("REGISTRY") {
            Some(list) => parse_registry(&list)?,
            None => defaults.registry,
        };
        let outbox_relay_interval = match millis("OUTBOX_RELAY_INTERVAL_MS") {
            Some(interval) if interval.is_zero() => None,
            Some(interval) => Some(interval),
            None => defaults.outbox_relay_interval,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT") {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: var("DATABASE_URL"),
            read_database_url: var("READ_DATABASE_URL"),
            services,
            registry,
            peer_timeout: millis("PEER_TIMEOUT_MS").unwrap_or(defaults.peer_timeout),
            breaker_failure_threshold: var("BREAKER_FAILURE_THRESHOLD")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.breaker_failure_threshold),
            breaker_cooldown: millis("BREAKER_COOLDOWN_MS").unwrap_or(defaults.breaker_cooldown),
            outbox_relay_interval,
            exchange_prefix: var("EXCHANGE_PREFIX").unwrap_or(defaults.exchange_prefix),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL under which this process reaches itself.
    pub fn self_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
            host => host,
        };
        format!("http://{host}:{}", self.port)
    }

    pub fn peer_policy(&self) -> PeerPolicy {
        PeerPolicy {
            timeout: self.peer_timeout,
            breaker: CircuitBreakerConfig {
                failure_threshold: self.breaker_failure_threshold.max(1),
                cooldown: self.breaker_cooldown,
                ..CircuitBreakerConfig::default()
            },
        }
    }

    /// Whether this process serves `kind`'s routes and read model.
    pub fn hosts(&self, kind: AggregateKind) -> bool {
        self.services.contains(&kind)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            read_database_url: None,
            services: AggregateKind::ALL.to_vec(),
            registry: Vec::new(),
            peer_timeout: Duration::from_secs(2),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
            outbox_relay_interval: Some(Duration::from_secs(1)),
            exchange_prefix: DEFAULT_EXCHANGE_PREFIX.to_string(),
        }
    }
}

fn parse_services(list: &str) -> Result<Vec<AggregateKind>, ConfigError> {
    let mut services = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let kind: AggregateKind = name
            .parse()
            .map_err(|_| ConfigError::UnknownService(name.to_string()))?;
        if !services.contains(&kind) {
            services.push(kind);
        }
    }
    Ok(services)
}

fn parse_registry(list: &str) -> Result<Vec<(String, String)>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                Ok((name.trim().to_string(), url.trim().to_string()))
            }
            _ => Err(ConfigError::RegistryEntry(entry.to_string())),
        })
        .collect()
}
