use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

use crate::types::IndexSpec;

/// Compiled-in index table: name, strike step, default expiry.
/// `TRACKED_INDICES` narrows the set; `EXPIRY_<NAME>` overrides expiry.
const KNOWN_INDICES: &[(&str, u32, &str)] = &[
    ("NIFTY", 50, "26-06-2025"),
    ("BANKNIFTY", 100, "26-06-2025"),
    ("FINNIFTY", 50, "24-06-2025"),
    ("MIDCPNIFTY", 25, "23-06-2025"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {key}")]
    MissingEnv { key: String },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("unknown index '{name}' in TRACKED_INDICES")]
    UnknownIndex { name: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub mqtt: MqttConfig,
    pub batch: BatchConfig,
    pub subscriptions: SubscriptionConfig,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub pool_size: usize,
    pub connect_timeout: Duration,
    /// TCP keepalive probe interval on idle pooled connections.
    pub keepalive_idle: Duration,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub reconnect: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Pending-reading count that triggers an immediate flush.
    pub size: usize,
    /// Deadline for flushing a non-empty buffer.
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub index_prefix: String,
    pub token_api_url: String,
    /// Ladder half-width in strike steps, each side of ATM.
    pub strike_range: u32,
    pub indices: Vec<IndexSpec>,
}

impl SubscriptionConfig {
    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indices.iter().find(|spec| spec.name == name)
    }
}

impl AppConfig {
    /// Load the full configuration from the process environment.
    /// Database and broker credentials are mandatory; everything else
    /// falls back to compiled-in defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: parse_env("DB_PORT", 5432)?,
                user: require_env("DB_USER")?,
                password: require_env("DB_PASSWORD")?,
                dbname: env_or("DB_NAME", "market_data"),
                pool_size: parse_env("DB_POOL_SIZE", 20)?,
                connect_timeout: Duration::from_millis(parse_env("DB_CONNECT_TIMEOUT_MS", 5_000)?),
                keepalive_idle: Duration::from_millis(parse_env("DB_KEEPALIVE_IDLE_MS", 10_000)?),
            },
            mqtt: MqttConfig {
                host: env_or("MQTT_HOST", "localhost"),
                port: parse_env("MQTT_PORT", 1883)?,
                client_id: env_or("MQTT_CLIENT_ID", "ltpd"),
                username: require_env("MQTT_USERNAME")?,
                password: require_env("MQTT_PASSWORD")?,
                reconnect: Duration::from_secs(parse_env("MQTT_RECONNECT_SECS", 1)?),
            },
            batch: BatchConfig {
                size: parse_env("BATCH_SIZE", 100)?,
                interval: Duration::from_millis(parse_env("BATCH_INTERVAL_MS", 5_000)?),
            },
            subscriptions: SubscriptionConfig {
                index_prefix: env_or("INDEX_PREFIX", "index"),
                token_api_url: env_or("TOKEN_API_URL", "https://api.trado.trade/token"),
                strike_range: parse_env("STRIKE_RANGE", 5)?,
                indices: tracked_indices()?,
            },
        })
    }
}

fn tracked_indices() -> Result<Vec<IndexSpec>, ConfigError> {
    let tracked = env_or(
        "TRACKED_INDICES",
        "NIFTY,BANKNIFTY,FINNIFTY,MIDCPNIFTY",
    );
    tracked
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(index_spec)
        .collect()
}

fn index_spec(name: &str) -> Result<IndexSpec, ConfigError> {
    let (known_name, strike_step, default_expiry) = KNOWN_INDICES
        .iter()
        .find(|(known, _, _)| *known == name)
        .ok_or_else(|| ConfigError::UnknownIndex {
            name: name.to_string(),
        })?;
    Ok(IndexSpec {
        name: known_name.to_string(),
        strike_step: *strike_step,
        expiry_date: env_or(&format!("EXPIRY_{}", known_name), default_expiry),
    })
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnv {
        key: key.to_string(),
    })
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}
