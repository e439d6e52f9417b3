//! Service configuration read from the environment

use std::str::FromStr;
use std::time::Duration;

use maxbot_profiles::{AlertThresholds, CircuitBreakerConfig, DEFAULT_PROFILE_TTL};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackend::Redis => "redis",
            CacheBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub profile_ttl: Duration,
    pub breaker: CircuitBreakerConfig,
    pub webhook_deadline: Duration,
    /// Loaded for completeness; inbound webhooks are not signature-checked
    pub webhook_secret: String,
    pub monitoring_enabled: bool,
    pub alert_thresholds: AlertThresholds,
    pub alert_check_interval: Duration,
    pub mock_mode: bool,
    pub allowed_origins: Vec<String>,
    pub log_format: LogFormat,
}

fn parse<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Durations and intervals; zero would disable a timeout or panic a ticker
fn parse_nonzero(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match parse(key, raw, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::trim) {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
        }),
    }
}

fn redis_url_from_parts(addr: &str, password: &str, db: u32) -> String {
    if password.is_empty() {
        format!("redis://{}/{}", addr, db)
    } else {
        format!("redis://:{}@{}/{}", password, addr, db)
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cache_backend = match get("CACHE_BACKEND").as_deref().map(str::trim) {
            None | Some("redis") => CacheBackend::Redis,
            Some("memory") => CacheBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "CACHE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let redis_url = match get("REDIS_URL") {
            Some(url) => url,
            None => redis_url_from_parts(
                &get("REDIS_ADDR").unwrap_or_else(|| "localhost:6379".to_string()),
                &get("REDIS_PASSWORD").unwrap_or_default(),
                parse("REDIS_DB", get("REDIS_DB"), 0)?,
            ),
        };

        let breaker = CircuitBreakerConfig {
            failure_threshold: parse("CACHE_FAILURE_THRESHOLD", get("CACHE_FAILURE_THRESHOLD"), 5)?,
            reset_timeout: Duration::from_secs(parse(
                "CACHE_RESET_TIMEOUT_SECS",
                get("CACHE_RESET_TIMEOUT_SECS"),
                60,
            )?),
            call_timeout: Duration::from_millis(parse_nonzero(
                "CACHE_CALL_TIMEOUT_MS",
                get("CACHE_CALL_TIMEOUT_MS"),
                5000,
            )?),
        };

        let alert_thresholds = AlertThresholds {
            profile_quality: parse(
                "PROFILE_QUALITY_ALERT_THRESHOLD",
                get("PROFILE_QUALITY_ALERT_THRESHOLD"),
                0.8,
            )?,
            webhook_error_rate: parse(
                "WEBHOOK_ERROR_ALERT_THRESHOLD",
                get("WEBHOOK_ERROR_ALERT_THRESHOLD"),
                0.05,
            )?,
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let allowed_origins = get("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8095".to_string()),
            cache_backend,
            redis_url,
            profile_ttl: Duration::from_secs(parse_nonzero(
                "PROFILE_TTL_SECS",
                get("PROFILE_TTL_SECS"),
                DEFAULT_PROFILE_TTL.as_secs(),
            )?),
            breaker,
            webhook_deadline: Duration::from_millis(parse_nonzero(
                "WEBHOOK_DEADLINE_MS",
                get("WEBHOOK_DEADLINE_MS"),
                10_000,
            )?),
            webhook_secret: get("WEBHOOK_SECRET").unwrap_or_default(),
            monitoring_enabled: parse_bool("MONITORING_ENABLED", get("MONITORING_ENABLED"), true)?,
            alert_thresholds,
            alert_check_interval: Duration::from_secs(parse_nonzero(
                "ALERT_CHECK_INTERVAL_SECS",
                get("ALERT_CHECK_INTERVAL_SECS"),
                300,
            )?),
            mock_mode: parse_bool("MOCK_MODE", get("MOCK_MODE"), true)?,
            allowed_origins,
            log_format,
        })
    }
}
