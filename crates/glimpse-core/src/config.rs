//! Configuration module
//!
//! Process-wide settings, read once at startup and handed by reference to the
//! components that need them (storage factory, vision client, subscriber).

use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::storage_types::StorageBackend;

const DEFAULT_STORAGE_SCHEME: &str = "blob";
const DEFAULT_BROKER_URI: &str = "memory://";
const MESSAGING_CHANNEL_CAPACITY: usize = 1024;
const ANALYSIS_TIMEOUT_SECS: u64 = 30;
const DEAD_LETTER_MAX_ATTEMPTS: u32 = 5;
const REDELIVERY_BASE_BACKOFF_MS: u64 = 500;
const REDELIVERY_MAX_BACKOFF_SECS: u64 = 300;
const CONSUMER_MAX_WORKERS: usize = 4;
const PUBLISH_MAX_ATTEMPTS: u32 = 3;

/// What happens to a notification whose handler keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterPolicy {
    /// Redeliver with backoff until the handler succeeds.
    Redeliver,
    /// Move to the dead-letter side channel after `max_attempts` deliveries.
    DeadLetter { max_attempts: u32 },
}

impl DeadLetterPolicy {
    /// Whether a message that has been delivered `attempts` times may be
    /// delivered again.
    pub fn allows_redelivery(&self, attempts: u32) -> bool {
        match self {
            DeadLetterPolicy::Redeliver => true,
            DeadLetterPolicy::DeadLetter { max_attempts } => attempts < *max_attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::invalid(
                "LOG_FORMAT",
                format!("expected 'pretty' or 'json', got '{}'", other),
            )),
        }
    }
}

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    pub environment: String,
    pub log_format: LogFormat,
    // Storage
    pub storage_backend_uri: String,
    pub storage_backend: StorageBackend,
    /// Root directory when `storage_backend` is `Local`.
    pub local_storage_path: Option<PathBuf>,
    /// Location scheme served by the configured store (e.g. `blob`).
    pub storage_scheme: String,
    /// Base of the URLs handed to the vision API for stored objects.
    pub fetch_base_url: String,
    // Messaging
    pub messaging_broker_uri: String,
    pub messaging_channel_capacity: usize,
    pub consumer_max_workers: usize,
    pub dead_letter_policy: DeadLetterPolicy,
    pub redelivery_base_backoff: Duration,
    pub redelivery_max_backoff: Duration,
    pub publish_max_attempts: u32,
    // Vision API
    pub vision_api_base_url: String,
    pub vision_api_key: String,
    pub analysis_timeout: Duration,
    // Analysis cache
    pub cache_ttl: Option<Duration>,
    pub cache_max_entries: Option<usize>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("log_format", &self.log_format)
            .field("storage_backend_uri", &self.storage_backend_uri)
            .field("storage_backend", &self.storage_backend)
            .field("storage_scheme", &self.storage_scheme)
            .field("fetch_base_url", &self.fetch_base_url)
            .field("messaging_broker_uri", &self.messaging_broker_uri)
            .field("messaging_channel_capacity", &self.messaging_channel_capacity)
            .field("consumer_max_workers", &self.consumer_max_workers)
            .field("dead_letter_policy", &self.dead_letter_policy)
            .field("vision_api_base_url", &self.vision_api_base_url)
            .field("vision_api_key", &"[redacted]")
            .field("analysis_timeout", &self.analysis_timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_max_entries", &self.cache_max_entries)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let storage_backend_uri =
            get("STORAGE_BACKEND_URI").ok_or(ConfigError::Missing("STORAGE_BACKEND_URI"))?;
        let (storage_backend, local_storage_path) = parse_storage_uri(&storage_backend_uri)?;

        let messaging_broker_uri =
            get("MESSAGING_BROKER_URI").unwrap_or_else(|| DEFAULT_BROKER_URI.to_string());

        let dead_letter_max_attempts = parse_or(
            "DEAD_LETTER_MAX_ATTEMPTS",
            get("DEAD_LETTER_MAX_ATTEMPTS"),
            DEAD_LETTER_MAX_ATTEMPTS,
        )?;
        let dead_letter_policy = match get("DEAD_LETTER_POLICY")
            .unwrap_or_else(|| "dead-letter".to_string())
            .to_lowercase()
            .as_str()
        {
            "redeliver" => DeadLetterPolicy::Redeliver,
            "dead-letter" | "dead_letter" | "deadletter" => DeadLetterPolicy::DeadLetter {
                max_attempts: dead_letter_max_attempts,
            },
            other => {
                return Err(ConfigError::invalid(
                    "DEAD_LETTER_POLICY",
                    format!("expected 'redeliver' or 'dead-letter', got '{}'", other),
                ))
            }
        };

        let config = Config {
            environment: get("ENVIRONMENT")
                .or_else(|| get("APP_ENV"))
                .unwrap_or_else(|| "development".to_string()),
            log_format: get("LOG_FORMAT")
                .map(|v| v.parse::<LogFormat>())
                .transpose()?
                .unwrap_or_default(),
            storage_backend_uri,
            storage_backend,
            local_storage_path,
            storage_scheme: get("STORAGE_SCHEME")
                .unwrap_or_else(|| DEFAULT_STORAGE_SCHEME.to_string()),
            fetch_base_url: get("FETCH_BASE_URL").ok_or(ConfigError::Missing("FETCH_BASE_URL"))?,
            messaging_broker_uri,
            messaging_channel_capacity: parse_or(
                "MESSAGING_CHANNEL_CAPACITY",
                get("MESSAGING_CHANNEL_CAPACITY"),
                MESSAGING_CHANNEL_CAPACITY,
            )?,
            consumer_max_workers: parse_or(
                "CONSUMER_MAX_WORKERS",
                get("CONSUMER_MAX_WORKERS"),
                CONSUMER_MAX_WORKERS,
            )?,
            dead_letter_policy,
            redelivery_base_backoff: Duration::from_millis(parse_or(
                "REDELIVERY_BASE_BACKOFF_MS",
                get("REDELIVERY_BASE_BACKOFF_MS"),
                REDELIVERY_BASE_BACKOFF_MS,
            )?),
            redelivery_max_backoff: Duration::from_secs(parse_or(
                "REDELIVERY_MAX_BACKOFF_SECS",
                get("REDELIVERY_MAX_BACKOFF_SECS"),
                REDELIVERY_MAX_BACKOFF_SECS,
            )?),
            publish_max_attempts: parse_or(
                "PUBLISH_MAX_ATTEMPTS",
                get("PUBLISH_MAX_ATTEMPTS"),
                PUBLISH_MAX_ATTEMPTS,
            )?,
            vision_api_base_url: get("VISION_API_BASE_URL")
                .ok_or(ConfigError::Missing("VISION_API_BASE_URL"))?,
            vision_api_key: get("VISION_API_KEY").ok_or(ConfigError::Missing("VISION_API_KEY"))?,
            analysis_timeout: Duration::from_secs(parse_or(
                "ANALYSIS_TIMEOUT_SECS",
                get("ANALYSIS_TIMEOUT_SECS"),
                ANALYSIS_TIMEOUT_SECS,
            )?),
            cache_ttl: get("CACHE_TTL_SECS")
                .map(|v| parse_value::<u64>("CACHE_TTL_SECS", &v))
                .transpose()?
                .map(Duration::from_secs),
            cache_max_entries: get("CACHE_MAX_ENTRIES")
                .map(|v| parse_value::<usize>("CACHE_MAX_ENTRIES", &v))
                .transpose()?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.messaging_broker_uri.starts_with("memory://") {
            return Err(ConfigError::invalid(
                "MESSAGING_BROKER_URI",
                format!("unsupported broker '{}'", self.messaging_broker_uri),
            ));
        }

        for (var, url) in [
            ("FETCH_BASE_URL", &self.fetch_base_url),
            ("VISION_API_BASE_URL", &self.vision_api_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid(var, "must be an http(s) URL"));
            }
        }

        if self.storage_scheme.is_empty()
            || !self
                .storage_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(ConfigError::invalid(
                "STORAGE_SCHEME",
                "must be a URI scheme such as 'blob'",
            ));
        }

        if self.messaging_channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "MESSAGING_CHANNEL_CAPACITY",
                "must be greater than 0",
            ));
        }
        if self.consumer_max_workers == 0 {
            return Err(ConfigError::invalid(
                "CONSUMER_MAX_WORKERS",
                "must be greater than 0",
            ));
        }
        if self.publish_max_attempts == 0 {
            return Err(ConfigError::invalid(
                "PUBLISH_MAX_ATTEMPTS",
                "must be greater than 0",
            ));
        }
        if let DeadLetterPolicy::DeadLetter { max_attempts: 0 } = self.dead_letter_policy {
            return Err(ConfigError::invalid(
                "DEAD_LETTER_MAX_ATTEMPTS",
                "must be greater than 0",
            ));
        }
        if self.analysis_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "ANALYSIS_TIMEOUT_SECS",
                "must be greater than 0",
            ));
        }
        if self.cache_max_entries == Some(0) {
            return Err(ConfigError::invalid(
                "CACHE_MAX_ENTRIES",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }
}

fn parse_storage_uri(uri: &str) -> Result<(StorageBackend, Option<PathBuf>), ConfigError> {
    let (scheme, rest) = uri.split_once("://").ok_or_else(|| {
        ConfigError::invalid("STORAGE_BACKEND_URI", "expected scheme://path")
    })?;
    let backend: StorageBackend = scheme.parse()?;
    match backend {
        StorageBackend::Local => {
            if !rest.starts_with('/') {
                return Err(ConfigError::invalid(
                    "STORAGE_BACKEND_URI",
                    "file:// URIs must carry an absolute path",
                ));
            }
            Ok((backend, Some(PathBuf::from(rest))))
        }
        StorageBackend::Memory => Ok((backend, None)),
    }
}

fn parse_value<T: FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>()
        .map_err(|_| ConfigError::invalid(var, format!("'{}' is not a valid value", raw)))
}

fn parse_or<T: FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => parse_value(var, &raw),
        None => Ok(default),
    }
}
