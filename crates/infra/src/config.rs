//! Configuration for producers, consumers and queue backends.
//!
//! Values are passed explicitly to [`Producer`](crate::jobs::Producer) and
//! [`Dispatcher`](crate::jobs::Dispatcher) constructors; nothing reads ambient
//! global state after startup.

use std::time::Duration;

use thiserror::Error;

/// Batch size used by `consume_batch` when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Redis list key used when none is configured.
pub const DEFAULT_QUEUE_KEY: &str = "bulk_task";

/// Redis URL used when `REDIS_URL` is not set.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Batching queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkConfig {
    /// Run targets synchronously on `push` instead of enqueueing.
    pub eager: bool,
    /// Items drained per `consume_batch` call.
    pub batch_size: usize,
    /// Failed singleton attempts before a job is dead-lettered (`None` = requeue forever).
    pub max_attempts: Option<u32>,
    /// Invoke the groups of one batch on separate threads.
    pub parallel_groups: bool,
    /// Backend key holding the queue.
    pub queue_key: String,
    /// Expiry refreshed on the backend key at every push.
    pub queue_ttl: Option<Duration>,
    pub redis_url: String,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            eager: false,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: None,
            parallel_groups: false,
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            queue_ttl: None,
            redis_url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

impl BulkConfig {
    /// Load from process environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `BULKQ_EAGER` | `eager` |
    /// | `BULKQ_BATCH_SIZE` | `batch_size` |
    /// | `BULKQ_MAX_ATTEMPTS` | `max_attempts` |
    /// | `BULKQ_PARALLEL_GROUPS` | `parallel_groups` |
    /// | `BULKQ_QUEUE_KEY` | `queue_key` |
    /// | `BULKQ_QUEUE_TTL_SECS` | `queue_ttl` |
    /// | `REDIS_URL` | `redis_url` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("BULKQ_EAGER") {
            config.eager = parse_bool("BULKQ_EAGER", value)?;
        }
        if let Some(value) = lookup("BULKQ_BATCH_SIZE") {
            config.batch_size = parse_positive("BULKQ_BATCH_SIZE", value)?;
        }
        if let Some(value) = lookup("BULKQ_MAX_ATTEMPTS") {
            config.max_attempts = Some(parse_positive("BULKQ_MAX_ATTEMPTS", value)?);
        }
        if let Some(value) = lookup("BULKQ_PARALLEL_GROUPS") {
            config.parallel_groups = parse_bool("BULKQ_PARALLEL_GROUPS", value)?;
        }
        if let Some(value) = lookup("BULKQ_QUEUE_KEY") {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "BULKQ_QUEUE_KEY",
                    value,
                    reason: "must not be empty",
                });
            }
            config.queue_key = value;
        }
        if let Some(value) = lookup("BULKQ_QUEUE_TTL_SECS") {
            let secs: u64 = parse_positive("BULKQ_QUEUE_TTL_SECS", value)?;
            config.queue_ttl = Some(Duration::from_secs(secs));
        }
        if let Some(value) = lookup("REDIS_URL") {
            config.redis_url = value;
        }

        Ok(config)
    }

    pub fn with_eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_parallel_groups(mut self, parallel: bool) -> Self {
        self.parallel_groups = parallel;
        self
    }

    pub fn with_queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = key.into();
        self
    }

    pub fn with_queue_ttl(mut self, ttl: Duration) -> Self {
        self.queue_ttl = Some(ttl);
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected a boolean",
        }),
    }
}

fn parse_positive<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: core::str::FromStr + Default + PartialEq,
{
    match value.trim().parse::<T>() {
        Ok(n) if n != T::default() => Ok(n),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected a positive integer",
        }),
    }
}
