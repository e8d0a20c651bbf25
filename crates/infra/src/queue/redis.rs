//! Redis list-backed job queue.
//!
//! - **Enqueue**: `RPUSH key item`, plus `EXPIRE key ttl` in the same
//!   transaction when a TTL is configured
//! - **Dequeue**: `LRANGE key 0 n-1` then `LTRIM key n -1` in one `MULTI`/`EXEC`
//!   block, so concurrent consumers never receive the same item
//!
//! Items are stored as JSON strings; any producer that writes the same job
//! encoding to the same key interoperates.

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use bulkq_queue::{JobQueue, QueueError, QueueItem};

use crate::config::{BulkConfig, DEFAULT_QUEUE_KEY};

#[derive(Debug, Clone)]
pub struct RedisJobQueue {
    client: Arc<redis::Client>,
    key: String,
    ttl: Option<Duration>,
}

impl RedisJobQueue {
    /// Open a client for `redis_url` (e.g. "redis://localhost:6379").
    ///
    /// No connection is made until the first command.
    pub fn new(redis_url: impl AsRef<str>, key: Option<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            key: key.unwrap_or_else(|| DEFAULT_QUEUE_KEY.to_string()),
            ttl: None,
        })
    }

    pub fn from_config(config: &BulkConfig) -> Result<Self, QueueError> {
        let queue = Self::new(&config.redis_url, Some(config.queue_key.clone()))?;
        Ok(match config.queue_ttl {
            Some(ttl) => queue.with_ttl(ttl),
            None => queue,
        })
    }

    /// Refresh the key's expiry to `ttl` on every enqueue.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn connection(&self) -> Result<redis::Connection, QueueError> {
        self.client
            .get_connection()
            .map_err(|e| QueueError::Connection(e.to_string()))
    }
}

impl JobQueue for RedisJobQueue {
    #[instrument(skip(self, item), fields(queue_key = %self.key), err)]
    fn enqueue(&self, item: QueueItem) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&item).map_err(|e| QueueError::Encode(e.to_string()))?;
        let mut conn = self.connection()?;

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("RPUSH").arg(&self.key).arg(&payload).ignore();
        if let Some(ttl) = self.ttl {
            pipe.cmd("EXPIRE").arg(&self.key).arg(ttl.as_secs().max(1)).ignore();
        }

        pipe.query::<()>(&mut conn)
            .map_err(|e| QueueError::Command(format!("RPUSH failed: {}", e)))
    }

    #[instrument(skip(self), fields(queue_key = %self.key), err)]
    fn dequeue(&self, quantity: usize) -> Result<Vec<QueueItem>, QueueError> {
        if quantity == 0 {
            return Ok(Vec::new());
        }
        let quantity = isize::try_from(quantity).unwrap_or(isize::MAX);
        let mut conn = self.connection()?;

        let (raw,): (Vec<String>,) = redis::pipe()
            .atomic()
            .cmd("LRANGE")
            .arg(&self.key)
            .arg(0)
            .arg(quantity - 1)
            .cmd("LTRIM")
            .arg(&self.key)
            .arg(quantity)
            .arg(-1)
            .ignore()
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("LRANGE/LTRIM failed: {}", e)))?;

        Ok(raw
            .into_iter()
            .map(|entry| {
                serde_json::from_str(&entry).unwrap_or_else(|e| {
                    // Hand the raw string on; the consumer parks it as undecodable.
                    warn!(queue_key = %self.key, error = %e, "queue entry is not JSON");
                    QueueItem::String(entry)
                })
            })
            .collect())
    }

    fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.connection()?;
        let _: i64 = redis::cmd("DEL")
            .arg(&self.key)
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("DEL failed: {}", e)))?;
        Ok(())
    }

    fn count(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection()?;
        redis::cmd("LLEN")
            .arg(&self.key)
            .query(&mut conn)
            .map_err(|e| QueueError::Command(format!("LLEN failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn queue(key: &str) -> RedisJobQueue {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| crate::config::DEFAULT_REDIS_URL.into());
        RedisJobQueue::new(url, Some(key.to_string())).unwrap()
    }

    #[test]
    fn config_supplies_key_and_ttl() {
        let config = BulkConfig::default()
            .with_queue_key("lazy_batch:jobs")
            .with_queue_ttl(Duration::from_secs(60));
        let queue = RedisJobQueue::from_config(&config).unwrap();

        assert_eq!(queue.key(), "lazy_batch:jobs");
        assert_eq!(queue.ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            RedisJobQueue::new("not a url", None),
            Err(QueueError::Connection(_))
        ));
    }

    #[test]
    #[ignore = "requires a running Redis (set REDIS_URL)"]
    fn fifo_round_trip_against_redis() {
        let queue = queue("bulkq:test:fifo").with_ttl(Duration::from_secs(30));
        queue.clear().unwrap();

        for name in ["walison", "error", "filipe"] {
            queue.enqueue(json!(["tests.tasks.echo", name])).unwrap();
        }
        assert_eq!(queue.count().unwrap(), 3);

        let first = queue.dequeue(2).unwrap();
        assert_eq!(first[1], json!(["tests.tasks.echo", "error"]));
        assert_eq!(queue.count().unwrap(), 1);
        assert_eq!(queue.dequeue(10).unwrap().len(), 1);
        assert!(queue.dequeue(10).unwrap().is_empty());
    }
}
