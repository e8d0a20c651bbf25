//! Dead-letter storage for items the consumer gave up on.
//!
//! Two kinds of items end up here:
//! - queue items that cannot be decoded or resolved (renamed target, corrupt
//!   payload), which can never succeed as they are
//! - jobs that exhausted the configured attempt limit
//!
//! Entries keep the raw queue item so they can be replayed after a fix.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bulkq_queue::QueueItem;

/// Unique dead-letter entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeadLetterId(pub Uuid);

impl DeadLetterId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DeadLetterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeadLetterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parked queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    /// The item exactly as it would be enqueued.
    pub item: QueueItem,
    pub reason: String,
    /// Failed attempts recorded for the job (0 for undecodable items).
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(item: QueueItem, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            id: DeadLetterId::new(),
            item,
            reason: reason.into(),
            attempts,
            dead_lettered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DeadLetterError {
    #[error("dead letter not found: {0}")]
    NotFound(DeadLetterId),
    #[error("dead-letter store lock poisoned")]
    Poisoned,
    #[error("dead-letter storage error: {0}")]
    Storage(String),
}

/// Dead-letter store abstraction.
pub trait DeadLetterStore: Send + Sync {
    /// Park an entry.
    fn park(&self, entry: DeadLetterEntry) -> Result<DeadLetterId, DeadLetterError>;

    /// Oldest entries first.
    fn list(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, DeadLetterError>;

    /// Remove an entry and return it.
    fn take(&self, id: DeadLetterId) -> Result<DeadLetterEntry, DeadLetterError>;

    fn count(&self) -> Result<usize, DeadLetterError>;
}

impl<S> DeadLetterStore for Arc<S>
where
    S: DeadLetterStore + ?Sized,
{
    fn park(&self, entry: DeadLetterEntry) -> Result<DeadLetterId, DeadLetterError> {
        (**self).park(entry)
    }

    fn list(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        (**self).list(limit)
    }

    fn take(&self, id: DeadLetterId) -> Result<DeadLetterEntry, DeadLetterError> {
        (**self).take(id)
    }

    fn count(&self) -> Result<usize, DeadLetterError> {
        (**self).count()
    }
}

/// In-memory dead-letter store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterStore {
    entries: RwLock<HashMap<DeadLetterId, DeadLetterEntry>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl DeadLetterStore for InMemoryDeadLetterStore {
    fn park(&self, entry: DeadLetterEntry) -> Result<DeadLetterId, DeadLetterError> {
        let mut entries = self.entries.write().map_err(|_| DeadLetterError::Poisoned)?;
        let id = entry.id;
        entries.insert(id, entry);
        Ok(id)
    }

    fn list(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        let entries = self.entries.read().map_err(|_| DeadLetterError::Poisoned)?;
        let mut result: Vec<_> = entries.values().cloned().collect();

        result.sort_by_key(|e| (e.dead_lettered_at, e.id));
        result.truncate(limit);
        Ok(result)
    }

    fn take(&self, id: DeadLetterId) -> Result<DeadLetterEntry, DeadLetterError> {
        let mut entries = self.entries.write().map_err(|_| DeadLetterError::Poisoned)?;
        entries.remove(&id).ok_or(DeadLetterError::NotFound(id))
    }

    fn count(&self) -> Result<usize, DeadLetterError> {
        let entries = self.entries.read().map_err(|_| DeadLetterError::Poisoned)?;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn park_list_take() {
        let store = InMemoryDeadLetterStore::new();

        let first = store
            .park(DeadLetterEntry::new(json!(["a.b", "x"]), "unresolvable", 0))
            .unwrap();
        let second = store
            .park(DeadLetterEntry::new(json!(["a.c", "y"]), "attempts exhausted", 3))
            .unwrap();

        let listed = store.list(10).unwrap();
        assert_eq!(listed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(store.list(1).unwrap().len(), 1);

        let taken = store.take(second).unwrap();
        assert_eq!(taken.attempts, 3);
        assert_eq!(taken.reason, "attempts exhausted");
        assert_eq!(store.count().unwrap(), 1);

        assert_eq!(store.take(second), Err(DeadLetterError::NotFound(second)));
    }

    #[test]
    fn entries_serialize_for_inspection() {
        let entry = DeadLetterEntry::new(json!("raw"), "malformed job payload", 0);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["item"], json!("raw"));
        assert_eq!(value["id"], json!(entry.id.0.to_string()));
    }
}
