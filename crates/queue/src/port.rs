//! FIFO job queue abstraction.
//!
//! ## Contract
//!
//! - **FIFO**: `enqueue` appends to the tail, `dequeue` removes from the head
//! - **Atomic drain**: `dequeue(n)` removes and returns up to `n` items as one
//!   indivisible operation; no item is returned by two calls, and nothing pushed
//!   concurrently is lost or duplicated
//! - **Serialization-agnostic**: items are stored exactly as given
//!
//! Atomicity is what makes several consumers draining one queue safe. It says
//! nothing about processing: a consumer may put an item back after a failure.
//!
//! ## Error Handling
//!
//! Transport failures (connection refused, poisoned lock, ...) are returned as
//! [`QueueError`]. Callers do not retry them; that is the backend client's or an
//! operator's job.

use std::sync::Arc;

use thiserror::Error;

/// A queued value (one serialized job).
pub type QueueItem = serde_json::Value;

/// Backend failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// An in-process lock was poisoned by a panicking holder.
    #[error("queue lock poisoned")]
    Poisoned,

    /// The backing store could not be reached.
    #[error("queue connection error: {0}")]
    Connection(String),

    /// The backing store rejected a command.
    #[error("queue command error: {0}")]
    Command(String),

    /// An item could not be encoded for storage.
    #[error("queue encode error: {0}")]
    Encode(String),
}

/// Domain-agnostic FIFO of serialized jobs.
///
/// Implementations must be safe to share across threads: producers push from
/// request handlers while a consumer drains on its own schedule.
pub trait JobQueue: Send + Sync {
    /// Append `item` to the tail.
    fn enqueue(&self, item: QueueItem) -> Result<(), QueueError>;

    /// Atomically remove and return the first `quantity` items (fewer when the
    /// queue is shorter; none for `quantity == 0`).
    fn dequeue(&self, quantity: usize) -> Result<Vec<QueueItem>, QueueError>;

    /// Remove every item.
    fn clear(&self) -> Result<(), QueueError>;

    /// Number of queued items.
    fn count(&self) -> Result<usize, QueueError>;
}

impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    fn enqueue(&self, item: QueueItem) -> Result<(), QueueError> {
        (**self).enqueue(item)
    }

    fn dequeue(&self, quantity: usize) -> Result<Vec<QueueItem>, QueueError> {
        (**self).dequeue(quantity)
    }

    fn clear(&self) -> Result<(), QueueError> {
        (**self).clear()
    }

    fn count(&self) -> Result<usize, QueueError> {
        (**self).count()
    }
}
