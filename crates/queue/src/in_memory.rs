//! In-memory job queue for tests/dev.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::port::{JobQueue, QueueError, QueueItem};

/// In-process FIFO.
///
/// - No IO
/// - One lock guards the whole deque, so a drain is atomic
/// - Contents are lost with the process
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    items: Mutex<VecDeque<QueueItem>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the queued items, head first.
    pub fn snapshot(&self) -> Result<Vec<QueueItem>, QueueError> {
        let items = self.items.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(items.iter().cloned().collect())
    }
}

impl JobQueue for InMemoryJobQueue {
    fn enqueue(&self, item: QueueItem) -> Result<(), QueueError> {
        let mut items = self.items.lock().map_err(|_| QueueError::Poisoned)?;
        items.push_back(item);
        Ok(())
    }

    fn dequeue(&self, quantity: usize) -> Result<Vec<QueueItem>, QueueError> {
        let mut items = self.items.lock().map_err(|_| QueueError::Poisoned)?;
        let take = quantity.min(items.len());
        Ok(items.drain(..take).collect())
    }

    fn clear(&self) -> Result<(), QueueError> {
        let mut items = self.items.lock().map_err(|_| QueueError::Poisoned)?;
        items.clear();
        Ok(())
    }

    fn count(&self) -> Result<usize, QueueError> {
        let items = self.items.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(items.len())
    }
}
