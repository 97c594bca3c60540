//! Store-backed FIFO of task ids

use crate::error::StoreResult;
use crate::store::Store;
use crate::task::TaskId;

use std::sync::Arc;

/// Store key of the active work queue
pub const ACTIVE_QUEUE_KEY: &str = "active-queue";

/// Outcome of a successful pop
///
/// Together with the `Err` side of [`WorkQueue::dequeue`] this gives three
/// distinct results: a claimed task, an exhausted queue, or a store failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    /// This caller now owns the task
    Claimed(TaskId),
    /// Nothing left to claim
    Empty,
}

/// Enqueue/Dequeue access to the shared work queue
#[derive(Clone)]
pub struct WorkQueue {
    store: Arc<dyn Store>,
    key: String,
}

impl WorkQueue {
    /// Handle on the default active queue
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_key(store, ACTIVE_QUEUE_KEY)
    }

    /// Handle on a queue under a custom key
    pub fn with_key(store: Arc<dyn Store>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    /// Store key of this queue
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Drop every pending entry
    pub async fn clear(&self) -> StoreResult<()> {
        self.store.delete(&self.key, &[]).await
    }

    /// Append a task id to the tail
    pub async fn enqueue(&self, id: &TaskId) -> StoreResult<()> {
        self.store.push_tail(&self.key, id.as_str()).await
    }

    /// Atomically claim the task id at the head
    pub async fn dequeue(&self) -> StoreResult<Dequeued> {
        Ok(match self.store.pop_head(&self.key).await? {
            Some(id) => Dequeued::Claimed(TaskId::new(id)),
            None => Dequeued::Empty,
        })
    }

    /// Number of pending entries
    pub async fn len(&self) -> StoreResult<u64> {
        self.store.length(&self.key).await
    }

    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len().await? == 0)
    }
}
