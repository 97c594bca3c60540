//! Keyed task storage with expiry

use super::types::{Task, TaskId, TaskRecord};
use crate::error::StoreResult;
use crate::store::Store;

use std::sync::Arc;
use std::time::Duration;

/// Put/Get access to task payloads
///
/// Records are never deleted after processing; only the TTL removes them.
#[derive(Clone)]
pub struct TaskStore {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl TaskStore {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Time-to-live applied on every put
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Write a task payload and arm its expiry
    ///
    /// A failure after the payload was written leaves the record without a
    /// TTL; no cleanup is attempted.
    pub async fn put(&self, task: &Task) -> StoreResult<()> {
        let key = task.id.as_str();
        self.store.put(key, &task.to_fields()).await?;
        self.store.expire(key, self.ttl).await
    }

    /// Read a task payload; `None` when expired or never written
    pub async fn get(&self, id: &TaskId) -> StoreResult<Option<TaskRecord>> {
        let fields = self.store.get_all(id.as_str()).await?;
        Ok(fields.map(|fields| TaskRecord::new(id.clone(), fields)))
    }
}
