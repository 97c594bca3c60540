//! Event types and the bus handle

use crate::error::StoreResult;
use crate::store::{Store, Subscription};
use crate::task::TaskId;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Channel carrying task-completed events
pub const COMPLETED_TASK_CHANNEL: &str = "completed-queue";

/// Channel carrying worker-finished events
pub const COMPLETED_WORKERS_CHANNEL: &str = "completed-workers";

/// Durable count of finished workers for the current run
pub const FINISHED_WORKERS_COUNTER: &str = "completed-workers:count";

/// An event that travels over a bus channel as a string
pub trait BusEvent: Serialize + DeserializeOwned + Sized {
    /// Channel the event is published on
    const CHANNEL: &'static str;

    /// Decode a message that is not JSON (older or foreign publishers)
    fn from_plain(raw: &str) -> Self;

    fn encode(&self) -> String {
        // Serializing these plain structs cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    fn decode(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| Self::from_plain(raw))
    }
}

/// A task was processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub task_id: TaskId,
    pub worker_id: Option<usize>,
}

impl CompletionEvent {
    pub fn new(task_id: TaskId, worker_id: usize) -> Self {
        Self {
            task_id,
            worker_id: Some(worker_id),
        }
    }
}

impl BusEvent for CompletionEvent {
    const CHANNEL: &'static str = COMPLETED_TASK_CHANNEL;

    /// A bare message is the task id
    fn from_plain(raw: &str) -> Self {
        Self {
            task_id: TaskId::new(raw),
            worker_id: None,
        }
    }
}

/// A worker observed an empty queue and stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFinishedEvent {
    pub worker_id: Option<usize>,
}

impl WorkerFinishedEvent {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id: Some(worker_id),
        }
    }
}

impl BusEvent for WorkerFinishedEvent {
    const CHANNEL: &'static str = COMPLETED_WORKERS_CHANNEL;

    /// A bare message is the worker id, or empty
    fn from_plain(raw: &str) -> Self {
        Self {
            worker_id: raw.trim().parse().ok(),
        }
    }
}

/// Typed view over a channel subscription
pub struct EventStream<E> {
    subscription: Subscription,
    _event: PhantomData<fn() -> E>,
}

impl<E: BusEvent> EventStream<E> {
    fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            _event: PhantomData,
        }
    }

    /// Next event; `None` when the subscription is closed
    pub async fn next(&mut self) -> Option<E> {
        self.subscription.recv().await.map(|raw| E::decode(&raw))
    }

    /// Next event if one is already buffered
    pub fn try_next(&mut self) -> Option<E> {
        self.subscription.try_recv().map(|raw| E::decode(&raw))
    }

    /// Unsubscribe
    pub fn close(self) {
        self.subscription.close();
    }
}

/// Publish/subscribe access to the completion channels
#[derive(Clone)]
pub struct CompletionBus {
    store: Arc<dyn Store>,
}

impl CompletionBus {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Publish an event; returns the number of subscribers reached
    pub async fn publish<E: BusEvent>(&self, event: &E) -> StoreResult<u64> {
        let receivers = self.store.publish(E::CHANNEL, &event.encode()).await?;
        if receivers == 0 {
            debug!(channel = E::CHANNEL, "Published with no subscribers");
        }
        Ok(receivers)
    }

    /// Subscribe to the channel of `E`
    pub async fn subscribe<E: BusEvent>(&self) -> StoreResult<EventStream<E>> {
        let subscription = self.store.subscribe(E::CHANNEL).await?;
        Ok(EventStream::new(subscription))
    }

    /// Count one more finished worker; returns the new total
    pub async fn record_worker_finished(&self) -> StoreResult<u64> {
        let total = self.store.increment(FINISHED_WORKERS_COUNTER).await?;
        Ok(total.max(0) as u64)
    }

    /// Finished workers counted so far
    pub async fn finished_workers(&self) -> StoreResult<u64> {
        let total = self.store.counter(FINISHED_WORKERS_COUNTER).await?;
        Ok(total.max(0) as u64)
    }

    /// Start a new run with a zero counter
    pub async fn reset_finished_workers(&self) -> StoreResult<()> {
        self.store.delete(FINISHED_WORKERS_COUNTER, &[]).await
    }
}
