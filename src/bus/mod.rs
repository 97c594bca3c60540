//! Completion bus
//!
//! Two independent event streams ride on store pub/sub:
//!
//! - task completed: one event per processed task
//! - worker finished: one event per worker that ran out of work
//!
//! Delivery is best-effort and never replayed, so the finished stream is
//! backed by a durable counter in the store that the coordinator can fall
//! back on when events are lost.

mod events;

pub use events::{
    BusEvent, CompletionBus, CompletionEvent, EventStream, WorkerFinishedEvent,
    COMPLETED_TASK_CHANNEL, COMPLETED_WORKERS_CHANNEL, FINISHED_WORKERS_COUNTER,
};
