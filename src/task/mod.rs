//! Task module
//!
//! A task is one unit of simulated work: an id plus a flat payload whose
//! `duration` field says how long a worker spends on it. Payloads live in
//! the store under the task id with a fixed time-to-live.

mod store;
mod types;

pub use store::TaskStore;
pub use types::{
    Task, TaskId, TaskRecord, DEFAULT_MAX_DURATION_MS, DEFAULT_MIN_DURATION_MS,
    DEFAULT_TASK_TTL, DURATION_FIELD,
};
