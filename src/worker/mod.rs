//! Worker module
//!
//! Workers claim task ids from the shared queue until it runs dry,
//! simulate each task's cost and announce completions on the bus.

mod processor;

pub use processor::{FinishReason, Worker, WorkerStats};
