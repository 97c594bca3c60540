//! Worker pool module
//!
//! Runs one batch end to end: health check, population, then the workers
//! and the coordinator side by side until all of them are joined.

mod runner;

pub use runner::{RunReport, WorkerPool, WorkerPoolConfig, DEFAULT_FINISH_GRACE};
