//! Coordinator module
//!
//! The coordinator decides when every worker of a run has finished. It
//! counts worker-finished events and polls the durable finished counter,
//! so a lost event does not stall the run.

mod manager;

pub use manager::{Coordinator, CoordinatorReport, FinishedWatch, DEFAULT_POLL_INTERVAL};
