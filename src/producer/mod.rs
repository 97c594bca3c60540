//! Producer module
//!
//! Fills the task store and the work queue with one batch of tasks before
//! any worker starts.

mod populator;

pub use populator::{PopulateReport, Producer, ProducerConfig};
