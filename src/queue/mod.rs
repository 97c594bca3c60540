//! Queue module for shared work distribution
//!
//! The work queue is an ordered list of task ids in the store. Producers
//! append to the tail; workers atomically pop from the head, so no two
//! workers ever claim the same id. An empty queue is a normal outcome and
//! the only signal that tells a worker to stop.

mod work_queue;

pub use work_queue::{Dequeued, WorkQueue, ACTIVE_QUEUE_KEY};
