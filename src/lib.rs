//! worker-pattern - Distributed work queue with coordinated shutdown
//!
//! A producer fills a shared Redis work queue with simulated tasks, a pool
//! of workers claims them until the queue is empty, and a coordinator
//! decides when every worker has finished.
//!
//! # Features
//!
//! - **Atomic Claims**: tasks are handed out by an atomic pop from the head
//!   of a shared list, so no task is ever processed twice.
//!
//! - **Coordinated Finish**: workers announce completion on a pub/sub
//!   channel and through a durable counter; the coordinator trusts
//!   whichever reaches the worker count first.
//!
//! - **Cancellation**: a deadline or Ctrl+C stops workers between tasks
//!   and ends the coordinator's wait.
//!
//! - **Pluggable Store**: Redis for real deployments, an in-process store
//!   with the same semantics for tests and offline runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  put + expire   ┌──────────────────────────────────┐
//! │   Producer   │────────────────▶│              Store               │
//! │ command-0..N │  push tail      │  command-{i}   (hash, TTL)       │
//! └──────────────┘────────────────▶│  active-queue  (list)            │
//!                                  │  completed-workers:count         │
//!                                  └───────┬──────────────────┬───────┘
//!                                 pop head │                  │ publish
//!              ┌───────────────────────────┼──────────┐       │
//!              ▼                           ▼          ▼       │
//!        ┌──────────┐               ┌──────────┐ ┌──────────┐ │
//!        │ Worker 0 │               │ Worker 1 │ │ Worker N │ │
//!        └────┬─────┘               └────┬─────┘ └────┬─────┘ │
//!             │ completed-queue          │            │       │
//!             │ completed-workers        │            │       │
//!             └──────────────────────────┴────────────┴───────┘
//!                                        │
//!                                        ▼
//!                               ┌─────────────────┐
//!                               │   Coordinator   │
//!                               │ k/W finished    │
//!                               └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Against a Redis server
//! worker-pattern --host redis:6379 -w 3 -n 100
//!
//! # Without a server
//! worker-pattern --store memory -w 8 -n 1000
//! ```

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pool;
pub mod producer;
pub mod progress;
pub mod queue;
pub mod store;
pub mod task;
pub mod worker;

pub use config::{CliArgs, RunConfig, StoreKind};
pub use error::{PoolError, Result};
pub use pool::{RunReport, WorkerPool, WorkerPoolConfig};
