//! Error types for worker-pattern
//!
//! Error hierarchy covering:
//! - Store (Redis / in-memory) connectivity and command failures
//! - Task payload errors (missing or malformed records)
//! - Configuration errors
//! - Coordinator and worker lifecycle errors
//!
//! None of these abort a run on their own. Producer, workers and the
//! coordinator log what they cannot handle and move on; only configuration
//! errors reach `main` as a failure.

use thiserror::Error;

/// Top-level error type for worker-pattern
#[derive(Error, Debug)]
pub enum PoolError {
    /// Store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Task record errors
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Store (Redis or in-memory) errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Could not reach the store
    #[error("Failed to connect to store at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Store answered the health check with something unexpected
    #[error("Store health check failed: {0}")]
    HealthCheck(String),

    /// A command against a key failed
    #[error("{op} on '{key}' failed: {reason}")]
    OperationFailed {
        op: &'static str,
        key: String,
        reason: String,
    },

    /// Publishing to a channel failed
    #[error("Could not publish to '{channel}': {reason}")]
    PublishFailed { channel: String, reason: String },
}

impl StoreError {
    /// Check if retrying the operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailed { .. } | StoreError::HealthCheck(_)
        )
    }

    pub(crate) fn op(op: &'static str, key: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::OperationFailed {
            op,
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Task record errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Record expired or was never written (indistinguishable)
    #[error("Task '{id}' not found")]
    NotFound { id: String },

    /// Required payload field absent
    #[error("Task '{id}' has no '{field}' field")]
    MissingField { id: String, field: &'static str },

    /// Duration is not an integer
    #[error("Task '{id}': cannot convert duration '{value}' to an integer")]
    InvalidDuration { id: String, value: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Duration range is empty
    #[error("Invalid task duration range {min}..={max} ms")]
    InvalidDurationRange { min: u64, max: u64 },

    /// TTL of zero would expire tasks immediately
    #[error("Invalid task TTL: {0}")]
    InvalidTtl(String),

    /// Deadline is not a positive duration
    #[error("Invalid deadline: {0}")]
    InvalidDeadline(String),

    /// Store address could not be parsed
    #[error("Invalid store address '{address}': {reason}")]
    InvalidStoreAddress { address: String, reason: String },
}

/// Coordinator errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Wait was cancelled (deadline or interrupt)
    #[error("Coordinator cancelled after {observed}/{expected} workers finished")]
    Cancelled { observed: usize, expected: usize },

    /// Subscription ended before every worker was seen
    #[error("Subscription closed after {observed}/{expected} workers finished")]
    SubscriptionClosed { observed: usize, expected: usize },

    /// Could not subscribe or read the counter
    #[error("Coordinator store failure: {0}")]
    Store(#[from] StoreError),
}

/// Worker errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker task panicked or was aborted
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PoolError>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for task record operations
pub type TaskResult<T> = std::result::Result<T, TaskError>;
