//! Task types and payload encoding

use crate::error::{TaskError, TaskResult};
use crate::store::Fields;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Payload field holding the simulated cost in milliseconds
pub const DURATION_FIELD: &str = "duration";

/// Lower bound of generated durations (ms)
pub const DEFAULT_MIN_DURATION_MS: u64 = 10;

/// Upper bound of generated durations (ms, inclusive)
pub const DEFAULT_MAX_DURATION_MS: u64 = 60;

/// How long a task record lives in the store
pub const DEFAULT_TASK_TTL: Duration = Duration::from_secs(100);

/// Unique key of a task within one population pass
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an existing key
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of the `index`-th task of a run
    pub fn for_index(index: usize) -> Self {
        Self(format!("command-{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A task as written by the producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub duration_ms: u64,
}

impl Task {
    pub fn new(id: TaskId, duration_ms: u64) -> Self {
        Self { id, duration_ms }
    }

    /// Encode as store fields
    pub fn to_fields(&self) -> Fields {
        Fields::from([(DURATION_FIELD.to_string(), self.duration_ms.to_string())])
    }
}

/// A task payload as read back by a worker
///
/// Fields are kept raw; nothing guarantees another writer used the same
/// encoding, so `duration` is validated on access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub fields: Fields,
}

impl TaskRecord {
    pub fn new(id: TaskId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Raw value of a payload field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Parse the simulated duration
    ///
    /// Any signed integer is accepted; negative values mean no delay.
    pub fn duration(&self) -> TaskResult<Duration> {
        let raw = self.field(DURATION_FIELD).ok_or_else(|| TaskError::MissingField {
            id: self.id.to_string(),
            field: DURATION_FIELD,
        })?;

        let ms: i64 = raw.parse().map_err(|_| TaskError::InvalidDuration {
            id: self.id.to_string(),
            value: raw.to_string(),
        })?;

        Ok(Duration::from_millis(ms.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids() {
        assert_eq!(TaskId::for_index(0).as_str(), "command-0");
        assert_eq!(TaskId::for_index(42).to_string(), "command-42");
    }

    #[test]
    fn test_duration_round_trip() {
        let task = Task::new(TaskId::for_index(7), 37);
        let record = TaskRecord::new(task.id.clone(), task.to_fields());
        assert_eq!(record.duration().unwrap(), Duration::from_millis(37));
    }

    #[test]
    fn test_duration_errors() {
        let id = TaskId::from("command-1");

        let record = TaskRecord::new(
            id.clone(),
            Fields::from([(DURATION_FIELD.to_string(), "fast".to_string())]),
        );
        assert_eq!(
            record.duration(),
            Err(TaskError::InvalidDuration {
                id: "command-1".into(),
                value: "fast".into()
            })
        );

        let record = TaskRecord::new(id, Fields::new());
        assert!(matches!(
            record.duration(),
            Err(TaskError::MissingField { field: "duration", .. })
        ));
    }

    fn record_with(raw: &str) -> TaskRecord {
        TaskRecord::new(
            TaskId::from("command-2"),
            Fields::from([(DURATION_FIELD.to_string(), raw.to_string())]),
        )
    }

    #[test]
    fn test_negative_duration_means_no_delay() {
        assert_eq!(record_with("-5").duration().unwrap(), Duration::ZERO);
        assert_eq!(record_with("+7").duration().unwrap(), Duration::from_millis(7));
    }

    #[test]
    fn test_padded_duration_is_rejected() {
        for raw in [" 5", "5 ", "", "5.0"] {
            assert!(
                matches!(record_with(raw).duration(), Err(TaskError::InvalidDuration { .. })),
                "{:?} should not parse",
                raw
            );
        }
    }
}
