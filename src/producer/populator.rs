//! Batch population of the work queue

use crate::error::ConfigError;
use crate::queue::WorkQueue;
use crate::task::{Task, TaskId, TaskStore, DEFAULT_MAX_DURATION_MS, DEFAULT_MIN_DURATION_MS};

use rand::Rng;
use tracing::{debug, info, warn};

/// Settings for generated tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerConfig {
    /// Shortest simulated duration (ms)
    pub min_duration_ms: u64,
    /// Longest simulated duration (ms, inclusive)
    pub max_duration_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: DEFAULT_MIN_DURATION_MS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
        }
    }
}

impl ProducerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_duration_ms > self.max_duration_ms {
            return Err(ConfigError::InvalidDurationRange {
                min: self.min_duration_ms,
                max: self.max_duration_ms,
            });
        }
        Ok(())
    }
}

/// Outcome of one population pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    /// Tasks asked for
    pub requested: usize,
    /// Tasks written and queued
    pub enqueued: usize,
    /// Tasks skipped after a store error
    pub failed: usize,
    /// Queue length observed afterwards (diagnostic only)
    pub queue_len: Option<u64>,
}

/// Writes tasks and queues their ids
pub struct Producer {
    tasks: TaskStore,
    queue: WorkQueue,
    config: ProducerConfig,
}

impl Producer {
    pub fn new(tasks: TaskStore, queue: WorkQueue, config: ProducerConfig) -> Self {
        Self {
            tasks,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Clear the queue, then create and queue `count` tasks
    ///
    /// A task whose write fails is logged and never queued. Nothing written
    /// for it is cleaned up.
    pub async fn populate(&self, count: usize) -> PopulateReport {
        let mut report = PopulateReport {
            requested: count,
            ..Default::default()
        };

        if let Err(e) = self.queue.clear().await {
            warn!(queue = self.queue.key(), error = %e, "Could not clear work queue");
        }

        for index in 0..count {
            let task = Task::new(TaskId::for_index(index), self.random_duration());

            if let Err(e) = self.tasks.put(&task).await {
                warn!(task = %task.id, error = %e, "Could not store task, skipping");
                report.failed += 1;
                continue;
            }

            if let Err(e) = self.queue.enqueue(&task.id).await {
                warn!(task = %task.id, error = %e, "Could not queue task, skipping");
                report.failed += 1;
                continue;
            }

            debug!(task = %task.id, duration_ms = task.duration_ms, "Queued task");
            report.enqueued += 1;
        }

        report.queue_len = match self.queue.len().await {
            Ok(len) => Some(len),
            Err(e) => {
                warn!(error = %e, "Could not read work queue length");
                None
            }
        };

        info!(
            "Populated {} tasks out of {}",
            report.queue_len.unwrap_or(report.enqueued as u64),
            count
        );
        report
    }

    fn random_duration(&self) -> u64 {
        rand::rng().random_range(self.config.min_duration_ms..=self.config.max_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Dequeued;
    use crate::store::testing::FaultyStore;
    use crate::store::{MemoryStore, Store};
    use std::sync::Arc;
    use std::time::Duration;

    fn producer(store: Arc<dyn Store>, config: ProducerConfig) -> (Producer, TaskStore, WorkQueue) {
        let tasks = TaskStore::new(store.clone(), Duration::from_secs(100));
        let queue = WorkQueue::new(store);
        (
            Producer::new(tasks.clone(), queue.clone(), config),
            tasks,
            queue,
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(ProducerConfig::default().validate().is_ok());

        let fixed = ProducerConfig {
            min_duration_ms: 5,
            max_duration_ms: 5,
        };
        assert!(fixed.validate().is_ok());

        let inverted = ProducerConfig {
            min_duration_ms: 60,
            max_duration_ms: 10,
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidDurationRange { min: 60, max: 10 })
        ));
    }

    #[tokio::test]
    async fn test_populate_queues_every_task() {
        let (producer, tasks, queue) =
            producer(Arc::new(MemoryStore::new()), ProducerConfig::default());

        let report = producer.populate(20).await;
        assert_eq!(report.requested, 20);
        assert_eq!(report.enqueued, 20);
        assert_eq!(report.failed, 0);
        assert_eq!(report.queue_len, Some(20));

        for index in 0..20 {
            let Dequeued::Claimed(id) = queue.dequeue().await.unwrap() else {
                panic!("queue ran dry at {}", index);
            };
            assert_eq!(id, TaskId::for_index(index));

            let duration = tasks.get(&id).await.unwrap().unwrap().duration().unwrap();
            assert!((10..=60).contains(&(duration.as_millis() as u64)));
        }
    }

    #[tokio::test]
    async fn test_populate_clears_stale_entries() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (producer, _, queue) = producer(store, ProducerConfig::default());
        queue.enqueue(&TaskId::from("leftover")).await.unwrap();

        producer.populate(2).await;
        assert_eq!(
            queue.dequeue().await.unwrap(),
            Dequeued::Claimed(TaskId::for_index(0))
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_skipped() {
        let store = Arc::new(FaultyStore::new());
        store.fail_on("put", "command-1");
        let (producer, _, queue) = producer(store, ProducerConfig::default());

        let report = producer.populate(3).await;
        assert_eq!(report.enqueued, 2);
        assert_eq!(report.failed, 1);

        let mut claimed = Vec::new();
        while let Dequeued::Claimed(id) = queue.dequeue().await.unwrap() {
            claimed.push(id);
        }
        assert_eq!(claimed, vec![TaskId::for_index(0), TaskId::for_index(2)]);
    }

    #[tokio::test]
    async fn test_failed_enqueue_is_skipped() {
        let store = Arc::new(FaultyStore::new());
        store.fail("push_tail");
        let (producer, tasks, queue) = producer(store, ProducerConfig::default());

        let report = producer.populate(3).await;
        assert_eq!(report.enqueued, 0);
        assert_eq!(report.failed, 3);
        assert_eq!(report.queue_len, Some(0));

        // Records were written before the enqueue failed
        assert!(tasks.get(&TaskId::for_index(1)).await.unwrap().is_some());
        assert_eq!(queue.dequeue().await.unwrap(), Dequeued::Empty);
    }

    #[tokio::test]
    async fn test_failed_expire_is_skipped() {
        let store = Arc::new(FaultyStore::new());
        store.fail_on("expire", "command-0");
        let (producer, _, queue) = producer(store, ProducerConfig::default());

        let report = producer.populate(2).await;
        assert_eq!(report.enqueued, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            queue.dequeue().await.unwrap(),
            Dequeued::Claimed(TaskId::for_index(1))
        );
        assert_eq!(queue.dequeue().await.unwrap(), Dequeued::Empty);
    }

    #[tokio::test]
    async fn test_zero_tasks() {
        let (producer, _, queue) =
            producer(Arc::new(MemoryStore::new()), ProducerConfig::default());
        let report = producer.populate(0).await;
        assert_eq!(report.enqueued, 0);
        assert_eq!(report.queue_len, Some(0));
        assert_eq!(queue.dequeue().await.unwrap(), Dequeued::Empty);
    }
}
