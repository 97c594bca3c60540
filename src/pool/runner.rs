//! Structured run of producer, workers and coordinator

use crate::bus::CompletionBus;
use crate::coordinator::{Coordinator, CoordinatorReport, DEFAULT_POLL_INTERVAL};
use crate::error::{CoordinatorError, Result, WorkerError};
use crate::producer::{PopulateReport, Producer, ProducerConfig};
use crate::queue::WorkQueue;
use crate::store::Store;
use crate::task::{TaskStore, DEFAULT_TASK_TTL};
use crate::worker::{Worker, WorkerStats};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How long the coordinator may keep waiting once every worker is joined
pub const DEFAULT_FINISH_GRACE: Duration = Duration::from_secs(2);

/// Runtime settings for one run
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Number of tasks to produce
    pub tasks: usize,
    /// Expiry of task records
    pub task_ttl: Duration,
    pub producer: ProducerConfig,
    /// Abort when the store health check fails
    pub strict_health: bool,
    pub finish_grace: Duration,
    /// Cancel the run after this long
    pub deadline: Option<Duration>,
    /// Durable counter poll interval of the coordinator
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            tasks: 100,
            task_ttl: DEFAULT_TASK_TTL,
            producer: ProducerConfig::default(),
            strict_health: false,
            finish_grace: DEFAULT_FINISH_GRACE,
            deadline: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of a run
#[derive(Debug)]
pub struct RunReport {
    /// Identifies this run in logs
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub healthy: bool,
    pub populate: PopulateReport,
    /// Stats of every worker that was joined, ordered by id
    pub workers: Vec<WorkerStats>,
    /// Workers that panicked or were aborted
    pub worker_failures: Vec<WorkerError>,
    pub coordinator: std::result::Result<CoordinatorReport, CoordinatorError>,
    /// Queue length after the run
    pub final_queue_len: Option<u64>,
    /// Whether the run was cancelled
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn tasks_completed(&self) -> u64 {
        self.workers.iter().map(|w| w.tasks_completed).sum()
    }

    pub fn tasks_skipped(&self) -> u64 {
        self.workers.iter().map(|w| w.tasks_skipped).sum()
    }

    pub fn publish_failures(&self) -> u64 {
        self.workers.iter().map(|w| w.publish_failures).sum()
    }

    /// Summed simulated work across workers
    pub fn busy_time(&self) -> Duration {
        self.workers.iter().map(|w| w.busy_time).sum()
    }

    /// Every worker joined and the coordinator saw all of them finish
    pub fn is_complete(&self) -> bool {
        self.worker_failures.is_empty() && self.coordinator.is_ok() && !self.cancelled
    }
}

/// Runs producer, workers and coordinator against one store
pub struct WorkerPool {
    store: Arc<dyn Store>,
    config: WorkerPoolConfig,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn Store>, config: WorkerPoolConfig) -> Self {
        Self {
            store,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Token that cancels the run (Ctrl+C, deadline)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run one batch
    ///
    /// Errors are limited to an invalid producer config and a failed health
    /// check with `strict_health` set. Everything else is logged and
    /// reflected in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.run_batch(run_id).instrument(span).await
    }

    async fn run_batch(&self, run_id: Uuid) -> Result<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let config = &self.config;
        config.producer.validate()?;

        let healthy = match self.store.health_check().await {
            Ok(()) => {
                debug!("Store is healthy");
                true
            }
            Err(e) if config.strict_health => return Err(e.into()),
            Err(e) => {
                error!(error = %e, "Store health check failed, continuing");
                false
            }
        };

        let queue = WorkQueue::new(self.store.clone());
        let tasks = TaskStore::new(self.store.clone(), config.task_ttl);
        let bus = CompletionBus::new(self.store.clone());

        if let Err(e) = bus.reset_finished_workers().await {
            warn!(error = %e, "Could not reset finished counter");
        }

        let producer = Producer::new(tasks.clone(), queue.clone(), config.producer);
        let populate = producer.populate(config.tasks).await;

        let deadline = config.deadline.map(|limit| self.spawn_deadline(limit));

        // Subscribed before the first worker exists
        let coordinator =
            Coordinator::new(bus.clone()).with_poll_interval(config.poll_interval);
        let coordinator_cancel = self.shutdown.child_token();
        let mut coordinator_handle = self.spawn_coordinator(coordinator, &coordinator_cancel).await;

        info!(workers = config.workers, "Starting workers");
        let handles: Vec<(usize, JoinHandle<WorkerStats>)> = (0..config.workers)
            .map(|id| {
                let worker = Worker::new(id, queue.clone(), tasks.clone(), bus.clone())
                    .with_shutdown(self.shutdown.clone());
                let span = info_span!("worker", run_id = %run_id, id);
                (id, tokio::spawn(worker.run().instrument(span)))
            })
            .collect();

        let mut workers = Vec::with_capacity(handles.len());
        let mut worker_failures = Vec::new();
        for (id, handle) in handles {
            match handle.await {
                Ok(stats) => workers.push(stats),
                Err(e) => {
                    let failure = WorkerError::Panicked {
                        id,
                        message: e.to_string(),
                    };
                    error!(error = %failure, "Worker did not finish");
                    worker_failures.push(failure);
                }
            }
        }

        let joined = match tokio::time::timeout(config.finish_grace, &mut coordinator_handle).await
        {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    grace_ms = config.finish_grace.as_millis() as u64,
                    "Coordinator still waiting after workers exited, cancelling"
                );
                coordinator_cancel.cancel();
                coordinator_handle.await
            }
        };
        let coordinator = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Coordinator task failed");
                Err(CoordinatorError::SubscriptionClosed {
                    observed: 0,
                    expected: config.workers,
                })
            }
        };
        if let Err(e) = &coordinator {
            warn!(error = %e, "Coordinator did not see every worker finish");
        }

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let final_queue_len = match queue.len().await {
            Ok(len) => Some(len),
            Err(e) => {
                warn!(error = %e, "Could not read final queue length");
                None
            }
        };

        Ok(RunReport {
            run_id,
            started_at,
            healthy,
            populate,
            workers,
            worker_failures,
            coordinator,
            final_queue_len,
            cancelled: self.shutdown.is_cancelled(),
            elapsed: start.elapsed(),
        })
    }

    /// Subscribe and start the coordinator wait in its own task
    async fn spawn_coordinator(
        &self,
        coordinator: Coordinator,
        cancel: &CancellationToken,
    ) -> JoinHandle<std::result::Result<CoordinatorReport, CoordinatorError>> {
        let expected = self.config.workers;
        let cancel = cancel.clone();

        match coordinator.subscribe().await {
            Ok(watch) => tokio::spawn(
                async move { coordinator.await_with(watch, expected, &cancel).await }
                    .in_current_span(),
            ),
            Err(e) => {
                error!(error = %e, "Could not subscribe to finished workers");
                tokio::spawn(async move { Err(CoordinatorError::Store(e)) })
            }
        }
    }

    fn spawn_deadline(&self, limit: Duration) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    warn!(deadline_s = limit.as_secs_f64(), "Deadline reached, cancelling run");
                    shutdown.cancel();
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::queue::ACTIVE_QUEUE_KEY;
    use crate::store::testing::FaultyStore;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    fn config(workers: usize, tasks: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers,
            tasks,
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes() {
        let pool = WorkerPool::new(Arc::new(MemoryStore::new()), config(3, 30));
        let report = pool.run().await.unwrap();

        assert!(report.healthy);
        assert!(report.is_complete());
        assert_eq!(report.populate.enqueued, 30);
        assert_eq!(report.tasks_completed(), 30);
        assert_eq!(report.final_queue_len, Some(0));

        let coordinator = report.coordinator.as_ref().unwrap();
        assert_eq!(coordinator.events_observed, 3);
        let ids: HashSet<_> = coordinator.finished_workers.iter().copied().collect();
        assert_eq!(ids, HashSet::from([0, 1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_more_workers_than_tasks() {
        let pool = WorkerPool::new(Arc::new(MemoryStore::new()), config(5, 2));
        let report = pool.run().await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.tasks_completed(), 2);
        assert_eq!(report.workers.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_failure_is_tolerated() {
        let store = Arc::new(FaultyStore::new());
        store.fail("health_check");
        let pool = WorkerPool::new(store, config(2, 4));

        let report = pool.run().await.unwrap();
        assert!(!report.healthy);
        assert_eq!(report.tasks_completed(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_health_aborts() {
        let store = Arc::new(FaultyStore::new());
        store.fail("health_check");
        let pool = WorkerPool::new(
            store,
            WorkerPoolConfig {
                strict_health: true,
                ..config(2, 4)
            },
        );

        assert!(matches!(pool.run().await, Err(PoolError::Store(_))));
    }

    #[tokio::test]
    async fn test_invalid_producer_config_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let pool = WorkerPool::new(
            store.clone(),
            WorkerPoolConfig {
                producer: ProducerConfig {
                    min_duration_ms: 50,
                    max_duration_ms: 5,
                },
                ..config(2, 4)
            },
        );

        assert!(matches!(pool.run().await, Err(PoolError::Config(_))));
        assert_eq!(store.length(ACTIVE_QUEUE_KEY).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_run() {
        let pool = WorkerPool::new(
            Arc::new(MemoryStore::new()),
            WorkerPoolConfig {
                deadline: Some(Duration::from_millis(100)),
                producer: ProducerConfig {
                    min_duration_ms: 50,
                    max_duration_ms: 50,
                },
                ..config(1, 100)
            },
        );

        let report = pool.run().await.unwrap();
        assert!(report.cancelled);
        assert!(!report.is_complete());
        assert!(report.tasks_completed() < 100);
        assert!(report.final_queue_len.unwrap() > 0);
        assert_eq!(report.workers[0].finish_reason, crate::worker::FinishReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coordinator_subscribe_failure_is_reported() {
        let store = Arc::new(FaultyStore::new());
        store.fail("subscribe");
        let pool = WorkerPool::new(store, config(2, 4));

        let report = pool.run().await.unwrap();
        assert_eq!(report.tasks_completed(), 4);
        assert!(matches!(report.coordinator, Err(CoordinatorError::Store(_))));
    }
}
