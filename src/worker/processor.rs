//! Claim/process/publish loop of a single worker

use crate::bus::{CompletionBus, CompletionEvent, WorkerFinishedEvent};
use crate::error::{Result, TaskError};
use crate::queue::{Dequeued, WorkQueue};
use crate::task::{TaskId, TaskStore};

use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a worker stopped claiming tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishReason {
    /// The queue reported empty
    #[default]
    Drained,
    /// Popping from the queue failed
    QueueFailure,
    /// Shutdown was requested
    Cancelled,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Drained => write!(f, "drained"),
            FinishReason::QueueFailure => write!(f, "queue failure"),
            FinishReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final statistics from one worker
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub worker_id: usize,
    /// Tasks processed and announced
    pub tasks_completed: u64,
    /// Tasks claimed but not processed (missing or malformed record)
    pub tasks_skipped: u64,
    /// Completion events that could not be published
    pub publish_failures: u64,
    /// Total simulated work
    pub busy_time: Duration,
    /// Whether the finished announcement reached the store
    pub announced: bool,
    pub finish_reason: FinishReason,
    /// Wall time from start to finish
    pub elapsed: Duration,
}

enum WorkerState {
    Idle,
    Claiming,
    Processing(TaskId),
    Publishing(TaskId),
    Finished(FinishReason),
}

/// One member of the pool
pub struct Worker {
    id: usize,
    queue: WorkQueue,
    tasks: TaskStore,
    bus: CompletionBus,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(id: usize, queue: WorkQueue, tasks: TaskStore, bus: CompletionBus) -> Self {
        Self {
            id,
            queue,
            tasks,
            bus,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop claiming new tasks once `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until the queue is empty, the queue fails, or shutdown
    ///
    /// Always ends with exactly one finished announcement. A task that is
    /// already being processed when shutdown arrives is completed first.
    pub async fn run(self) -> WorkerStats {
        let start = Instant::now();
        let mut stats = WorkerStats {
            worker_id: self.id,
            ..Default::default()
        };

        let mut state = WorkerState::Idle;
        loop {
            state = match state {
                WorkerState::Idle => {
                    if self.shutdown.is_cancelled() {
                        WorkerState::Finished(FinishReason::Cancelled)
                    } else {
                        WorkerState::Claiming
                    }
                }
                WorkerState::Claiming => match self.queue.dequeue().await {
                    Ok(Dequeued::Claimed(id)) => WorkerState::Processing(id),
                    Ok(Dequeued::Empty) => WorkerState::Finished(FinishReason::Drained),
                    Err(e) => {
                        error!(
                            worker = self.id,
                            transient = e.is_transient(),
                            error = %e,
                            "Could not claim task"
                        );
                        WorkerState::Finished(FinishReason::QueueFailure)
                    }
                },
                WorkerState::Processing(id) => match self.process(&id).await {
                    Ok(duration) => {
                        stats.busy_time += duration;
                        stats.tasks_completed += 1;
                        WorkerState::Publishing(id)
                    }
                    Err(e) => {
                        warn!(worker = self.id, task = %id, error = %e, "Skipping task");
                        stats.tasks_skipped += 1;
                        WorkerState::Idle
                    }
                },
                WorkerState::Publishing(id) => {
                    let event = CompletionEvent::new(id, self.id);
                    if let Err(e) = self.bus.publish(&event).await {
                        warn!(worker = self.id, task = %event.task_id, error = %e, "Could not publish completion");
                        stats.publish_failures += 1;
                    }
                    WorkerState::Idle
                }
                WorkerState::Finished(reason) => {
                    stats.finish_reason = reason;
                    break;
                }
            };
        }

        stats.announced = self.announce_finished().await;
        stats.elapsed = start.elapsed();

        info!(
            worker = self.id,
            completed = stats.tasks_completed,
            skipped = stats.tasks_skipped,
            reason = %stats.finish_reason,
            "Worker {} slept for {} ms",
            self.id,
            stats.busy_time.as_millis()
        );
        stats
    }

    /// Read the task and sleep for its duration
    async fn process(&self, id: &TaskId) -> Result<Duration> {
        let record = self
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| TaskError::NotFound { id: id.to_string() })?;
        let duration = record.duration()?;

        debug!(worker = self.id, task = %id, ms = duration.as_millis() as u64, "Processing task");
        tokio::time::sleep(duration).await;
        Ok(duration)
    }

    /// Count this worker as finished, then publish the event
    async fn announce_finished(&self) -> bool {
        let counted = match self.bus.record_worker_finished().await {
            Ok(total) => {
                debug!(worker = self.id, total, "Recorded finished worker");
                true
            }
            Err(e) => {
                error!(worker = self.id, error = %e, "Could not record finished worker");
                false
            }
        };

        if let Err(e) = self.bus.publish(&WorkerFinishedEvent::new(self.id)).await {
            error!(worker = self.id, error = %e, "Could not publish finished event");
        }
        counted
    }
}
