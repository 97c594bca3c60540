//! Waiting for finished workers

use crate::bus::{CompletionBus, EventStream, WorkerFinishedEvent};
use crate::error::{CoordinatorError, StoreResult};

use std::collections::HashSet;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the durable counter is read while waiting
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Shortest accepted counter poll interval
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What the coordinator saw before returning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorReport {
    /// Workers the run was started with
    pub expected: usize,
    /// Finished events received (duplicates included)
    pub events_observed: usize,
    /// Last value read from the durable counter
    pub counter: u64,
    /// Worker ids in arrival order
    pub finished_workers: Vec<usize>,
    /// Events for a worker id already seen
    pub duplicates: usize,
    /// Events without a worker id
    pub anonymous: usize,
}

impl CoordinatorReport {
    fn new(expected: usize) -> Self {
        Self {
            expected,
            ..Default::default()
        }
    }

    /// Finished workers according to the better of both sources
    pub fn observed(&self) -> usize {
        self.events_observed.max(self.counter as usize)
    }

    pub fn is_complete(&self) -> bool {
        self.observed() >= self.expected
    }

    /// Whether completion was reached without every event arriving
    pub fn completed_by_counter(&self) -> bool {
        self.is_complete() && self.events_observed < self.expected
    }

    fn record(&mut self, event: WorkerFinishedEvent, seen: &mut HashSet<usize>) {
        self.events_observed += 1;
        match event.worker_id {
            Some(id) => {
                if !seen.insert(id) {
                    warn!(worker = id, "Worker reported finished more than once");
                    self.duplicates += 1;
                }
                self.finished_workers.push(id);
            }
            None => {
                warn!("Finished event without a worker id");
                self.anonymous += 1;
            }
        }
    }
}

/// Live subscription to the worker-finished channel
///
/// Taken before any worker starts so that no event can be missed.
pub struct FinishedWatch {
    events: EventStream<WorkerFinishedEvent>,
}

/// Awaits the end of a run
#[derive(Clone)]
pub struct Coordinator {
    bus: CompletionBus,
    poll_interval: Duration,
}

impl Coordinator {
    pub fn new(bus: CompletionBus) -> Self {
        Self {
            bus,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the counter poll interval, raised to [`MIN_POLL_INTERVAL`]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Subscribe to worker-finished events
    pub async fn subscribe(&self) -> StoreResult<FinishedWatch> {
        Ok(FinishedWatch {
            events: self.bus.subscribe::<WorkerFinishedEvent>().await?,
        })
    }

    /// Subscribe, then wait for `expected` finished workers
    pub async fn await_all(
        &self,
        expected: usize,
        cancel: &CancellationToken,
    ) -> Result<CoordinatorReport, CoordinatorError> {
        let watch = self.subscribe().await?;
        self.await_with(watch, expected, cancel).await
    }

    /// Wait on an existing subscription for `expected` finished workers
    ///
    /// Returns once the finished-event count or the durable counter reaches
    /// `expected`, and unsubscribes. Cancelling `cancel` ends the wait with
    /// [`CoordinatorError::Cancelled`].
    pub async fn await_with(
        &self,
        watch: FinishedWatch,
        expected: usize,
        cancel: &CancellationToken,
    ) -> Result<CoordinatorReport, CoordinatorError> {
        let FinishedWatch { mut events } = watch;
        let mut report = CoordinatorReport::new(expected);
        let mut seen = HashSet::new();
        let mut events_open = true;

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !report.is_complete() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    events.close();
                    return Err(CoordinatorError::Cancelled {
                        observed: report.observed(),
                        expected,
                    });
                }

                event = events.next(), if events_open => match event {
                    Some(event) => {
                        report.record(event, &mut seen);
                        info!(
                            "Worker has finished. {}/{} are completed",
                            report.events_observed, expected
                        );
                    }
                    None => {
                        warn!("Finished-event subscription closed, relying on counter");
                        events_open = false;
                    }
                },

                _ = poll.tick() => match self.bus.finished_workers().await {
                    Ok(count) => {
                        if count != report.counter {
                            debug!(count, expected, "Finished counter advanced");
                        }
                        report.counter = report.counter.max(count);
                    }
                    Err(e) if !events_open => {
                        warn!(error = %e, "No finished events and no counter");
                        return Err(CoordinatorError::SubscriptionClosed {
                            observed: report.observed(),
                            expected,
                        });
                    }
                    Err(e) => warn!(error = %e, "Could not read finished counter"),
                },
            }
        }

        events.close();
        if report.completed_by_counter() {
            warn!(
                events = report.events_observed,
                counter = report.counter,
                "Finished events were lost, completion taken from counter"
            );
        }
        info!(expected, "All workers finished");
        Ok(report)
    }
}
