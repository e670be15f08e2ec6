//! Shutdown coordination: stop signal fan-out and task drain.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

use crate::lifecycle::registry::{FinishedTask, TaskId, TaskRegistry, TaskState};
use crate::observability::metrics;

/// Broadcast stop signal for the HTTP server and long-running loops.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of listeners still waiting for the signal.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A task that failed while being drained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTask {
    pub name: String,
    pub error: String,
}

/// What happened to the tasks that were active when a drain started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub completed: usize,
    pub cancelled: usize,
    pub failed: Vec<FailedTask>,
    /// Names of tasks still running when the drain gave up on them.
    pub abandoned: Vec<String>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

impl DrainReport {
    fn record(&mut self, task: FinishedTask) {
        match task.state {
            TaskState::Completed => self.completed += 1,
            TaskState::Cancelled => self.cancelled += 1,
            TaskState::Failed => self.failed.push(FailedTask {
                name: task.name,
                error: task.exception.unwrap_or_default(),
            }),
            TaskState::Running => {}
        }
    }
}

/// Drains the task registry on a deadline.
///
/// Only the first call to [`drain`](Self::drain) does any work.
pub struct ShutdownCoordinator {
    registry: TaskRegistry,
    drained: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            registry,
            drained: AtomicBool::new(false),
        }
    }

    pub fn has_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    /// Cancel every active task and wait for them, for at most `deadline`.
    ///
    /// Task failures are collected into the report, never raised. When this
    /// returns the registry's active set is empty, even if some work is in
    /// fact still running.
    pub async fn drain(&self, deadline: Duration) -> DrainReport {
        if self.drained.swap(true, Ordering::SeqCst) {
            tracing::debug!("Drain already performed, skipping");
            return DrainReport::default();
        }

        let started = Instant::now();
        let until = started + deadline;

        // Subscribe before cancelling so no completion can slip between.
        let mut finished = self.registry.subscribe();
        let mut pending: HashSet<TaskId> = self.registry.cancel_all().into_iter().collect();
        tracing::info!(tasks = pending.len(), deadline_ms = deadline.as_millis() as u64, "Draining background tasks");

        let mut report = DrainReport::default();
        while !pending.is_empty() {
            match tokio::time::timeout_at(until, finished.recv()).await {
                Ok(Ok(task)) => {
                    if pending.remove(&task.id) {
                        report.record(task);
                    }
                }
                Ok(Err(RecvError::Lagged(missed))) => {
                    tracing::warn!(missed, "Drain missed completion events");
                    pending.retain(|id| self.registry.is_active(*id));
                }
                Ok(Err(RecvError::Closed)) => break,
                Err(_) => {
                    report.timed_out = true;
                    break;
                }
            }
        }

        let stragglers = self.registry.abandon_remaining();
        report.abandoned = stragglers.into_iter().map(|s| s.name).collect();

        let elapsed = started.elapsed();
        report.elapsed_ms = elapsed.as_millis() as u64;
        metrics::record_drain(elapsed);

        if report.timed_out {
            tracing::warn!(
                abandoned = ?report.abandoned,
                elapsed_ms = report.elapsed_ms,
                "Drain incomplete: deadline reached with tasks still running"
            );
        } else {
            tracing::info!(
                completed = report.completed,
                cancelled = report.cancelled,
                failed = report.failed.len(),
                elapsed_ms = report.elapsed_ms,
                "Drain complete"
            );
        }
        for failure in &report.failed {
            tracing::warn!(task_name = %failure.name, error = %failure.error, "Task failed during drain");
        }

        report
    }
}
