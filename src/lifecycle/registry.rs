//! Registry of in-flight background work.
//!
//! # Responsibilities
//! - Spawn submitted units of work and track them while they run
//! - Observe each terminal outcome exactly once and classify it
//! - Serve point-in-time snapshots to diagnostics
//! - Fan cooperative cancellation out to every active task
//!
//! # Design Decisions
//! - One owned registry per process, shared by cloning the handle
//! - Completion is reported over a channel to a single observer loop; the
//!   observer is the only code that removes entries from the active set
//! - The active set is guarded by one mutex that is never held across an await
//! - Failures and panics are contained at the registry boundary
//! - A bounded history of finished tasks is kept for diagnostics

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::panic_message;
use crate::observability::metrics;

/// Error type returned by units of work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Capacity of the finished-task broadcast channel.
const FINISHED_CHANNEL_CAPACITY: usize = 256;

/// Opaque, monotonically increasing task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Task is running (or resolved but not yet observed).
    Running,
    /// Task completed successfully.
    Completed,
    /// Task returned an error or panicked.
    Failed,
    /// Task finished after cancellation was requested, or was abandoned.
    Cancelled,
}

/// Terminal classification of a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed => TaskState::Completed,
            TaskOutcome::Failed(_) => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TaskOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Cancelled => "cancelled",
        }
    }
}

/// Handle to a submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    name: Arc<str>,
    token: CancellationToken,
    resolved: Arc<OnceLock<TaskOutcome>>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cooperative cancellation of this task only.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the unit of work has resolved.
    pub fn is_finished(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// The terminal outcome, once resolved.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.resolved.get().cloned()
    }
}

/// Read-only copy of an active task for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub started_at: DateTime<Utc>,
    /// The unit of work resolved but the observer has not removed it yet.
    pub done: bool,
    /// Cancellation was requested.
    pub cancelled: bool,
    pub exception: Option<String>,
}

/// A task that reached a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct FinishedTask {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub exception: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub active: usize,
}

struct ActiveTask {
    name: Arc<str>,
    started_at: DateTime<Utc>,
    token: CancellationToken,
    resolved: Arc<OnceLock<TaskOutcome>>,
}

impl ActiveTask {
    fn snapshot(&self, id: TaskId) -> TaskSnapshot {
        let outcome = self.resolved.get();
        TaskSnapshot {
            id,
            name: self.name.to_string(),
            state: TaskState::Running,
            started_at: self.started_at,
            done: outcome.is_some(),
            cancelled: self.token.is_cancelled(),
            exception: outcome.and_then(|o| o.error()).map(str::to_string),
        }
    }
}

struct Completion {
    id: TaskId,
    outcome: TaskOutcome,
    finished_at: DateTime<Utc>,
}

struct RegistryInner {
    next_id: AtomicU64,
    active: Mutex<HashMap<TaskId, ActiveTask>>,
    history: Mutex<VecDeque<FinishedTask>>,
    history_limit: usize,
    finished_tx: broadcast::Sender<FinishedTask>,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl RegistryInner {
    fn lock_active(&self) -> MutexGuard<'_, HashMap<TaskId, ActiveTask>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, finished: FinishedTask) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.history_limit {
            history.pop_front();
        }
        history.push_back(finished);
    }

    fn observe(&self, completion: Completion) {
        let (entry, active) = {
            let mut tasks = self.lock_active();
            let entry = tasks.remove(&completion.id);
            (entry, tasks.len())
        };

        let Some(entry) = entry else {
            tracing::debug!(
                task_id = %completion.id,
                outcome = completion.outcome.label(),
                "Completion for abandoned task ignored"
            );
            return;
        };

        match &completion.outcome {
            TaskOutcome::Completed => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                tracing::info!(task_id = %completion.id, task_name = %entry.name, "Background task completed");
            }
            TaskOutcome::Failed(error) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    task_id = %completion.id,
                    task_name = %entry.name,
                    error = %error,
                    "Background task failed"
                );
            }
            TaskOutcome::Cancelled => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                tracing::info!(task_id = %completion.id, task_name = %entry.name, "Background task cancelled");
            }
        }
        metrics::record_task_finished(completion.outcome.label(), active);

        let finished = FinishedTask {
            id: completion.id,
            name: entry.name.to_string(),
            state: completion.outcome.state(),
            exception: completion.outcome.error().map(str::to_string),
            started_at: entry.started_at,
            finished_at: completion.finished_at,
        };
        self.remember(finished.clone());
        // No subscribers is the normal case outside of a drain.
        let _ = self.finished_tx.send(finished);
    }
}

/// Process-wide registry of background tasks.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl TaskRegistry {
    /// Create a registry keeping up to `history_limit` finished tasks.
    ///
    /// Spawns the observer loop, so it must be called from within a Tokio
    /// runtime. The loop exits once every registry handle and every running
    /// task is gone.
    pub fn new(history_limit: usize) -> Self {
        let (finished_tx, _) = broadcast::channel(FINISHED_CHANNEL_CAPACITY);
        let inner = Arc::new(RegistryInner {
            next_id: AtomicU64::new(0),
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(history_limit)),
            history_limit,
            finished_tx,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        });

        let (completions, mut rx) = mpsc::unbounded_channel::<Completion>();
        let observer = inner.clone();
        tokio::spawn(async move {
            while let Some(completion) = rx.recv().await {
                observer.observe(completion);
            }
            tracing::debug!("Task observer loop stopped");
        });

        Self { inner, completions }
    }

    /// Schedule a unit of work and return immediately.
    ///
    /// `work` receives the task's cancellation token. The task is visible to
    /// [`list_active`](Self::list_active) before this returns.
    pub fn submit<F, Fut>(&self, name: impl Into<String>, work: F) -> TaskHandle
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let name: Arc<str> = Arc::from(name.into());
        let token = CancellationToken::new();
        let resolved = Arc::new(OnceLock::new());

        let active = {
            let mut tasks = self.inner.lock_active();
            tasks.insert(
                id,
                ActiveTask {
                    name: name.clone(),
                    started_at: Utc::now(),
                    token: token.clone(),
                    resolved: resolved.clone(),
                },
            );
            tasks.len()
        };
        self.inner.submitted.fetch_add(1, Ordering::SeqCst);
        metrics::record_task_submitted(active);

        let span = tracing::info_span!("background_task", task_id = %id, task_name = %name);
        let worker = tokio::spawn(work(token.clone()).instrument(span));

        let completions = self.completions.clone();
        let supervisor_token = token.clone();
        let supervisor_resolved = resolved.clone();
        tokio::spawn(async move {
            let outcome = classify(worker.await, supervisor_token.is_cancelled());
            let _ = supervisor_resolved.set(outcome.clone());
            let _ = completions.send(Completion {
                id,
                outcome,
                finished_at: Utc::now(),
            });
        });

        tracing::debug!(task_id = %id, task_name = %name, "Background task submitted");

        TaskHandle {
            id,
            name,
            token,
            resolved,
        }
    }

    /// Point-in-time copy of the active set, ordered by submission.
    pub fn list_active(&self) -> Vec<TaskSnapshot> {
        let mut snapshots: Vec<TaskSnapshot> = {
            let tasks = self.inner.lock_active();
            tasks.iter().map(|(id, task)| task.snapshot(*id)).collect()
        };
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock_active().len()
    }

    pub fn is_active(&self, id: TaskId) -> bool {
        self.inner.lock_active().contains_key(&id)
    }

    /// Recently finished tasks, oldest first.
    pub fn recent(&self) -> Vec<FinishedTask> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Request cancellation of every active task without waiting.
    ///
    /// Returns the ids that were signalled.
    pub fn cancel_all(&self) -> Vec<TaskId> {
        let tokens: Vec<(TaskId, CancellationToken)> = {
            let tasks = self.inner.lock_active();
            tasks.iter().map(|(id, t)| (*id, t.token.clone())).collect()
        };

        for (_, token) in &tokens {
            token.cancel();
        }

        if !tokens.is_empty() {
            tracing::info!(count = tokens.len(), "Cancellation requested for all active tasks");
        }
        tokens.into_iter().map(|(id, _)| id).collect()
    }

    /// Forget every task still in the active set.
    ///
    /// An abandoned task resolves as cancelled on its handle and in history.
    /// The underlying work keeps running if it ignores cancellation; its later
    /// completion is discarded. A task that already resolved but was not yet
    /// observed keeps its real outcome.
    pub fn abandon_remaining(&self) -> Vec<TaskSnapshot> {
        let drained: Vec<(TaskId, ActiveTask)> = {
            let mut tasks = self.inner.lock_active();
            tasks.drain().collect()
        };

        let now = Utc::now();
        let mut abandoned = Vec::with_capacity(drained.len());
        for (id, task) in drained {
            task.token.cancel();
            let (outcome, exception, label) = match task.resolved.set(TaskOutcome::Cancelled) {
                Ok(()) => {
                    tracing::warn!(task_id = %id, task_name = %task.name, "Abandoning background task still running");
                    (
                        TaskOutcome::Cancelled,
                        Some("abandoned: still running when drain ended".to_string()),
                        "abandoned",
                    )
                }
                Err(_) => {
                    let outcome = task.resolved.get().cloned().unwrap_or(TaskOutcome::Cancelled);
                    let exception = outcome.error().map(str::to_string);
                    let label = outcome.label();
                    (outcome, exception, label)
                }
            };
            let counter = match &outcome {
                TaskOutcome::Completed => &self.inner.completed,
                TaskOutcome::Failed(_) => &self.inner.failed,
                TaskOutcome::Cancelled => &self.inner.cancelled,
            };
            counter.fetch_add(1, Ordering::SeqCst);
            self.inner.remember(FinishedTask {
                id,
                name: task.name.to_string(),
                state: outcome.state(),
                exception,
                started_at: task.started_at,
                finished_at: now,
            });
            metrics::record_task_finished(label, 0);
            abandoned.push(task.snapshot(id));
        }
        abandoned.sort_by_key(|s| s.id);
        abandoned
    }

    /// Subscribe to tasks as they are observed.
    pub fn subscribe(&self) -> broadcast::Receiver<FinishedTask> {
        self.inner.finished_tx.subscribe()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            submitted: self.inner.submitted.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
            cancelled: self.inner.cancelled.load(Ordering::SeqCst),
            active: self.active_count(),
        }
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}

fn classify(result: Result<Result<(), BoxError>, JoinError>, cancel_requested: bool) -> TaskOutcome {
    match result {
        Ok(Ok(())) if cancel_requested => TaskOutcome::Cancelled,
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
        Err(e) if e.is_cancelled() => TaskOutcome::Cancelled,
        Err(e) => match e.try_into_panic() {
            Ok(payload) => TaskOutcome::Failed(panic_message(payload.as_ref())),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        },
    }
}
