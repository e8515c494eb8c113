//! # Sync Task Queue
//!
//! Serialized execution engine for sync and screenshot-upload tasks.
//!
//! ## Overview
//!
//! The queue admits tasks, keeps them in submission order and runs them one
//! at a time on a single background worker:
//!
//! - **Admission**: a sync task for a target missing from the
//!   [`TargetRegistry`] is dropped silently (`submit` returns `Ok(None)`).
//!   Screenshot uploads are never gated.
//! - **Bracketing**: when a task carries a process id, the process is paused
//!   before the task is queued and resumed after it ran, whatever the outcome.
//! - **Classification**: exit codes `0` and `6` are success. Any other code,
//!   a backend error or a panic in the operation is a failure.
//! - **Reporting**: failures of sync tasks emit [`SyncEvent::Failed`] and a
//!   clickable notification that opens the target's logs.
//! - **Busy edges**: [`QueueEvent::Busy`] fires `true` when a task is pushed
//!   onto an idle queue and `false` when the queue drains.
//!
//! Nothing is retried and nothing is persisted. A failed task never stops the
//! worker.
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::{SyncTask, TaskQueue};
//! use bridge_traits::{SyncOperation, SyncTarget};
//!
//! let handle = queue
//!     .submit(SyncTask::sync(SyncTarget::new(413150), SyncOperation::Download).with_process(4242))
//!     .await?;
//!
//! if let Some(handle) = handle {
//!     let outcome = handle.wait().await?;
//!     println!("exit code: {:?}", outcome.exit_code);
//! }
//! ```

use bridge_traits::{
    is_success_exit_code, ExitCode, Notification, NotificationAction, Notifier, ProcessId,
    SyncBackend, SyncOperation, SyncTarget,
};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent, SyncEvent};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::gate::ProcessGate;
use crate::registry::TargetRegistry;

// ============================================================================
// Task types
// ============================================================================

/// Type-safe task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new random task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a task runs on the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Run the sync tool for a target.
    Sync {
        target: SyncTarget,
        operation: SyncOperation,
    },
    /// Upload one screenshot of a user.
    Screenshot { user_id: String, url: String },
}

impl TaskKind {
    /// Target of a sync task.
    pub fn target(&self) -> Option<SyncTarget> {
        match self {
            TaskKind::Sync { target, .. } => Some(*target),
            TaskKind::Screenshot { .. } => None,
        }
    }
}

/// Result of a task, delivered to its completion hook and its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub kind: TaskKind,
    /// `None` when the operation returned an error or panicked.
    pub exit_code: Option<ExitCode>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code.is_some_and(is_success_exit_code)
    }
}

/// Callback run on the worker once the task finished.
pub type CompletionHook = Box<dyn FnOnce(TaskOutcome) -> BoxFuture<'static, ()> + Send>;

/// A unit of work for the queue.
pub struct SyncTask {
    kind: TaskKind,
    process_id: Option<ProcessId>,
    on_complete: Option<CompletionHook>,
}

impl SyncTask {
    /// Sync `target` with the given operation.
    pub fn sync(target: SyncTarget, operation: SyncOperation) -> Self {
        Self::from_kind(TaskKind::Sync { target, operation })
    }

    /// Upload a screenshot. Screenshot tasks bypass the admission gate.
    pub fn screenshot(user_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::from_kind(TaskKind::Screenshot {
            user_id: user_id.into(),
            url: url.into(),
        })
    }

    fn from_kind(kind: TaskKind) -> Self {
        Self {
            kind,
            process_id: None,
            on_complete: None,
        }
    }

    /// Pause `pid` while the task waits and runs.
    pub fn with_process(mut self, pid: ProcessId) -> Self {
        self.process_id = Some(pid);
        self
    }

    /// Like [`with_process`](Self::with_process) for an optional pid.
    pub fn with_optional_process(mut self, pid: Option<ProcessId>) -> Self {
        self.process_id = pid;
        self
    }

    /// Run `hook` on the worker after the task finished, before the next task
    /// starts.
    pub fn on_complete<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(TaskOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_complete = Some(Box::new(move |outcome| hook(outcome).boxed()));
        self
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn process_id(&self) -> Option<ProcessId> {
        self.process_id
    }
}

impl std::fmt::Debug for SyncTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTask")
            .field("kind", &self.kind)
            .field("process_id", &self.process_id)
            .field("has_hook", &self.on_complete.is_some())
            .finish()
    }
}

/// Handle to an admitted task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    done: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait until the task and its completion hook ran.
    pub async fn wait(self) -> Result<TaskOutcome> {
        self.done.await.map_err(|_| SyncError::TaskDropped {
            task_id: self.id.to_string(),
        })
    }
}

struct QueuedTask {
    id: TaskId,
    task: SyncTask,
    done: oneshot::Sender<TaskOutcome>,
}

// ============================================================================
// Queue
// ============================================================================

/// Tunables of the task queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long the failure notification stays visible
    pub failure_notification_duration: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            failure_notification_duration: core_runtime::config::DEFAULT_FAILURE_NOTIFICATION_DURATION,
        }
    }
}

/// State shared between the submitting side and the worker.
struct QueueShared {
    registry: Arc<TargetRegistry>,
    gate: ProcessGate,
    backend: Arc<dyn SyncBackend>,
    notifier: Arc<dyn Notifier>,
    event_bus: EventBus,
    config: QueueConfig,
    /// Admitted tasks not yet finished, including the running one.
    pending: Mutex<usize>,
    busy: watch::Sender<bool>,
}

impl QueueShared {
    /// Publish a busy edge. Callers hold the `pending` lock.
    fn set_busy(&self, busy: bool) {
        // event first, so `wait_idle` callers find it already published
        self.event_bus
            .emit(CoreEvent::Queue(QueueEvent::Busy { busy }))
            .ok();
        self.busy.send_replace(busy);
    }

    fn finish_one(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            debug!("All tasks finished");
            self.set_busy(false);
        }
    }
}

/// Single-worker FIFO queue of sync tasks.
///
/// Cloning yields another handle to the same queue. The worker stops once
/// every handle is dropped and the backlog is done.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<QueueShared>,
    sender: mpsc::UnboundedSender<QueuedTask>,
}

impl TaskQueue {
    /// Create the queue and spawn its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        registry: Arc<TargetRegistry>,
        gate: ProcessGate,
        backend: Arc<dyn SyncBackend>,
        notifier: Arc<dyn Notifier>,
        event_bus: EventBus,
        config: QueueConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (busy, _) = watch::channel(false);

        let shared = Arc::new(QueueShared {
            registry,
            gate,
            backend,
            notifier,
            event_bus,
            config,
            pending: Mutex::new(0),
            busy,
        });

        tokio::spawn(run_worker(Arc::clone(&shared), receiver));

        Self { shared, sender }
    }

    /// Admit a task.
    ///
    /// Returns `Ok(None)` when a sync task targets an ineligible target. The
    /// task then never runs and the queue state does not change.
    ///
    /// # Errors
    ///
    /// [`SyncError::QueueClosed`] if the worker is gone.
    #[instrument(skip(self, task), fields(kind = ?task.kind, pid = ?task.process_id))]
    pub async fn submit(&self, task: SyncTask) -> Result<Option<TaskHandle>> {
        if let TaskKind::Sync { target, .. } = &task.kind {
            if !self.shared.registry.has(*target) {
                debug!(target_id = target.id(), "Target has no sync filters, dropping task");
                return Ok(None);
            }
        }

        if let Some(pid) = task.process_id {
            self.shared.gate.pause(pid).await;
        }

        let id = TaskId::new();
        let (done, done_rx) = oneshot::channel();
        let process_id = task.process_id;

        if let Err(e) = self.push(QueuedTask { id, task, done }) {
            error!(task_id = %id, "Sync task queue is closed");
            if let Some(pid) = process_id {
                self.shared.gate.resume(pid).await;
            }
            return Err(e);
        }
        debug!(task_id = %id, "Task queued");

        Ok(Some(TaskHandle { id, done: done_rx }))
    }

    /// Push under the pending lock so the busy edge, the queued event and the
    /// channel order agree between concurrent submitters.
    fn push(&self, queued: QueuedTask) -> Result<()> {
        let mut pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        *pending += 1;
        if *pending == 1 {
            debug!("Starting task");
            self.shared.set_busy(true);
        }

        if let TaskKind::Sync { target, operation } = &queued.task.kind {
            self.shared
                .event_bus
                .emit(CoreEvent::Sync(SyncEvent::Queued {
                    task_id: queued.id.to_string(),
                    target: *target,
                    operation: *operation,
                }))
                .ok();
        }

        if self.sender.send(queued).is_err() {
            *pending -= 1;
            if *pending == 0 {
                self.shared.set_busy(false);
            }
            return Err(SyncError::QueueClosed);
        }
        Ok(())
    }

    /// Whether any task is pending or running.
    pub fn is_busy(&self) -> bool {
        self.pending() > 0
    }

    /// Number of admitted tasks not yet finished.
    pub fn pending(&self) -> usize {
        *self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Busy state as a watch channel.
    pub fn busy_watch(&self) -> watch::Receiver<bool> {
        self.shared.busy.subscribe()
    }

    /// Wait until the queue is idle. Returns immediately if it already is.
    pub async fn wait_idle(&self) -> Result<()> {
        let mut busy = self.busy_watch();
        busy.wait_for(|busy| !*busy)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::QueueClosed)
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker(shared: Arc<QueueShared>, mut receiver: mpsc::UnboundedReceiver<QueuedTask>) {
    debug!("Sync task worker started");

    while let Some(queued) = receiver.recv().await {
        let id = queued.id;
        if AssertUnwindSafe(run_task(&shared, queued))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(task_id = %id, "Sync task panicked outside its operation");
        }
        shared.finish_one();
    }

    debug!("Sync task worker stopped");
}

async fn run_task(shared: &QueueShared, queued: QueuedTask) {
    let QueuedTask { id, task, done } = queued;
    let SyncTask {
        kind,
        process_id,
        on_complete,
    } = task;

    if let TaskKind::Sync { target, operation } = &kind {
        shared
            .event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                task_id: id.to_string(),
                target: *target,
                operation: *operation,
            }))
            .ok();
    }

    let exit_code = execute(shared, id, &kind).await;

    if let Some(pid) = process_id {
        contain(id, "resume", shared.gate.resume(pid).map(drop)).await;
    }

    let outcome = TaskOutcome {
        task_id: id,
        kind,
        exit_code,
    };
    contain(id, "report", report(shared, &outcome)).await;

    if let Some(hook) = on_complete {
        let hook_outcome = outcome.clone();
        contain(id, "completion hook", async move { hook(hook_outcome).await }).await;
    }

    // the submitter may have dropped its handle
    let _ = done.send(outcome);
}

/// Run one post-operation stage, logging a panic instead of unwinding the worker.
async fn contain<F: Future<Output = ()>>(id: TaskId, stage: &str, stage_future: F) {
    if AssertUnwindSafe(stage_future).catch_unwind().await.is_err() {
        error!(task_id = %id, stage, "Task stage panicked");
    }
}

/// Run the operation, folding errors and panics into a missing exit code.
async fn execute(shared: &QueueShared, id: TaskId, kind: &TaskKind) -> Option<ExitCode> {
    let operation = async {
        match kind {
            TaskKind::Sync { target, operation } => shared.backend.run(*target, *operation).await,
            TaskKind::Screenshot { user_id, url } => {
                shared.backend.sync_screenshot(user_id, url).await
            }
        }
    };

    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(Ok(code)) => Some(code),
        Ok(Err(e)) => {
            error!(task_id = %id, error = %e, "Error processing task");
            None
        }
        Err(_) => {
            error!(task_id = %id, "Task operation panicked");
            None
        }
    }
}

pub(crate) fn format_exit_code(exit_code: Option<ExitCode>) -> String {
    exit_code.map_or_else(|| "unknown".to_string(), |code| code.to_string())
}

/// Log and publish the outcome of a sync task.
async fn report(shared: &QueueShared, outcome: &TaskOutcome) {
    let TaskKind::Sync { target, operation } = &outcome.kind else {
        return;
    };
    let task_id = outcome.task_id.to_string();

    if outcome.is_success() {
        info!(target_id = target.id(), operation = %operation, "Sync for \"{}\" finished", target.id());
        shared
            .event_bus
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                task_id,
                target: *target,
                operation: *operation,
                exit_code: outcome.exit_code.unwrap_or_default(),
            }))
            .ok();
        return;
    }

    let message = format!(
        "Sync for \"{}\" failed with exit code {}",
        target.display_name(),
        format_exit_code(outcome.exit_code)
    );
    error!(target_id = target.id(), operation = %operation, "{}", message);

    shared
        .event_bus
        .emit(CoreEvent::Sync(SyncEvent::Failed {
            task_id,
            target: *target,
            operation: *operation,
            exit_code: outcome.exit_code,
        }))
        .ok();

    let notification = Notification::new(
        format!("{}, click here to see the errors", message),
        shared.config.failure_notification_duration,
    )
    .with_action(NotificationAction::OpenTargetLogs(*target));

    if let Err(e) = shared.notifier.notify(notification).await {
        warn!(error = %e, "Failed to show sync failure notification");
    }
}
