//! # Event Bus System
//!
//! Provides status propagation for the cloud-save core using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enums for the queue, sync runs and screenshots
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! Subscribing returns a receiver; dropping it unsubscribes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐
//! │  TaskQueue   ├────────────>│           │    subscribe    ┌────────────┐
//! └──────────────┘             │ EventBus  ├────────────────>│  UI / host │
//!                              │ (broadcast│                 └────────────┘
//! ┌──────────────┐    emit     │  channel) │    subscribe    ┌────────────┐
//! │ Orchestrator ├────────────>│           ├────────────────>│   tests    │
//! └──────────────┘             └───────────┘                 └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, QueueEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut busy_edges = EventStream::new(event_bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Queue(_)));
//!
//! event_bus.emit(CoreEvent::Queue(QueueEvent::Busy { busy: true })).ok();
//!
//! let event = busy_edges.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Queue(QueueEvent::Busy { busy: true }));
//! # }
//! ```
//!
//! ## Event Types
//!
//! ### Queue Events
//! - `Busy { busy: true }`: first task admitted while the queue was idle
//! - `Busy { busy: false }`: the queue drained
//!
//! ### Sync Events
//! - `Queued`, `Started`: task lifecycle inside the queue
//! - `Completed`: the sync tool exited with a success code
//! - `Failed`: non-success exit code, or the tool could not run
//! - `Skipped`: a download was refused by the consistency guard
//!
//! ### Screenshot Events
//! - `Uploaded`, `UploadFailed`, `DeleteFailed`
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep receiving.
//! - **`RecvError::Closed`**: all senders dropped, the core shut down.

use bridge_traits::{ExitCode, SyncOperation, SyncTarget};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Busy/idle edges of the task queue
    Queue(QueueEvent),
    /// Per-task sync status
    Sync(SyncEvent),
    /// Screenshot upload pipeline
    Screenshot(ScreenshotEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Screenshot(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Screenshot(ScreenshotEvent::UploadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Screenshot(ScreenshotEvent::DeleteFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Skipped { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Screenshot(ScreenshotEvent::Uploaded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Queue Events
// ============================================================================

/// Busy-state edges of the task queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// Emitted once per idle→busy transition and once per drain.
    Busy { busy: bool },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Busy { busy: true } => "Sync queue busy",
            QueueEvent::Busy { busy: false } => "Sync queue idle",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Status of individual sync tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Task passed the admission gate and entered the queue.
    Queued {
        task_id: String,
        target: SyncTarget,
        operation: SyncOperation,
    },
    /// The worker picked the task up.
    Started {
        task_id: String,
        target: SyncTarget,
        operation: SyncOperation,
    },
    /// The sync tool exited with a success code (0 or 6).
    Completed {
        task_id: String,
        target: SyncTarget,
        operation: SyncOperation,
        exit_code: ExitCode,
    },
    /// Non-success exit code, or no exit code at all when the tool failed
    /// to run or the task panicked.
    Failed {
        task_id: String,
        target: SyncTarget,
        operation: SyncOperation,
        exit_code: Option<ExitCode>,
    },
    /// A sync was not queued because local and cloud state are not known to
    /// be consistent.
    Skipped { target: SyncTarget, reason: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Queued { .. } => "Sync queued",
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Skipped { .. } => "Sync skipped",
        }
    }

    /// Target the event refers to.
    pub fn target(&self) -> SyncTarget {
        match self {
            SyncEvent::Queued { target, .. }
            | SyncEvent::Started { target, .. }
            | SyncEvent::Completed { target, .. }
            | SyncEvent::Failed { target, .. }
            | SyncEvent::Skipped { target, .. } => *target,
        }
    }
}

// ============================================================================
// Screenshot Events
// ============================================================================

/// Outcome of the screenshot upload pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScreenshotEvent {
    Uploaded {
        game_id: i64,
        handle: i64,
    },
    UploadFailed {
        game_id: i64,
        handle: i64,
        exit_code: Option<ExitCode>,
    },
    DeleteFailed {
        game_id: i64,
        handle: i64,
        message: String,
    },
}

impl ScreenshotEvent {
    fn description(&self) -> &str {
        match self {
            ScreenshotEvent::Uploaded { .. } => "Screenshot uploaded",
            ScreenshotEvent::UploadFailed { .. } => "Screenshot upload failed",
            ScreenshotEvent::DeleteFailed { .. } => "Local screenshot deletion failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for broadcasting events to multiple subscribers.
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Creates a new [`EventStream`] subscriber.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drains every matching event that is already buffered.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(Ok(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
