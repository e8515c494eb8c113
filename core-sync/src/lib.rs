//! # Sync Orchestration Core
//!
//! Decides when the external sync tool runs and makes sure only one run is in
//! flight at a time.
//!
//! ## Overview
//!
//! Host signals (game start/stop, screenshots, manual syncs) reach the
//! [`SyncOrchestrator`], which consults the plugin settings and submits tasks
//! to the [`TaskQueue`]. The queue admits only targets known to the
//! [`TargetRegistry`], brackets tasks of a running game with the
//! [`ProcessGate`], runs tasks one by one and reports outcomes on the event
//! bus.
//!
//! ## Components
//!
//! - **Target Registry** (`registry`): snapshot of the targets with sync filters
//! - **Process Gate** (`gate`): pause/resume of the game around a sync
//! - **Sync State Tracker** (`tracker`): persisted consistency markers
//! - **Task Queue** (`queue`): single-worker FIFO with busy/idle edges
//! - **Orchestrator** (`orchestrator`): lifecycle policy

pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod tracker;

pub use error::{Result, SyncError};
pub use gate::ProcessGate;
pub use orchestrator::{
    LifecycleNotification, OrchestratorConfig, ScreenshotDetails, ScreenshotNotification,
    SyncOrchestrator, SCREENSHOT_WRITTEN,
};
pub use queue::{
    CompletionHook, QueueConfig, SyncTask, TaskHandle, TaskId, TaskKind, TaskOutcome, TaskQueue,
};
pub use registry::TargetRegistry;
pub use tracker::{SyncStateTracker, IN_SYNC_KEY_PREFIX};
