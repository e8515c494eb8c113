//! # Host Bridge Traits
//!
//! Collaborator contracts that the cloud-save core depends on but does not
//! implement itself.
//!
//! ## Overview
//!
//! The orchestration core decides *when* a sync runs and *in which order*.
//! Everything that touches the outside world is injected through the traits
//! in this crate, so the core can be driven by the desktop adapters in
//! `bridge-desktop` or by hand-written mocks in tests.
//!
//! ## Traits
//!
//! ### Sync
//! - [`SyncBackend`](sync::SyncBackend) - Runs the external sync tool, returns its exit code
//! - [`FilterSource`](sync::FilterSource) - Per-target filter configuration, eligibility source
//!
//! ### Host Integration
//! - [`ProcessControl`](process::ProcessControl) - Pause/resume the running game
//! - [`Notifier`](notify::Notifier) - Toast notifications with an optional click action
//! - [`ScreenshotStore`](storage::ScreenshotStore) - Local screenshot deletion
//!
//! ### Storage & Utilities
//! - [`SettingsStore`](storage::SettingsStore) - Persistent key/value settings
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host log file
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing:
//!
//! ```ignore
//! let sync_backend = config.sync_backend
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "SyncBackend".to_string(),
//!         message: "No sync backend provided. \
//!                  Desktop: enable the desktop-shims feature.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform errors into it and include context such as paths or pids.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across the queue worker and the lifecycle handlers.

pub mod error;
pub mod notify;
pub mod process;
pub mod storage;
pub mod sync;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use notify::{Notification, NotificationAction, Notifier};
pub use process::{ProcessControl, ProcessId};
pub use storage::{ScreenshotStore, SettingsStore};
pub use sync::{
    is_success_exit_code, ExitCode, FilterSource, SyncBackend, SyncDirection, SyncOperation,
    SyncTarget, EXIT_NOTHING_TO_DO,
};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
