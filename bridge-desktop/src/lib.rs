//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for Linux desktops and handhelds.
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! using desktop-appropriate tools:
//! - `SettingsStore` using a JSON settings file
//! - `ProcessControl` using `SIGSTOP` / `SIGCONT` over the process tree
//! - `SyncBackend` driving the `rclone` executable
//! - `FilterSource` reading per-target filter files
//! - `Notifier` writing notifications to the log
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FilterDirectory, JsonFileSettingsStore, RcloneOptions, RcloneSyncBackend};
//!
//! let settings = Arc::new(JsonFileSettingsStore::in_dir(&settings_dir).await?);
//! let filters = FilterDirectory::new(&settings_dir);
//! let backend =
//!     RcloneSyncBackend::new(RcloneOptions::new(&settings_dir), filters.clone(), settings);
//! // Use in core configuration
//! ```

mod filters;
mod notify;
mod process;
mod rclone;
mod settings;

pub use filters::{parse_rules, FilterDirectory, FilterRule, FILTERS_FILE_NAME};
pub use notify::LogNotifier;
pub use process::SignalProcessControl;
pub use rclone::{
    keys as rclone_keys, RcloneOptions, RcloneSettings, RcloneSyncBackend, DEFAULT_MAX_LOG_FILES,
    REMOTE_NAME,
};
pub use settings::{JsonFileSettingsStore, SETTINGS_FILE_NAME};
