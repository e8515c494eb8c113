//! # Core Configuration Module
//!
//! Provides configuration management for the cloud-save core.
//!
//! ## Overview
//!
//! Two kinds of configuration live here:
//!
//! - [`CoreConfig`] holds the injected bridges and the tunables fixed at
//!   startup. It is built with [`CoreConfigBuilder`], which fails fast when a
//!   required bridge is missing.
//! - [`SyncSettings`] is the typed view of the user-editable plugin settings.
//!   Settings can change at any time from the settings page, so the core
//!   re-reads them from the [`SettingsStore`] for every decision instead of
//!   caching them.
//!
//! ## Required Dependencies
//!
//! - `SettingsStore` - plugin settings and sync state markers
//! - `SyncBackend` - the external sync tool
//! - `FilterSource` - per-target filters, the admission gate
//! - `ProcessControl` - pausing the running game
//! - `Notifier` - user-facing toasts
//!
//! ## Optional Dependencies
//!
//! - `ScreenshotStore` - deleting uploaded screenshots
//! - `LoggerSink` - mirroring logs into the host log file
//!
//! When the `desktop-shims` feature is enabled and a settings directory is
//! given, desktop defaults from `bridge-desktop` are injected for every
//! missing required bridge.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .settings_store(Arc::new(MySettingsStore))
//!     .sync_backend(Arc::new(MyRclone))
//!     .filter_source(Arc::new(MyFilters))
//!     .process_control(Arc::new(MyProcessControl))
//!     .notifier(Arc::new(MyToaster))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    FilterSource, LogLevel, LoggerSink, Notifier, ProcessControl, ScreenshotStore, SettingsStore,
    SyncBackend,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default duration of a sync failure notification.
pub const DEFAULT_FAILURE_NOTIFICATION_DURATION: Duration = Duration::from_secs(10);

/// Default duration of informational notifications.
pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_secs(2);

// ============================================================================
// Plugin settings
// ============================================================================

/// Keys of the persisted plugin settings.
pub mod keys {
    pub const SYNC_ON_GAME_START: &str = "sync_on_game_start";
    pub const SYNC_ON_GAME_STOP: &str = "sync_on_game_stop";
    pub const SYNC_GLOBAL_ON_GAME_EVENTS: &str = "sync_global_on_game_events";
    pub const CAPTURE_UPLOAD: &str = "capture_upload";
    pub const CAPTURE_DELETE_AFTER_UPLOAD: &str = "capture_delete_after_upload";
    pub const LOG_LEVEL: &str = "log_level";
}

/// Game lifecycle edge that can trigger an automatic sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameEvent {
    Start,
    Stop,
}

/// Typed view of the plugin settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Download cloud saves before a game starts
    pub sync_on_game_start: bool,
    /// Upload local saves after a game stops
    pub sync_on_game_stop: bool,
    /// Also sync the global target around every game session
    pub sync_global_on_game_events: bool,
    /// Upload screenshots as they are captured
    pub capture_upload: bool,
    /// Delete the local copy after a successful screenshot upload
    pub capture_delete_after_upload: bool,
    pub log_level: LogLevel,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_on_game_start: true,
            sync_on_game_stop: true,
            sync_global_on_game_events: true,
            capture_upload: false,
            capture_delete_after_upload: false,
            log_level: LogLevel::Info,
        }
    }
}

impl SyncSettings {
    /// Read the settings, falling back to defaults for missing keys.
    ///
    /// An unparsable `log_level` falls back to `INFO` instead of failing:
    /// the value is free text on some hosts.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let defaults = Self::default();

        let log_level = match store.get_string(keys::LOG_LEVEL).await? {
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!(value = %value, "Unknown log level setting, using INFO");
                LogLevel::Info
            }),
            None => defaults.log_level,
        };

        Ok(Self {
            sync_on_game_start: store
                .get_bool(keys::SYNC_ON_GAME_START)
                .await?
                .unwrap_or(defaults.sync_on_game_start),
            sync_on_game_stop: store
                .get_bool(keys::SYNC_ON_GAME_STOP)
                .await?
                .unwrap_or(defaults.sync_on_game_stop),
            sync_global_on_game_events: store
                .get_bool(keys::SYNC_GLOBAL_ON_GAME_EVENTS)
                .await?
                .unwrap_or(defaults.sync_global_on_game_events),
            capture_upload: store
                .get_bool(keys::CAPTURE_UPLOAD)
                .await?
                .unwrap_or(defaults.capture_upload),
            capture_delete_after_upload: store
                .get_bool(keys::CAPTURE_DELETE_AFTER_UPLOAD)
                .await?
                .unwrap_or(defaults.capture_delete_after_upload),
            log_level,
        })
    }

    /// Write every setting back to the store.
    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store
            .set_bool(keys::SYNC_ON_GAME_START, self.sync_on_game_start)
            .await?;
        store
            .set_bool(keys::SYNC_ON_GAME_STOP, self.sync_on_game_stop)
            .await?;
        store
            .set_bool(
                keys::SYNC_GLOBAL_ON_GAME_EVENTS,
                self.sync_global_on_game_events,
            )
            .await?;
        store
            .set_bool(keys::CAPTURE_UPLOAD, self.capture_upload)
            .await?;
        store
            .set_bool(
                keys::CAPTURE_DELETE_AFTER_UPLOAD,
                self.capture_delete_after_upload,
            )
            .await?;
        store
            .set_string(keys::LOG_LEVEL, self.log_level.as_str())
            .await?;
        Ok(())
    }

    /// Whether a game lifecycle edge triggers an automatic sync.
    pub fn is_automatic_sync_enabled(&self, event: GameEvent) -> bool {
        match event {
            GameEvent::Start => self.sync_on_game_start,
            GameEvent::Stop => self.sync_on_game_stop,
        }
    }

    /// Both automatic directions are on, so every download is paired with a
    /// later upload and the in-sync markers are meaningful.
    pub fn strict_sync(&self) -> bool {
        self.sync_on_game_start && self.sync_on_game_stop
    }
}

// ============================================================================
// Core configuration
// ============================================================================

/// Core configuration for the cloud-save core.
///
/// This struct holds all dependencies and settings required to initialize
/// the core library. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Plugin settings directory (used for desktop defaults)
    pub settings_dir: Option<PathBuf>,

    pub settings_store: Arc<dyn SettingsStore>,
    pub sync_backend: Arc<dyn SyncBackend>,
    pub filter_source: Arc<dyn FilterSource>,
    pub process_control: Arc<dyn ProcessControl>,
    pub notifier: Arc<dyn Notifier>,

    /// Screenshot deletion (optional)
    pub screenshot_store: Option<Arc<dyn ScreenshotStore>>,

    /// Host log forwarding (optional)
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    /// How long a sync failure notification stays visible
    pub failure_notification_duration: Duration,

    /// How long informational notifications stay visible
    pub notification_duration: Duration,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("settings_dir", &self.settings_dir)
            .field("settings_store", &"SettingsStore { ... }")
            .field("sync_backend", &"SyncBackend { ... }")
            .field("filter_source", &"FilterSource { ... }")
            .field("process_control", &"ProcessControl { ... }")
            .field("notifier", &"Notifier { ... }")
            .field(
                "screenshot_store",
                &self
                    .screenshot_store
                    .as_ref()
                    .map(|_| "ScreenshotStore { ... }"),
            )
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field(
                "failure_notification_duration",
                &self.failure_notification_duration,
            )
            .field("notification_duration", &self.notification_duration)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the tunables.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.failure_notification_duration.is_zero() || self.notification_duration.is_zero() {
            return Err(Error::Config(
                "Notification durations must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature and set settings_dir(). \
             Other hosts: inject a platform adapter.",
            capability, purpose
        ),
    }
}

/// Desktop adapters for every bridge the caller left unset.
#[cfg(feature = "desktop-shims")]
struct DesktopDefaults {
    settings_store: Arc<dyn SettingsStore>,
    sync_backend: Arc<dyn SyncBackend>,
    filter_source: Arc<dyn FilterSource>,
    process_control: Arc<dyn ProcessControl>,
    notifier: Arc<dyn Notifier>,
}

/// Desktop adapters rooted at `settings_dir`. The rclone backend reads its
/// settings from `settings_store` when given, otherwise from the JSON
/// settings file it opens.
#[cfg(feature = "desktop-shims")]
fn provide_desktop_defaults(
    settings_dir: &std::path::Path,
    settings_store: Option<Arc<dyn SettingsStore>>,
) -> Result<DesktopDefaults> {
    use bridge_desktop::{
        FilterDirectory, JsonFileSettingsStore, LogNotifier, RcloneOptions, RcloneSyncBackend,
        SignalProcessControl, SETTINGS_FILE_NAME,
    };

    let settings_store: Arc<dyn SettingsStore> = match settings_store {
        Some(store) => store,
        None => Arc::new(
            JsonFileSettingsStore::open_blocking(settings_dir.join(SETTINGS_FILE_NAME)).map_err(
                |e| Error::Internal(format!("Failed to initialize default SettingsStore: {}", e)),
            )?,
        ),
    };
    let filters = FilterDirectory::new(settings_dir);

    Ok(DesktopDefaults {
        sync_backend: Arc::new(RcloneSyncBackend::new(
            RcloneOptions::new(settings_dir),
            filters.clone(),
            Arc::clone(&settings_store),
        )),
        settings_store,
        filter_source: Arc::new(filters),
        process_control: Arc::new(SignalProcessControl::new()),
        notifier: Arc::new(LogNotifier::new()),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](CoreConfigBuilder::build) to create the final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    settings_dir: Option<PathBuf>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    sync_backend: Option<Arc<dyn SyncBackend>>,
    filter_source: Option<Arc<dyn FilterSource>>,
    process_control: Option<Arc<dyn ProcessControl>>,
    notifier: Option<Arc<dyn Notifier>>,
    screenshot_store: Option<Arc<dyn ScreenshotStore>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    event_buffer_size: Option<usize>,
    failure_notification_duration: Option<Duration>,
    notification_duration: Option<Duration>,
}

impl CoreConfigBuilder {
    /// Sets the plugin settings directory.
    pub fn settings_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings_dir = Some(path.into());
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn sync_backend(mut self, backend: Arc<dyn SyncBackend>) -> Self {
        self.sync_backend = Some(backend);
        self
    }

    pub fn filter_source(mut self, source: Arc<dyn FilterSource>) -> Self {
        self.filter_source = Some(source);
        self
    }

    pub fn process_control(mut self, control: Arc<dyn ProcessControl>) -> Self {
        self.process_control = Some(control);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn screenshot_store(mut self, store: Arc<dyn ScreenshotStore>) -> Self {
        self.screenshot_store = Some(store);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn failure_notification_duration(mut self, duration: Duration) -> Self {
        self.failure_notification_duration = Some(duration);
        self
    }

    pub fn notification_duration(mut self, duration: Duration) -> Self {
        self.notification_duration = Some(duration);
        self
    }

    /// Fill every unset required bridge with its desktop adapter.
    #[cfg(feature = "desktop-shims")]
    fn with_desktop_defaults(mut self) -> Result<Self> {
        let Some(dir) = self.settings_dir.clone() else {
            return Ok(self);
        };

        let needs_defaults = self.settings_store.is_none()
            || self.sync_backend.is_none()
            || self.filter_source.is_none()
            || self.process_control.is_none()
            || self.notifier.is_none();
        if !needs_defaults {
            return Ok(self);
        }

        let defaults = provide_desktop_defaults(&dir, self.settings_store.clone())?;
        self.settings_store.get_or_insert(defaults.settings_store);
        self.sync_backend.get_or_insert(defaults.sync_backend);
        self.filter_source.get_or_insert(defaults.filter_source);
        self.process_control.get_or_insert(defaults.process_control);
        self.notifier.get_or_insert(defaults.notifier);
        Ok(self)
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] when a required bridge is neither
    /// provided nor available as a desktop default, and [`Error::Config`]
    /// when a tunable is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        #[cfg(feature = "desktop-shims")]
        let builder = self.with_desktop_defaults()?;
        #[cfg(not(feature = "desktop-shims"))]
        let builder = self;

        let settings_store = builder
            .settings_store
            .ok_or_else(|| capability_missing("SettingsStore", "plugin settings"))?;
        let sync_backend = builder
            .sync_backend
            .ok_or_else(|| capability_missing("SyncBackend", "running syncs"))?;
        let filter_source = builder
            .filter_source
            .ok_or_else(|| capability_missing("FilterSource", "sync target eligibility"))?;
        let process_control = builder
            .process_control
            .ok_or_else(|| capability_missing("ProcessControl", "pausing games during sync"))?;
        let notifier = builder
            .notifier
            .ok_or_else(|| capability_missing("Notifier", "user notifications"))?;

        let config = CoreConfig {
            settings_dir: builder.settings_dir,
            settings_store,
            sync_backend,
            filter_source,
            process_control,
            notifier,
            screenshot_store: builder.screenshot_store,
            logger_sink: builder.logger_sink,
            event_buffer_size: builder
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            failure_notification_duration: builder
                .failure_notification_duration
                .unwrap_or(DEFAULT_FAILURE_NOTIFICATION_DURATION),
            notification_duration: builder
                .notification_duration
                .unwrap_or(DEFAULT_NOTIFICATION_DURATION),
        };

        config.validate()?;

        Ok(config)
    }
}
