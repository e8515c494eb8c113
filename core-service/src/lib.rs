//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (sync backend,
//! filters, process control, notifications, settings) into the sync core.
//! Desktop hosts typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig`] fall back to the adapters from `bridge-desktop`.
//!
//! There is exactly one queue per [`CloudSaveService`]. The host creates the
//! service once at plugin load and keeps it for the lifetime of the process.

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::{CoreConfig, CoreConfigBuilder, SyncSettings};
pub use core_runtime::events::{CoreEvent, EventBus, EventStream};
pub use core_sync::{
    LifecycleNotification, ScreenshotNotification, SyncOrchestrator, TaskHandle, TaskQueue,
};

use std::sync::Arc;

use bridge_traits::{SyncBackend, SyncOperation, SyncTarget};
use core_runtime::logging::LoggingConfig;
use core_sync::{
    OrchestratorConfig, ProcessGate, QueueConfig, SyncStateTracker, TargetRegistry,
};
use tracing::{info, warn};

/// Primary façade exposed to host plugins.
#[derive(Clone)]
pub struct CloudSaveService {
    config: Arc<CoreConfig>,
    event_bus: EventBus,
    orchestrator: SyncOrchestrator,
}

impl CloudSaveService {
    /// Build the core from a validated configuration.
    ///
    /// Loads the eligible targets once. A failing initial load is logged and
    /// leaves the registry empty until the next filter write or
    /// [`refresh_targets`](Self::refresh_targets).
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn init(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let registry = Arc::new(TargetRegistry::new(Arc::clone(&config.filter_source)));
        match registry.refresh().await {
            Ok(count) => info!(count, "Loaded sync targets"),
            Err(e) => warn!(error = %e, "Failed to load sync targets"),
        }

        let queue = TaskQueue::new(
            Arc::clone(&registry),
            ProcessGate::new(Arc::clone(&config.process_control)),
            Arc::clone(&config.sync_backend),
            Arc::clone(&config.notifier),
            event_bus.clone(),
            QueueConfig {
                failure_notification_duration: config.failure_notification_duration,
            },
        );

        let tracker = Arc::new(SyncStateTracker::new(Arc::clone(&config.settings_store)));
        let mut orchestrator = SyncOrchestrator::new(
            queue,
            registry,
            tracker,
            Arc::clone(&config.settings_store),
            Arc::clone(&config.notifier),
            event_bus.clone(),
            OrchestratorConfig {
                notification_duration: config.notification_duration,
                warning_notification_duration: config.failure_notification_duration,
            },
        );
        if let Some(store) = &config.screenshot_store {
            orchestrator = orchestrator.with_screenshot_store(Arc::clone(store));
        }

        Ok(Self {
            config: Arc::new(config),
            event_bus,
            orchestrator,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Subscribe to queue, sync and screenshot events.
    pub fn events(&self) -> EventStream {
        self.event_bus.stream()
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.queue().is_busy()
    }

    /// Current plugin settings.
    pub async fn settings(&self) -> Result<SyncSettings> {
        Ok(SyncSettings::load(self.config.settings_store.as_ref()).await?)
    }

    pub async fn update_settings(&self, settings: &SyncSettings) -> Result<()> {
        settings.save(self.config.settings_store.as_ref()).await?;
        Ok(())
    }

    /// Logging setup matching the `log_level` setting, forwarding to the
    /// configured host sink. Pass it to
    /// [`init_logging`](core_runtime::logging::init_logging).
    pub async fn logging_config(&self) -> Result<LoggingConfig> {
        let settings = self.settings().await?;
        let mut logging = LoggingConfig::default().with_level(settings.log_level);
        if let Some(sink) = &self.config.logger_sink {
            logging = logging.with_logger_sink(Arc::clone(sink));
        }
        Ok(logging)
    }

    pub async fn on_lifecycle(&self, event: LifecycleNotification) -> Result<Vec<TaskHandle>> {
        Ok(self.orchestrator.on_lifecycle(event).await?)
    }

    pub async fn on_screenshot_notification(
        &self,
        user_id: &str,
        notification: &ScreenshotNotification,
    ) -> Result<Option<TaskHandle>> {
        Ok(self
            .orchestrator
            .on_screenshot_notification(user_id, notification)
            .await?)
    }

    pub async fn sync_now(
        &self,
        target: SyncTarget,
        operation: SyncOperation,
    ) -> Result<Option<TaskHandle>> {
        Ok(self.orchestrator.on_manual_sync(target, operation).await?)
    }

    /// Clear stale sync locks after an interrupted run. Returns how many
    /// were removed.
    pub async fn delete_lock_files(&self) -> Result<usize> {
        let removed = self
            .config
            .sync_backend
            .delete_lock_files()
            .await
            .map_err(core_runtime::Error::from)?;
        info!(removed, "Deleted sync lock files");
        Ok(removed)
    }

    pub async fn refresh_targets(&self) -> Result<usize> {
        Ok(self.orchestrator.refresh_targets().await?)
    }

    pub async fn filters(&self, target: SyncTarget) -> Result<Vec<String>> {
        Ok(self.orchestrator.filters(target).await?)
    }

    pub async fn set_filters(&self, target: SyncTarget, filters: Vec<String>) -> Result<()> {
        Ok(self.orchestrator.set_filters(target, filters).await?)
    }
}

impl std::fmt::Debug for CloudSaveService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSaveService")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Every bridge falls back to its `bridge-desktop` adapter rooted at
/// `settings_dir`.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example() -> core_service::Result<()> {
/// use core_service::bootstrap_desktop;
///
/// let service = bootstrap_desktop("/home/deck/homebrew/settings/decky-cloud-save").await?;
/// let mut events = service.events();
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    settings_dir: impl Into<std::path::PathBuf>,
) -> Result<CloudSaveService> {
    let config = CoreConfig::builder().settings_dir(settings_dir).build()?;
    CloudSaveService::init(config).await
}
