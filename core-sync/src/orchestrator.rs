//! # Sync Orchestrator
//!
//! Turns host lifecycle signals into task queue submissions.
//!
//! ## Overview
//!
//! | Signal | Tasks |
//! |--------|-------|
//! | game start | download the game (paused while it runs), upload the global target |
//! | game stop | upload the game, download the global target |
//! | screenshot written | upload the screenshot, optionally delete the local copy |
//! | manual sync | the requested operation, then a "finished" notification |
//!
//! Settings are re-read for every signal. The orchestrator never retries:
//! failures surface through the queue's failure notification and events.
//!
//! ## Consistency guard
//!
//! With strict sync on, a download leaves a marker in the settings store
//! that only a successful upload clears. A game start that finds the marker
//! skips its download and warns the user instead of overwriting local saves
//! that never reached the cloud.

use bridge_traits::{
    Notification, NotificationAction, Notifier, ProcessId, ScreenshotStore, SettingsStore,
    SyncOperation, SyncTarget,
};
use core_runtime::config::{
    GameEvent, SyncSettings, DEFAULT_FAILURE_NOTIFICATION_DURATION, DEFAULT_NOTIFICATION_DURATION,
};
use core_runtime::events::{CoreEvent, EventBus, ScreenshotEvent, SyncEvent};
use core_runtime::logging::strip_path;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::queue::{format_exit_code, SyncTask, TaskHandle, TaskOutcome, TaskQueue};
use crate::registry::TargetRegistry;
use crate::tracker::SyncStateTracker;

/// Screenshot operation that triggers an upload.
pub const SCREENSHOT_WRITTEN: &str = "written";

// ============================================================================
// Host signals
// ============================================================================

/// A game started or stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleNotification {
    pub app_id: u32,
    /// Process id of the running game
    pub instance_id: Option<ProcessId>,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotDetails {
    pub url: String,
    pub game_id: i64,
    pub handle: i64,
}

/// The host touched a screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotNotification {
    pub operation: String,
    pub details: Option<ScreenshotDetails>,
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Duration of informational notifications
    pub notification_duration: Duration,
    /// Duration of warnings (skipped downloads)
    pub warning_notification_duration: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            notification_duration: DEFAULT_NOTIFICATION_DURATION,
            warning_notification_duration: DEFAULT_FAILURE_NOTIFICATION_DURATION,
        }
    }
}

/// Lifecycle policy on top of the [`TaskQueue`].
#[derive(Clone)]
pub struct SyncOrchestrator {
    queue: TaskQueue,
    registry: Arc<TargetRegistry>,
    tracker: Arc<SyncStateTracker>,
    settings: Arc<dyn SettingsStore>,
    notifier: Arc<dyn Notifier>,
    screenshot_store: Option<Arc<dyn ScreenshotStore>>,
    event_bus: EventBus,
    config: OrchestratorConfig,
}

impl SyncOrchestrator {
    pub fn new(
        queue: TaskQueue,
        registry: Arc<TargetRegistry>,
        tracker: Arc<SyncStateTracker>,
        settings: Arc<dyn SettingsStore>,
        notifier: Arc<dyn Notifier>,
        event_bus: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            tracker,
            settings,
            notifier,
            screenshot_store: None,
            event_bus,
            config,
        }
    }

    /// Enable deleting screenshots after upload.
    pub fn with_screenshot_store(mut self, store: Arc<dyn ScreenshotStore>) -> Self {
        self.screenshot_store = Some(store);
        self
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<SyncStateTracker> {
        &self.tracker
    }

    async fn settings(&self) -> Result<SyncSettings> {
        Ok(SyncSettings::load(self.settings.as_ref()).await?)
    }

    /// Dispatch a game lifecycle signal.
    pub async fn on_lifecycle(&self, event: LifecycleNotification) -> Result<Vec<TaskHandle>> {
        let target = SyncTarget::new(i64::from(event.app_id));
        if event.running {
            self.on_process_start(target, event.instance_id).await
        } else {
            self.on_process_stop(target).await
        }
    }

    /// Download cloud saves before the game touches them.
    ///
    /// The game process is paused until the download finished. Returns the
    /// handles of the admitted tasks.
    #[instrument(skip(self), fields(target_id = target.id()))]
    pub async fn on_process_start(
        &self,
        target: SyncTarget,
        pid: Option<ProcessId>,
    ) -> Result<Vec<TaskHandle>> {
        let settings = self.settings().await?;
        if !settings.is_automatic_sync_enabled(GameEvent::Start) {
            debug!("Sync on game start is disabled");
            return Ok(Vec::new());
        }

        info!("Syncing on game {} start", target.id());
        let mut handles = Vec::new();

        if !self.registry.has(target) {
            debug!("Target has no sync filters, skipping download");
        } else if self.tracker.is_in_sync(target).await? {
            let tracker = Arc::clone(&self.tracker);
            let download = SyncTask::sync(target, SyncOperation::Download)
                .with_optional_process(pid)
                .on_complete(move |_| async move {
                    // local saves diverge until the upload at game stop
                    if let Err(e) = tracker.set_in_sync(target, false).await {
                        warn!(target_id = target.id(), error = %e, "Failed to mark target out of sync");
                    }
                });
            handles.extend(self.queue.submit(download).await?);
        } else {
            self.skip_download(target).await;
        }

        if settings.sync_global_on_game_events {
            handles.extend(
                self.queue
                    .submit(SyncTask::sync(SyncTarget::GLOBAL, SyncOperation::Upload))
                    .await?,
            );
        }

        Ok(handles)
    }

    async fn skip_download(&self, target: SyncTarget) {
        let reason = "the upload after the last session did not finish".to_string();
        warn!(target_id = target.id(), "Skipping download, {}", reason);

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Skipped {
                target,
                reason: reason.clone(),
            }))
            .ok();

        let notification = Notification::new(
            format!(
                "Skipped downloading \"{}\": {}, sync manually to recover",
                target.display_name(),
                reason
            ),
            self.config.warning_notification_duration,
        )
        .with_action(NotificationAction::OpenTargetLogs(target));
        notify(self.notifier.as_ref(), notification).await;
    }

    /// Upload local saves once the game exited.
    #[instrument(skip(self), fields(target_id = target.id()))]
    pub async fn on_process_stop(&self, target: SyncTarget) -> Result<Vec<TaskHandle>> {
        let settings = self.settings().await?;
        if !settings.is_automatic_sync_enabled(GameEvent::Stop) {
            debug!("Sync on game stop is disabled");
            return Ok(Vec::new());
        }

        info!("Syncing on game {} stop", target.id());
        let mut handles = Vec::new();

        let tracker = Arc::clone(&self.tracker);
        let upload = SyncTask::sync(target, SyncOperation::Upload).on_complete(
            move |outcome: TaskOutcome| async move {
                if !outcome.is_success() {
                    return;
                }
                if let Err(e) = tracker.set_in_sync(target, true).await {
                    warn!(target_id = target.id(), error = %e, "Failed to mark target in sync");
                }
            },
        );
        handles.extend(self.queue.submit(upload).await?);

        if settings.sync_global_on_game_events {
            handles.extend(
                self.queue
                    .submit(SyncTask::sync(SyncTarget::GLOBAL, SyncOperation::Download))
                    .await?,
            );
        }

        Ok(handles)
    }

    /// Upload a freshly written screenshot when capture upload is on.
    pub async fn on_screenshot_notification(
        &self,
        user_id: &str,
        notification: &ScreenshotNotification,
    ) -> Result<Option<TaskHandle>> {
        if notification.operation != SCREENSHOT_WRITTEN {
            return Ok(None);
        }
        let Some(details) = &notification.details else {
            return Ok(None);
        };
        if !self.settings().await?.capture_upload {
            debug!("Screenshot upload is disabled");
            return Ok(None);
        }

        self.on_screenshot_captured(user_id, &details.url, details.game_id, details.handle)
            .await
    }

    /// Queue a screenshot upload. Not gated by the target registry.
    #[instrument(skip(self, url), fields(screenshot = strip_path(url)))]
    pub async fn on_screenshot_captured(
        &self,
        user_id: &str,
        url: &str,
        game_id: i64,
        handle: i64,
    ) -> Result<Option<TaskHandle>> {
        let settings = Arc::clone(&self.settings);
        let notifier = Arc::clone(&self.notifier);
        let screenshot_store = self.screenshot_store.clone();
        let event_bus = self.event_bus.clone();
        let duration = self.config.notification_duration;
        let name = strip_path(url).to_string();

        let task = SyncTask::screenshot(user_id, url).on_complete(move |outcome| async move {
            if !outcome.is_success() {
                let exit_code = format_exit_code(outcome.exit_code);
                error!("Failed to upload screenshot {}, exit code: {}", name, exit_code);
                event_bus
                    .emit(CoreEvent::Screenshot(ScreenshotEvent::UploadFailed {
                        game_id,
                        handle,
                        exit_code: outcome.exit_code,
                    }))
                    .ok();
                notify(
                    notifier.as_ref(),
                    Notification::new(
                        format!("Failed to upload the screenshot, exit code: {}", exit_code),
                        duration,
                    ),
                )
                .await;
                return;
            }

            event_bus
                .emit(CoreEvent::Screenshot(ScreenshotEvent::Uploaded { game_id, handle }))
                .ok();

            let delete = match SyncSettings::load(settings.as_ref()).await {
                Ok(settings) => settings.capture_delete_after_upload,
                Err(e) => {
                    warn!(error = %e, "Failed to read settings, keeping local screenshot");
                    false
                }
            };
            if !delete {
                info!("Screenshot {} uploaded", name);
                return;
            }

            let deleted = match &screenshot_store {
                Some(store) => store
                    .delete_local(game_id, handle)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("no screenshot store configured".to_string()),
            };
            match deleted {
                Ok(()) => info!("Screenshot {} uploaded and deleted locally", name),
                Err(message) => {
                    warn!(error = %message, "Failed to delete screenshot {} locally", name);
                    event_bus
                        .emit(CoreEvent::Screenshot(ScreenshotEvent::DeleteFailed {
                            game_id,
                            handle,
                            message,
                        }))
                        .ok();
                    notify(
                        notifier.as_ref(),
                        Notification::new("Failed to delete the screenshot locally", duration),
                    )
                    .await;
                }
            }
        });

        self.queue.submit(task).await
    }

    /// Run an operation on user request.
    ///
    /// Leaves the consistency markers alone and always reports "finished",
    /// failures are reported by the queue on top.
    #[instrument(skip(self), fields(target_id = target.id()))]
    pub async fn on_manual_sync(
        &self,
        target: SyncTarget,
        operation: SyncOperation,
    ) -> Result<Option<TaskHandle>> {
        let notifier = Arc::clone(&self.notifier);
        let duration = self.config.notification_duration;

        let task = SyncTask::sync(target, operation).on_complete(move |_| async move {
            notify(
                notifier.as_ref(),
                Notification::new(format!("Sync for {} finished", target.display_name()), duration),
            )
            .await;
        });

        self.queue.submit(task).await
    }

    /// Reload the set of eligible targets.
    pub async fn refresh_targets(&self) -> Result<usize> {
        self.registry.refresh().await
    }

    pub async fn filters(&self, target: SyncTarget) -> Result<Vec<String>> {
        self.registry.filters(target).await
    }

    /// Replace the filters of a target (or the shared set) and refresh the
    /// eligible targets.
    pub async fn set_filters(&self, target: SyncTarget, filters: Vec<String>) -> Result<()> {
        self.registry.set_filters(target, filters).await
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("queue", &self.queue)
            .field("registry", &self.registry)
            .field("has_screenshot_store", &self.screenshot_store.is_some())
            .field("config", &self.config)
            .finish()
    }
}

async fn notify(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(notification).await {
        warn!(error = %e, "Failed to show notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_notification_deserializes() {
        let event: LifecycleNotification = serde_json::from_str(
            r#"{"app_id": 1245620, "instance_id": 31337, "running": true}"#,
        )
        .unwrap();

        assert_eq!(event.app_id, 1245620);
        assert_eq!(event.instance_id, Some(31337));
        assert!(event.running);
    }

    #[test]
    fn test_screenshot_notification_without_details() {
        let event: ScreenshotNotification =
            serde_json::from_str(r#"{"operation": "deleted", "details": null}"#).unwrap();

        assert_eq!(event.operation, "deleted");
        assert!(event.details.is_none());
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.notification_duration, Duration::from_secs(2));
        assert_eq!(config.warning_notification_duration, Duration::from_secs(10));
    }
}
