//! Notifier writing toasts to the tracing log

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    notify::{Notification, NotificationAction, Notifier},
};
use tracing::info;

/// Headless [`Notifier`] for desktop runs without a UI: every notification is
/// logged at `info`.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        match notification.action {
            Some(NotificationAction::OpenTargetLogs(target)) => info!(
                duration_ms = notification.duration.as_millis() as u64,
                logs_for = %target,
                "{}",
                notification.message
            ),
            None => info!(
                duration_ms = notification.duration.as_millis() as u64,
                "{}",
                notification.message
            ),
        }
        Ok(())
    }
}
