//! User Notification Abstraction
//!
//! Toast-style messages raised by the core. Rendering belongs to the host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{error::Result, sync::SyncTarget};

/// What the host should do when the user clicks a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum NotificationAction {
    /// Navigate to the diagnostics/log view of a target.
    OpenTargetLogs(SyncTarget),
}

/// A single user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub duration: Duration,
    pub action: Option<NotificationAction>,
}

impl Notification {
    pub fn new(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            message: message.into(),
            duration,
            action: None,
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Host notification surface.
///
/// Implementations must not block: the message is queued for display and the
/// call returns.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}
