//! Pause/resume bracket around syncs of a running game.
//!
//! Signal failures are logged and swallowed: a game that could not be paused
//! is still synced, and a failed resume must not fail the task that already
//! ran.

use bridge_traits::{ProcessControl, ProcessId};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ProcessGate {
    control: Arc<dyn ProcessControl>,
}

impl ProcessGate {
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self { control }
    }

    /// Stop `pid` and its children. Returns whether the signal was delivered.
    pub async fn pause(&self, pid: ProcessId) -> bool {
        match self.control.pause(pid).await {
            Ok(()) => {
                debug!(pid, "Paused process");
                true
            }
            Err(e) => {
                warn!(pid, error = %e, "Failed to pause process");
                false
            }
        }
    }

    /// Continue `pid` and its children. Returns whether the signal was delivered.
    pub async fn resume(&self, pid: ProcessId) -> bool {
        match self.control.resume(pid).await {
            Ok(()) => {
                debug!(pid, "Resumed process");
                true
            }
            Err(e) => {
                warn!(pid, error = %e, "Failed to resume process");
                false
            }
        }
    }
}

impl std::fmt::Debug for ProcessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Control {}

        #[async_trait]
        impl ProcessControl for Control {
            async fn pause(&self, pid: ProcessId) -> BridgeResult<()>;
            async fn resume(&self, pid: ProcessId) -> BridgeResult<()>;
        }
    }

    #[tokio::test]
    async fn test_pause_and_resume_pass_through() {
        let mut control = MockControl::new();
        control
            .expect_pause()
            .with(eq(100))
            .times(1)
            .returning(|_| Ok(()));
        control
            .expect_resume()
            .with(eq(100))
            .times(1)
            .returning(|_| Ok(()));

        let gate = ProcessGate::new(Arc::new(control));
        assert!(gate.pause(100).await);
        assert!(gate.resume(100).await);
    }

    #[tokio::test]
    async fn test_signal_errors_are_swallowed() {
        let mut control = MockControl::new();
        control
            .expect_pause()
            .returning(|_| Err(BridgeError::OperationFailed("ESRCH".to_string())));
        control
            .expect_resume()
            .returning(|_| Err(BridgeError::NotAvailable("no /proc".to_string())));

        let gate = ProcessGate::new(Arc::new(control));
        assert!(!gate.pause(42).await);
        assert!(!gate.resume(42).await);
    }
}
