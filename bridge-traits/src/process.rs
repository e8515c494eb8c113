//! Process Control Abstraction
//!
//! Suspends and resumes an external process (the running game) so that it
//! cannot write save data while a sync touches the same files.

use async_trait::async_trait;

use crate::error::Result;

/// Operating-system process id.
pub type ProcessId = u32;

/// Pause/resume control over an external process tree.
///
/// # Platform Support
///
/// - **Linux desktop**: `SIGSTOP` / `SIGCONT` to the process and its children
/// - **Other hosts**: whatever suspend primitive the host exposes
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Suspend the process and its children.
    async fn pause(&self, pid: ProcessId) -> Result<()>;

    /// Resume a previously suspended process and its children.
    async fn resume(&self, pid: ProcessId) -> Result<()>;
}
