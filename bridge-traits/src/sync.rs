//! Sync Backend Abstractions
//!
//! Contracts for the external synchronization tool and for the per-target
//! filter configuration that decides which targets may be synced at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Process exit code reported by the sync tool.
pub type ExitCode = i32;

/// Exit code the sync tool reports when a run had nothing to transfer.
pub const EXIT_NOTHING_TO_DO: ExitCode = 6;

/// Opaque identifier of a syncable unit.
///
/// Positive ids name a specific application. Two ids are reserved:
/// [`SyncTarget::GLOBAL`] for the auxiliary global sync and
/// [`SyncTarget::SHARED_FILTER`] for the filter set shared by every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncTarget(pub i64);

impl SyncTarget {
    /// Reserved target synced around every game session.
    pub const GLOBAL: SyncTarget = SyncTarget(0);

    /// Pseudo-target holding the filters shared by all targets.
    pub const SHARED_FILTER: SyncTarget = SyncTarget(-1);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> i64 {
        self.0
    }

    pub fn is_global(&self) -> bool {
        *self == Self::GLOBAL
    }

    pub fn is_shared_filter(&self) -> bool {
        *self == Self::SHARED_FILTER
    }

    /// Name used in user-facing messages.
    pub fn display_name(&self) -> String {
        match *self {
            Self::GLOBAL => "global".to_string(),
            Self::SHARED_FILTER => "shared".to_string(),
            SyncTarget(id) => format!("app {}", id),
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SyncTarget {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Which side wins a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local files are pushed to the cloud remote.
    Upload,
    /// The cloud remote is pulled into the local files.
    Download,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Upload => "upload",
            SyncDirection::Download => "download",
        }
    }
}

/// Named operation dispatched to the sync tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "direction", rename_all = "snake_case")]
pub enum SyncOperation {
    Upload,
    Download,
    /// Full re-baseline of both sides, the given direction wins conflicts.
    Resync(SyncDirection),
}

impl SyncOperation {
    /// Direction whose side wins this operation.
    pub fn direction(&self) -> SyncDirection {
        match self {
            SyncOperation::Upload => SyncDirection::Upload,
            SyncOperation::Download => SyncDirection::Download,
            SyncOperation::Resync(direction) => *direction,
        }
    }

    pub fn is_resync(&self) -> bool {
        matches!(self, SyncOperation::Resync(_))
    }
}

impl From<SyncDirection> for SyncOperation {
    fn from(direction: SyncDirection) -> Self {
        match direction {
            SyncDirection::Upload => SyncOperation::Upload,
            SyncDirection::Download => SyncOperation::Download,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Resync(direction) => write!(f, "resync-{}", direction.as_str()),
            other => f.write_str(other.direction().as_str()),
        }
    }
}

/// Returns true for the exit codes the sync tool uses to report success.
pub fn is_success_exit_code(code: ExitCode) -> bool {
    code == 0 || code == EXIT_NOTHING_TO_DO
}

/// External synchronization tool.
///
/// Each call runs the tool to completion and reports its exit code. An `Err`
/// means the tool could not be run at all; callers treat it like a failing
/// exit code.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::sync::{SyncBackend, SyncOperation, SyncTarget};
///
/// async fn push(backend: &dyn SyncBackend) -> Result<()> {
///     let code = backend.run(SyncTarget::new(42), SyncOperation::Upload).await?;
///     println!("rclone exited with {}", code);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Run one sync of `target` in the given operation mode.
    async fn run(&self, target: SyncTarget, operation: SyncOperation) -> Result<ExitCode>;

    /// Upload a single captured screenshot.
    async fn sync_screenshot(&self, user_id: &str, url: &str) -> Result<ExitCode>;

    /// Remove stale locks an interrupted run left behind, so the next run
    /// is not refused. Returns how many locks were removed.
    async fn delete_lock_files(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Per-target filter configuration.
///
/// The set of targets with usable filters is the admission gate for every
/// sync. Writing filters changes that set, so callers refresh their view after
/// each write.
#[async_trait]
pub trait FilterSource: Send + Sync {
    /// Ids of every target whose filters allow a sync.
    async fn available_targets(&self) -> Result<Vec<SyncTarget>>;

    /// Filter rules of a target, or of the shared pseudo-target.
    async fn get_filters(&self, target: SyncTarget) -> Result<Vec<String>>;

    /// Replace the filter rules of a target.
    async fn set_filters(&self, target: SyncTarget, filters: Vec<String>) -> Result<()>;
}
