//! Process Control using POSIX job-control signals

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    process::{ProcessControl, ProcessId},
};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Signal-based process control.
///
/// Sends `SIGSTOP` / `SIGCONT` to a process and then, recursively, to every
/// child listed by the kernel under `/proc/<pid>/task/<tid>/children`. Games
/// usually run behind a launcher chain, so signalling only the top pid would
/// leave the actual game running.
///
/// Signal failures (process already gone, permission denied) are logged and
/// skipped so one vanished child does not stop the rest of the tree.
#[derive(Debug, Clone)]
pub struct SignalProcessControl {
    proc_root: PathBuf,
}

impl SignalProcessControl {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Use a different procfs mount (tests).
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Direct children of `pid`, collected across all of its threads.
    pub async fn children(&self, pid: ProcessId) -> Vec<ProcessId> {
        let task_dir = self.proc_root.join(pid.to_string()).join("task");
        let mut entries = match tokio::fs::read_dir(&task_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(pid, error = %e, "No task directory");
                return Vec::new();
            }
        };

        let mut children = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(contents) = tokio::fs::read_to_string(entry.path().join("children")).await
            else {
                continue;
            };
            children.extend(
                contents
                    .split_whitespace()
                    .filter_map(|token| token.parse::<ProcessId>().ok()),
            );
        }
        children
    }

    /// `pid` followed by all of its descendants, parents before children.
    pub async fn process_tree(&self, pid: ProcessId) -> Vec<ProcessId> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut pending = vec![pid];

        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            ordered.push(current);
            let mut children = self.children(current).await;
            children.reverse();
            pending.extend(children);
        }
        ordered
    }

    async fn signal_tree(&self, pid: ProcessId, signal: Signal) {
        for target in self.process_tree(pid).await {
            let Ok(raw) = i32::try_from(target) else {
                warn!(pid = target, "Process id out of range");
                continue;
            };
            match kill(Pid::from_raw(raw), signal) {
                Ok(()) => debug!(pid = target, signal = %signal, "Process received signal"),
                Err(e) => warn!(pid = target, signal = %signal, error = %e, "Error sending signal"),
            }
        }
    }
}

impl Default for SignalProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessControl for SignalProcessControl {
    async fn pause(&self, pid: ProcessId) -> Result<()> {
        self.signal_tree(pid, Signal::SIGSTOP).await;
        Ok(())
    }

    async fn resume(&self, pid: ProcessId) -> Result<()> {
        self.signal_tree(pid, Signal::SIGCONT).await;
        Ok(())
    }
}
