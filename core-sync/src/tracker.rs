//! Persisted "local and cloud are consistent" markers.
//!
//! A marker is written when a download runs for a target and removed when the
//! matching upload succeeds. A target that still carries a marker at the next
//! game start missed its upload, so downloading would overwrite newer local
//! saves with stale cloud data.
//!
//! Markers are only meaningful when both automatic directions are enabled
//! ([`SyncSettings::strict_sync`]). Otherwise every target reads as in sync
//! and writes are ignored.

use bridge_traits::{SettingsStore, SyncTarget};
use core_runtime::config::SyncSettings;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

/// Prefix of the per-target marker key in the settings store.
pub const IN_SYNC_KEY_PREFIX: &str = "decky-cloud-save-in-sync-";

pub struct SyncStateTracker {
    store: Arc<dyn SettingsStore>,
}

impl SyncStateTracker {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Settings key holding the marker of `target`.
    pub fn marker_key(target: SyncTarget) -> String {
        format!("{}{}", IN_SYNC_KEY_PREFIX, target.id())
    }

    async fn is_enforced(&self) -> Result<bool> {
        Ok(SyncSettings::load(self.store.as_ref()).await?.strict_sync())
    }

    /// Record whether `target` is consistent. No-op unless strict sync is on.
    pub async fn set_in_sync(&self, target: SyncTarget, in_sync: bool) -> Result<()> {
        if !self.is_enforced().await? {
            return Ok(());
        }

        let key = Self::marker_key(target);
        if in_sync {
            self.store.delete(&key).await?;
        } else {
            self.store.set_string(&key, "").await?;
        }

        debug!(target_id = target.id(), in_sync, "Updated sync state marker");
        Ok(())
    }

    /// `true` unless strict sync is on and a marker exists for `target`.
    pub async fn is_in_sync(&self, target: SyncTarget) -> Result<bool> {
        if !self.is_enforced().await? {
            return Ok(true);
        }

        Ok(!self.store.has_key(&Self::marker_key(target)).await?)
    }
}

impl std::fmt::Debug for SyncStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStateTracker").finish_non_exhaustive()
    }
}
