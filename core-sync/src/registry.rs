//! # Target Registry
//!
//! Snapshot of the sync targets that currently have a usable filter
//! configuration.
//!
//! ## Overview
//!
//! The registry is the admission gate of the task queue: a sync is never
//! attempted for a target that is not in the last snapshot. The snapshot is
//! fetched from the [`FilterSource`] and replaced as a whole, so readers see
//! either the previous set or the new one, never a mix.
//!
//! Every filter write made through the registry refreshes the snapshot.

use bridge_traits::{FilterSource, SyncTarget};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::Result;

/// Set of targets eligible for sync.
pub struct TargetRegistry {
    source: Arc<dyn FilterSource>,
    snapshot: RwLock<Arc<HashSet<SyncTarget>>>,
    /// Serializes refreshes so an older fetch never overwrites a newer one.
    refresh_lock: Mutex<()>,
}

impl TargetRegistry {
    /// Create an empty registry. Call [`refresh`](Self::refresh) to load it.
    pub fn new(source: Arc<dyn FilterSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(HashSet::new())),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Reload the eligible set from the filter source.
    ///
    /// Returns the number of eligible targets. On error the previous snapshot
    /// is kept.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize> {
        let _guard = self.refresh_lock.lock().await;

        let targets: HashSet<SyncTarget> =
            self.source.available_targets().await?.into_iter().collect();
        let count = targets.len();

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(targets);

        debug!(count, "Refreshed sync target registry");
        Ok(count)
    }

    /// Whether `target` was eligible at the last refresh.
    pub fn has(&self, target: SyncTarget) -> bool {
        self.snapshot().contains(&target)
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<HashSet<SyncTarget>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Filter lines of a target, or of the shared filter set.
    pub async fn filters(&self, target: SyncTarget) -> Result<Vec<String>> {
        Ok(self.source.get_filters(target).await?)
    }

    /// Replace the filter lines of a target and refresh the snapshot.
    #[instrument(skip(self, filters), fields(target_id = target.id(), count = filters.len()))]
    pub async fn set_filters(&self, target: SyncTarget, filters: Vec<String>) -> Result<()> {
        self.source.set_filters(target, filters).await?;
        info!("Updated sync filters");

        self.refresh().await?;
        Ok(())
    }
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("eligible", &self.snapshot().len())
            .finish()
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
        Filters {}

        #[async_trait]
        impl FilterSource for Filters {
            async fn available_targets(&self) -> BridgeResult<Vec<SyncTarget>>;
            async fn get_filters(&self, target: SyncTarget) -> BridgeResult<Vec<String>>;
            async fn set_filters(&self, target: SyncTarget, filters: Vec<String>) -> BridgeResult<()>;
        }
    }

    fn targets(ids: &[i64]) -> Vec<SyncTarget> {
        ids.iter().copied().map(SyncTarget::new).collect()
    }

    #[tokio::test]
    async fn test_empty_until_refreshed() {
        let mut source = MockFilters::new();
        source
            .expect_available_targets()
            .times(1)
            .returning(|| Ok(targets(&[1, 3])));

        let registry = TargetRegistry::new(Arc::new(source));
        assert!(!registry.has(SyncTarget::new(1)));

        assert_eq!(registry.refresh().await.unwrap(), 2);
        assert!(registry.has(SyncTarget::new(1)));
        assert!(!registry.has(SyncTarget::new(2)));
        assert!(registry.has(SyncTarget::new(3)));
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let mut source = MockFilters::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_available_targets()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(targets(&[1, 2])));
        source
            .expect_available_targets()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(targets(&[2, 7])));

        let registry = TargetRegistry::new(Arc::new(source));
        registry.refresh().await.unwrap();
        let before = registry.snapshot();

        registry.refresh().await.unwrap();

        assert!(!registry.has(SyncTarget::new(1)));
        assert!(registry.has(SyncTarget::new(7)));
        // readers holding the old snapshot keep a consistent view
        assert!(before.contains(&SyncTarget::new(1)));
        assert_eq!(before.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let mut source = MockFilters::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_available_targets()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(targets(&[4])));
        source
            .expect_available_targets()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(BridgeError::OperationFailed("disk gone".to_string())));

        let registry = TargetRegistry::new(Arc::new(source));
        registry.refresh().await.unwrap();

        assert!(registry.refresh().await.is_err());
        assert!(registry.has(SyncTarget::new(4)));
    }

    #[tokio::test]
    async fn test_set_filters_triggers_refresh() {
        let mut source = MockFilters::new();
        source
            .expect_set_filters()
            .with(eq(SyncTarget::new(9)), eq(vec!["+ saves/**".to_string()]))
            .times(1)
            .returning(|_, _| Ok(()));
        source
            .expect_available_targets()
            .times(1)
            .returning(|| Ok(targets(&[9])));

        let registry = TargetRegistry::new(Arc::new(source));
        registry
            .set_filters(SyncTarget::new(9), vec!["+ saves/**".to_string()])
            .await
            .unwrap();

        assert!(registry.has(SyncTarget::new(9)));
    }

    #[tokio::test]
    async fn test_shared_filters_are_read_through() {
        let mut source = MockFilters::new();
        source
            .expect_get_filters()
            .with(eq(SyncTarget::SHARED_FILTER))
            .returning(|_| Ok(vec!["- **/*.log".to_string()]));

        let registry = TargetRegistry::new(Arc::new(source));
        let filters = registry.filters(SyncTarget::SHARED_FILTER).await.unwrap();

        assert_eq!(filters, vec!["- **/*.log"]);
    }
}
