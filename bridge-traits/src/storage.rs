//! Storage Abstractions
//!
//! Persistent key/value settings and access to locally captured screenshots.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage:
/// - Desktop: a JSON file in the plugin settings directory
/// - Embedded web runtimes: localStorage
///
/// Values survive process restarts. The sync state markers and the plugin
/// configuration both live here.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("log_level", "DEBUG").await?;
///     store.set_bool("sync_on_game_stop", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Delete a setting. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;
}

/// Host screenshot library.
#[async_trait]
pub trait ScreenshotStore: Send + Sync {
    /// Delete a screenshot from local storage after it has been uploaded.
    async fn delete_local(&self, game_id: i64, handle: i64) -> Result<()>;
}
