//! Sync Backend driving the rclone command line tool

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
    sync::{ExitCode, SyncBackend, SyncDirection, SyncOperation, SyncTarget},
    time::{Clock, SystemClock},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::filters::{FilterDirectory, FilterRule};

/// Remote name configured in `rclone.conf`.
pub const REMOTE_NAME: &str = "backend";

/// Per-target rclone log files kept on disk.
pub const DEFAULT_MAX_LOG_FILES: usize = 5;

const LOG_FILE_PREFIX: &str = "rclone ";
const LOG_FILE_SUFFIX: &str = ".log";
const LOCK_FILE_EXTENSION: &str = "lck";

/// Settings keys read by the rclone backend.
pub mod keys {
    pub const BISYNC: &str = "bisync";
    pub const SYNC_ROOT: &str = "sync_root";
    pub const DESTINATION_DIRECTORY: &str = "destination_directory";
    pub const ADDITIONAL_SYNC_ARGS: &str = "additional_sync_args";
    pub const SCREENSHOT_SYNC_DESTINATION: &str = "screenshot_sync_destination";
}

/// User-editable rclone settings, re-read from the settings store before
/// every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcloneSettings {
    /// Use `bisync` instead of a one-way `copy`.
    pub bisync: bool,
    /// Local side of every target sync.
    pub sync_root: String,
    /// Directory on the remote that receives target syncs.
    pub destination_directory: String,
    /// Extra arguments appended to every target sync.
    pub additional_args: Vec<String>,
    /// Directory on the remote that receives screenshots.
    pub screenshot_destination: String,
}

impl Default for RcloneSettings {
    fn default() -> Self {
        Self {
            bisync: false,
            sync_root: "/".to_string(),
            destination_directory: "decky-cloud-save".to_string(),
            additional_args: Vec::new(),
            screenshot_destination: "deck-libraries/Pictures".to_string(),
        }
    }
}

impl RcloneSettings {
    /// Read the settings, falling back to defaults for missing keys.
    ///
    /// `additional_sync_args` holds a JSON array of strings; a plain string
    /// is split on whitespace.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let defaults = Self::default();

        let additional_args = match store.get_string(keys::ADDITIONAL_SYNC_ARGS).await? {
            Some(value) => parse_args(&value),
            None => defaults.additional_args,
        };

        Ok(Self {
            bisync: store.get_bool(keys::BISYNC).await?.unwrap_or(defaults.bisync),
            sync_root: store
                .get_string(keys::SYNC_ROOT)
                .await?
                .unwrap_or(defaults.sync_root),
            destination_directory: store
                .get_string(keys::DESTINATION_DIRECTORY)
                .await?
                .unwrap_or(defaults.destination_directory),
            additional_args,
            screenshot_destination: store
                .get_string(keys::SCREENSHOT_SYNC_DESTINATION)
                .await?
                .unwrap_or(defaults.screenshot_destination),
        })
    }

    /// Write every setting back to the store.
    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set_bool(keys::BISYNC, self.bisync).await?;
        store.set_string(keys::SYNC_ROOT, &self.sync_root).await?;
        store
            .set_string(keys::DESTINATION_DIRECTORY, &self.destination_directory)
            .await?;
        store
            .set_string(
                keys::ADDITIONAL_SYNC_ARGS,
                &serde_json::to_string(&self.additional_args)?,
            )
            .await?;
        store
            .set_string(keys::SCREENSHOT_SYNC_DESTINATION, &self.screenshot_destination)
            .await?;
        Ok(())
    }
}

fn parse_args(value: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(value)
        .unwrap_or_else(|_| value.split_whitespace().map(str::to_string).collect())
}

/// Installation paths of rclone and its working files.
#[derive(Debug, Clone)]
pub struct RcloneOptions {
    /// rclone executable (or launcher script).
    pub binary: PathBuf,
    /// `--config` file, rclone's default lookup when unset.
    pub config_path: Option<PathBuf>,
    /// Root of the per-target log directories.
    pub log_dir: PathBuf,
    /// Scratch space for generated filter files.
    pub runtime_dir: PathBuf,
    /// Steam userdata directory, used to locate captured screenshots.
    pub userdata_dir: PathBuf,
    /// rclone's bisync working directory, holding the run locks.
    pub bisync_cache_dir: PathBuf,
    pub max_log_files: usize,
}

impl RcloneOptions {
    /// Defaults rooted at a plugin settings directory.
    pub fn new(settings_dir: impl AsRef<Path>) -> Self {
        let settings_dir = settings_dir.as_ref();
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let cache = dirs::cache_dir().unwrap_or_else(|| home.join(".cache"));
        Self {
            binary: PathBuf::from("rclone"),
            config_path: Some(settings_dir.join("rclone.conf")),
            log_dir: settings_dir.join("logs"),
            runtime_dir: settings_dir.join("runtime"),
            userdata_dir: home.join(".steam").join("steam").join("userdata"),
            bisync_cache_dir: cache.join("rclone").join("bisync"),
            max_log_files: DEFAULT_MAX_LOG_FILES,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_bisync_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bisync_cache_dir = dir.into();
        self
    }
}

/// rclone-backed [`SyncBackend`].
///
/// Every run reloads [`RcloneSettings`], regenerates the target's filter file
/// from its own rules plus the shared rules, opens a fresh log file and waits
/// for rclone to exit.
pub struct RcloneSyncBackend {
    options: RcloneOptions,
    filters: FilterDirectory,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
}

impl RcloneSyncBackend {
    pub fn new(
        options: RcloneOptions,
        filters: FilterDirectory,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            options,
            filters,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used to name log files.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &RcloneOptions {
        &self.options
    }

    pub async fn settings(&self) -> Result<RcloneSettings> {
        RcloneSettings::load(self.settings.as_ref()).await
    }

    fn target_dir_name(target: SyncTarget) -> String {
        if target.is_global() {
            "global".to_string()
        } else {
            target.id().to_string()
        }
    }

    fn target_log_dir(&self, target: SyncTarget) -> PathBuf {
        self.options.log_dir.join(Self::target_dir_name(target))
    }

    fn remote_path(settings: &RcloneSettings, target: SyncTarget) -> String {
        if target.is_global() {
            format!("{}:{}", REMOTE_NAME, settings.destination_directory)
        } else {
            format!("{}:{}/{}", REMOTE_NAME, settings.destination_directory, target)
        }
    }

    /// Combine target and shared rules into an rclone `--filter-from` file:
    /// excludes first, then includes, then exclude everything else.
    async fn write_filter_file(&self, target: SyncTarget) -> Result<PathBuf> {
        let mut rules = self.filters.rules(target).await?;
        rules.extend(self.filters.rules(SyncTarget::SHARED_FILTER).await?);

        let (includes, excludes): (Vec<_>, Vec<_>) =
            rules.into_iter().partition(FilterRule::is_include);

        let mut contents = String::new();
        for rule in excludes.iter().chain(includes.iter()) {
            contents.push_str(&rule.to_line());
            contents.push('\n');
        }
        contents.push_str("- **\n");

        let dir = self.options.runtime_dir.join(Self::target_dir_name(target));
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("filter.txt");
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Create a timestamped log file and drop the oldest ones past the limit.
    async fn create_log_file(&self, target: SyncTarget) -> Result<PathBuf> {
        let dir = self.target_log_dir(target);
        tokio::fs::create_dir_all(&dir).await?;

        let stamp = self
            .clock
            .now()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H.%M.%S");
        let path = dir.join(format!("{}{}{}", LOG_FILE_PREFIX, stamp, LOG_FILE_SUFFIX));
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let logs = list_log_files(&dir).await?;
        if logs.len() > self.options.max_log_files {
            for old in &logs[..logs.len() - self.options.max_log_files] {
                if let Err(e) = tokio::fs::remove_file(old).await {
                    warn!(path = ?old, error = %e, "Failed to remove old rclone log");
                }
            }
        }
        Ok(path)
    }

    /// Command-line arguments (without the binary) for one target sync.
    pub fn build_args(
        &self,
        settings: &RcloneSettings,
        target: SyncTarget,
        operation: SyncOperation,
        filter_file: &Path,
        log_file: &Path,
    ) -> Vec<String> {
        let local = settings.sync_root.clone();
        let remote = Self::remote_path(settings, target);
        let direction = operation.direction();

        let mut args = Vec::new();
        if let Some(config) = &self.options.config_path {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }

        if settings.bisync {
            args.extend([local, remote]);
        } else {
            match direction {
                SyncDirection::Upload => args.extend([local, remote]),
                SyncDirection::Download => args.extend([remote, local]),
            }
        }

        args.push("--filter-from".to_string());
        args.push(filter_file.display().to_string());
        args.push(if settings.bisync { "bisync" } else { "copy" }.to_string());
        args.push("--copy-links".to_string());

        if settings.bisync {
            let winner = match direction {
                SyncDirection::Upload => "path1",
                SyncDirection::Download => "path2",
            };
            if operation.is_resync() {
                args.extend(["--resync-mode".to_string(), winner.to_string()]);
                args.push("--resync".to_string());
            } else {
                args.extend(["--conflict-resolve".to_string(), winner.to_string()]);
            }
        }

        args.extend(
            ["--transfers", "8", "--checkers", "16", "--log-file"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(log_file.display().to_string());
        args.extend(["--log-format", "none", "-v"].iter().map(|s| s.to_string()));
        args.extend(settings.additional_args.iter().cloned());
        args
    }

    /// Local path of a screenshot given its host URL, e.g.
    /// `https://host/screenshots/7/screenshots/20250218080004_1.jpg`.
    pub fn local_screenshot_path(&self, user_id: &str, url: &str) -> Result<PathBuf> {
        let segments: Vec<&str> = url.trim_end_matches('/').rsplit('/').take(3).collect();
        if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(BridgeError::OperationFailed(format!(
                "invalid screenshot url '{}'",
                url
            )));
        }

        let mut path = self.options.userdata_dir.join(user_id).join("760").join("remote");
        for segment in segments.iter().rev() {
            path.push(segment);
        }
        Ok(path)
    }

    /// Contents of the newest log of `target`.
    pub async fn last_sync_log(&self, target: SyncTarget) -> Result<Option<String>> {
        let logs = list_log_files(&self.target_log_dir(target)).await?;
        match logs.last() {
            Some(path) => Ok(Some(tokio::fs::read_to_string(path).await?)),
            None => Ok(None),
        }
    }

    /// Remove stale bisync locks. An interrupted bisync leaves its lock
    /// behind and rclone refuses every later bisync of the same paths.
    pub async fn remove_bisync_locks(&self) -> Result<usize> {
        let dir = &self.options.bisync_cache_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LOCK_FILE_EXTENSION) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(removed, dir = ?dir, "Deleted rclone lock files");
        Ok(removed)
    }

    async fn execute(&self, args: Vec<String>) -> Result<ExitCode> {
        info!(
            binary = ?self.options.binary,
            args = %args.join(" "),
            "Running rclone"
        );

        let status = Command::new(&self.options.binary)
            .args(&args)
            .status()
            .await?;

        status.code().ok_or_else(|| {
            BridgeError::OperationFailed("rclone was terminated by a signal".to_string())
        })
    }
}

async fn list_log_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut logs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_SUFFIX) {
            logs.push(entry.path());
        }
    }
    // timestamps sort lexicographically
    logs.sort();
    Ok(logs)
}

#[async_trait]
impl SyncBackend for RcloneSyncBackend {
    async fn run(&self, target: SyncTarget, operation: SyncOperation) -> Result<ExitCode> {
        let settings = self.settings().await?;
        let filter_file = self.write_filter_file(target).await?;
        let log_file = self.create_log_file(target).await?;
        let args = self.build_args(&settings, target, operation, &filter_file, &log_file);

        let code = self.execute(args).await?;
        info!(
            target_id = target.id(),
            operation = %operation,
            log_file = ?log_file,
            exit_code = code,
            "Sync finished"
        );
        Ok(code)
    }

    async fn sync_screenshot(&self, user_id: &str, url: &str) -> Result<ExitCode> {
        let settings = self.settings().await?;
        let local = self.local_screenshot_path(user_id, url)?;
        let remote = format!("{}:{}", REMOTE_NAME, settings.screenshot_destination);

        let mut args = Vec::new();
        if let Some(config) = &self.options.config_path {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        args.push("copy".to_string());
        args.push(local.display().to_string());
        args.push(remote);

        debug!(screenshot = ?local, "Uploading screenshot");
        self.execute(args).await
    }

    async fn delete_lock_files(&self) -> Result<usize> {
        self.remove_bisync_locks().await
    }
}
