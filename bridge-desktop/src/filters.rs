//! Filter Source backed by per-target filter files

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    sync::{FilterSource, SyncTarget},
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File holding the rules of one target.
pub const FILTERS_FILE_NAME: &str = "filters.txt";

const GLOBAL_DIR_NAME: &str = "global";
const SHARED_DIR_NAME: &str = "shared";

/// One rclone filter rule, `+ pattern` or `- pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    Include(String),
    Exclude(String),
}

impl FilterRule {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end();
        if let Some(pattern) = line.strip_prefix("+ ") {
            Ok(FilterRule::Include(pattern.trim().to_string()))
        } else if let Some(pattern) = line.strip_prefix("- ") {
            Ok(FilterRule::Exclude(pattern.trim().to_string()))
        } else {
            Err(BridgeError::OperationFailed(format!(
                "invalid filter rule '{}', expected '+ <path>' or '- <path>'",
                line
            )))
        }
    }

    pub fn is_include(&self) -> bool {
        matches!(self, FilterRule::Include(_))
    }

    pub fn to_line(&self) -> String {
        match self {
            FilterRule::Include(pattern) => format!("+ {}", pattern),
            FilterRule::Exclude(pattern) => format!("- {}", pattern),
        }
    }
}

/// Parse the contents of a filter file, skipping blank lines and `#` comments.
pub fn parse_rules(contents: &str) -> Result<Vec<FilterRule>> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(FilterRule::parse)
        .collect()
}

/// Filter configuration stored as one directory per target:
///
/// ```text
/// <root>/
///   global/filters.txt     target 0
///   shared/filters.txt     rules applied to every target
///   <app id>/filters.txt   one directory per game
/// ```
///
/// A target is eligible for sync once its file holds at least one include
/// rule.
#[derive(Debug, Clone)]
pub struct FilterDirectory {
    root: PathBuf,
}

impl FilterDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the configuration of `target`.
    pub fn target_dir(&self, target: SyncTarget) -> PathBuf {
        let name = match target {
            SyncTarget::GLOBAL => GLOBAL_DIR_NAME.to_string(),
            SyncTarget::SHARED_FILTER => SHARED_DIR_NAME.to_string(),
            other => other.id().to_string(),
        };
        self.root.join(name)
    }

    pub fn filters_path(&self, target: SyncTarget) -> PathBuf {
        self.target_dir(target).join(FILTERS_FILE_NAME)
    }

    /// Parsed rules of `target`; a target without a file has no rules.
    pub async fn rules(&self, target: SyncTarget) -> Result<Vec<FilterRule>> {
        match tokio::fs::read_to_string(self.filters_path(target)).await {
            Ok(contents) => parse_rules(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn target_from_dir_name(name: &str) -> Option<SyncTarget> {
        match name {
            GLOBAL_DIR_NAME => Some(SyncTarget::GLOBAL),
            SHARED_DIR_NAME => None,
            other => other
                .parse::<i64>()
                .ok()
                .filter(|id| *id > 0)
                .map(SyncTarget::new),
        }
    }
}

#[async_trait]
impl FilterSource for FilterDirectory {
    async fn available_targets(&self) -> Result<Vec<SyncTarget>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut targets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(target) = name.to_str().and_then(Self::target_from_dir_name) else {
                continue;
            };
            if self.rules(target).await?.iter().any(FilterRule::is_include) {
                targets.push(target);
            }
        }
        targets.sort();

        debug!(count = targets.len(), "Collected available sync targets");
        Ok(targets)
    }

    async fn get_filters(&self, target: SyncTarget) -> Result<Vec<String>> {
        Ok(self
            .rules(target)
            .await?
            .iter()
            .map(FilterRule::to_line)
            .collect())
    }

    async fn set_filters(&self, target: SyncTarget, filters: Vec<String>) -> Result<()> {
        let rules = filters
            .iter()
            .map(|line| FilterRule::parse(line))
            .collect::<Result<Vec<_>>>()?;

        let dir = self.target_dir(target);
        tokio::fs::create_dir_all(&dir).await?;

        let mut contents = rules
            .iter()
            .map(FilterRule::to_line)
            .collect::<Vec<_>>()
            .join("\n");
        contents.push('\n');
        tokio::fs::write(dir.join(FILTERS_FILE_NAME), contents).await?;

        debug!(target_id = target.id(), rules = rules.len(), "Stored filters");
        Ok(())
    }
}
