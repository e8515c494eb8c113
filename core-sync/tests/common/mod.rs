//! Hand-written bridge mocks shared by the integration tests.
//!
//! Every mock writes into one [`Journal`] so tests can assert on the global
//! order of pause, run and resume calls.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    ExitCode, FilterSource, Notification, Notifier, ProcessControl, ProcessId, ScreenshotStore,
    SettingsStore, SyncBackend, SyncOperation, SyncTarget,
};
use core_runtime::events::EventBus;
use core_sync::{
    OrchestratorConfig, ProcessGate, QueueConfig, SyncOrchestrator, SyncStateTracker,
    TargetRegistry, TaskQueue,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ============================================================================
// Journal
// ============================================================================

#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

// ============================================================================
// Sync backend
// ============================================================================

/// Scripted result of one backend call.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Exit(ExitCode),
    Error,
    Panic,
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub target: SyncTarget,
    pub operation: SyncOperation,
    pub started: Instant,
    pub finished: Instant,
}

pub struct ScriptedBackend {
    journal: Journal,
    behaviors: Mutex<HashMap<SyncTarget, Vec<Behavior>>>,
    screenshot_behavior: Mutex<Behavior>,
    delay: Mutex<Duration>,
    runs: Mutex<Vec<RunRecord>>,
    screenshots: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            behaviors: Mutex::new(HashMap::new()),
            screenshot_behavior: Mutex::new(Behavior::Exit(0)),
            delay: Mutex::new(Duration::ZERO),
            runs: Mutex::new(Vec::new()),
            screenshots: Mutex::new(Vec::new()),
        }
    }

    /// Queue behaviors for the next runs of `target`. Unscripted runs exit 0.
    pub fn script(&self, target: i64, behaviors: &[Behavior]) {
        self.behaviors
            .lock()
            .unwrap()
            .entry(SyncTarget::new(target))
            .or_default()
            .extend_from_slice(behaviors);
    }

    pub fn script_screenshot(&self, behavior: Behavior) {
        *self.screenshot_behavior.lock().unwrap() = behavior;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.lock().unwrap().clone()
    }

    pub fn run_targets(&self) -> Vec<i64> {
        self.runs().iter().map(|run| run.target.id()).collect()
    }

    pub fn screenshots(&self) -> Vec<(String, String)> {
        self.screenshots.lock().unwrap().clone()
    }

    fn next_behavior(&self, target: SyncTarget) -> Behavior {
        let mut behaviors = self.behaviors.lock().unwrap();
        match behaviors.get_mut(&target) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => Behavior::Exit(0),
        }
    }
}

fn apply(behavior: Behavior) -> BridgeResult<ExitCode> {
    match behavior {
        Behavior::Exit(code) => Ok(code),
        Behavior::Error => Err(BridgeError::OperationFailed("rclone not found".to_string())),
        Behavior::Panic => panic!("scripted backend panic"),
    }
}

#[async_trait]
impl SyncBackend for ScriptedBackend {
    async fn run(&self, target: SyncTarget, operation: SyncOperation) -> BridgeResult<ExitCode> {
        let behavior = self.next_behavior(target);
        let delay = *self.delay.lock().unwrap();
        let started = Instant::now();
        self.journal
            .push(format!("run:{}:{}:start", target.id(), operation));

        tokio::time::sleep(delay).await;

        self.journal.push(format!("run:{}:{}:end", target.id(), operation));
        self.runs.lock().unwrap().push(RunRecord {
            target,
            operation,
            started,
            finished: Instant::now(),
        });
        apply(behavior)
    }

    async fn sync_screenshot(&self, user_id: &str, url: &str) -> BridgeResult<ExitCode> {
        self.journal.push(format!("screenshot:{}", url));
        self.screenshots
            .lock()
            .unwrap()
            .push((user_id.to_string(), url.to_string()));
        let behavior = *self.screenshot_behavior.lock().unwrap();
        apply(behavior)
    }
}

// ============================================================================
// Filters, process control, notifications, storage
// ============================================================================

#[derive(Default)]
pub struct StaticFilters {
    eligible: Mutex<Vec<SyncTarget>>,
    filters: Mutex<HashMap<SyncTarget, Vec<String>>>,
}

impl StaticFilters {
    pub fn with_targets(ids: &[i64]) -> Self {
        let filters = Self::default();
        filters.set_eligible(ids);
        filters
    }

    pub fn set_eligible(&self, ids: &[i64]) {
        *self.eligible.lock().unwrap() = ids.iter().copied().map(SyncTarget::new).collect();
    }
}

#[async_trait]
impl FilterSource for StaticFilters {
    async fn available_targets(&self) -> BridgeResult<Vec<SyncTarget>> {
        Ok(self.eligible.lock().unwrap().clone())
    }

    async fn get_filters(&self, target: SyncTarget) -> BridgeResult<Vec<String>> {
        Ok(self
            .filters
            .lock()
            .unwrap()
            .get(&target)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_filters(&self, target: SyncTarget, filters: Vec<String>) -> BridgeResult<()> {
        let has_include = filters.iter().any(|line| line.starts_with("+ "));
        self.filters.lock().unwrap().insert(target, filters);

        let mut eligible = self.eligible.lock().unwrap();
        eligible.retain(|t| *t != target);
        if has_include && !target.is_shared_filter() {
            eligible.push(target);
        }
        Ok(())
    }
}

pub struct RecordingProcessControl {
    journal: Journal,
}

#[async_trait]
impl ProcessControl for RecordingProcessControl {
    async fn pause(&self, pid: ProcessId) -> BridgeResult<()> {
        self.journal.push(format!("pause:{}", pid));
        Ok(())
    }

    async fn resume(&self, pid: ProcessId) -> BridgeResult<()> {
        self.journal.push(format!("resume:{}", pid));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .map(|notification| notification.message)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> BridgeResult<()> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.set_string(key, &value.to_string()).await
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(key)
            .map(|value| value == "true"))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.values.lock().unwrap().contains_key(key))
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().unwrap().keys().cloned().collect())
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.values.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingScreenshotStore {
    fail: Mutex<bool>,
    deleted: Mutex<Vec<(i64, i64)>>,
}

impl RecordingScreenshotStore {
    pub fn fail_deletes(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn deleted(&self) -> Vec<(i64, i64)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScreenshotStore for RecordingScreenshotStore {
    async fn delete_local(&self, game_id: i64, handle: i64) -> BridgeResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(BridgeError::OperationFailed("screenshot is locked".to_string()));
        }
        self.deleted.lock().unwrap().push((game_id, handle));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A queue and orchestrator wired to recording mocks.
pub struct Harness {
    pub journal: Journal,
    pub backend: Arc<ScriptedBackend>,
    pub filters: Arc<StaticFilters>,
    pub settings: Arc<MemorySettings>,
    pub notifier: Arc<RecordingNotifier>,
    pub screenshots: Arc<RecordingScreenshotStore>,
    pub event_bus: EventBus,
    pub registry: Arc<TargetRegistry>,
    pub queue: TaskQueue,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    /// Build a harness whose registry holds `eligible`.
    pub async fn new(eligible: &[i64]) -> Self {
        let journal = Journal::default();
        let backend = Arc::new(ScriptedBackend::new(journal.clone()));
        let filters = Arc::new(StaticFilters::with_targets(eligible));
        let settings = Arc::new(MemorySettings::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let screenshots = Arc::new(RecordingScreenshotStore::default());
        let process = Arc::new(RecordingProcessControl {
            journal: journal.clone(),
        });
        let event_bus = EventBus::new(256);

        let registry = Arc::new(TargetRegistry::new(filters.clone()));
        registry.refresh().await.unwrap();

        let queue = TaskQueue::new(
            Arc::clone(&registry),
            ProcessGate::new(process),
            backend.clone(),
            notifier.clone(),
            event_bus.clone(),
            QueueConfig::default(),
        );
        let tracker = Arc::new(SyncStateTracker::new(settings.clone()));
        let orchestrator = SyncOrchestrator::new(
            queue.clone(),
            Arc::clone(&registry),
            tracker,
            settings.clone(),
            notifier.clone(),
            event_bus.clone(),
            OrchestratorConfig::default(),
        )
        .with_screenshot_store(screenshots.clone());

        Self {
            journal,
            backend,
            filters,
            settings,
            notifier,
            screenshots,
            event_bus,
            registry,
            queue,
            orchestrator,
        }
    }

    pub async fn set_setting(&self, key: &str, value: bool) {
        self.settings.set_bool(key, value).await.unwrap();
    }

    /// Wait for the queue to drain, failing the test if it takes too long.
    pub async fn drain(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.queue.wait_idle())
            .await
            .expect("queue did not drain")
            .unwrap();
    }
}
