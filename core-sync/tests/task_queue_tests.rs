//! Integration tests for the sync task queue
//!
//! These tests verify:
//! - Strict FIFO execution without overlapping runs
//! - Admission gating on the target registry
//! - Busy/idle edge events
//! - Pause/resume bracketing on every exit path
//! - Exit code classification and failure reporting

mod common;

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    Notification, NotificationAction, Notifier, ProcessControl, ProcessId, SyncOperation,
    SyncTarget,
};
use common::{Behavior, Harness, Journal, ScriptedBackend, StaticFilters};
use core_runtime::events::{CoreEvent, EventBus, EventStream, QueueEvent, SyncEvent};
use core_sync::{ProcessGate, QueueConfig, SyncTask, TargetRegistry, TaskKind, TaskQueue};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn sync(target: i64) -> SyncTask {
    SyncTask::sync(SyncTarget::new(target), SyncOperation::Upload)
}

fn busy_edges(events: &mut EventStream) -> Vec<bool> {
    events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            CoreEvent::Queue(QueueEvent::Busy { busy }) => Some(busy),
            _ => None,
        })
        .collect()
}

fn sync_events(events: &mut EventStream) -> Vec<SyncEvent> {
    events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            CoreEvent::Sync(event) => Some(event),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_run_in_admission_order() {
    let ids: Vec<i64> = (1..=8).collect();
    let h = Harness::new(&ids).await;
    h.backend.set_delay(Duration::from_millis(15));
    let mut events = h.event_bus.stream();

    let submits: Vec<_> = ids
        .iter()
        .map(|id| {
            let queue = h.queue.clone();
            let id = *id;
            tokio::spawn(async move { queue.submit(sync(id)).await })
        })
        .collect();
    for submit in submits {
        assert!(submit.await.unwrap().unwrap().is_some());
    }
    h.drain().await;

    let admitted: Vec<i64> = sync_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::Queued { target, .. } => Some(target.id()),
            _ => None,
        })
        .collect();
    assert_eq!(admitted.len(), ids.len());
    assert_eq!(h.backend.run_targets(), admitted);

    let runs = h.backend.runs();
    for pair in runs.windows(2) {
        assert!(
            pair[0].finished <= pair[1].started,
            "runs for {} and {} overlap",
            pair[0].target,
            pair[1].target
        );
    }
}

#[tokio::test]
async fn test_blocked_task_holds_its_position() {
    let h = Harness::new(&[1, 2]).await;
    h.backend.set_delay(Duration::from_millis(10));

    h.queue
        .submit(SyncTask::sync(SyncTarget::new(1), SyncOperation::Download).with_process(100))
        .await
        .unwrap();
    h.queue.submit(sync(2)).await.unwrap();
    h.drain().await;

    assert_eq!(
        h.journal.entries(),
        vec![
            "pause:100",
            "run:1:download:start",
            "run:1:download:end",
            "resume:100",
            "run:2:upload:start",
            "run:2:upload:end",
        ]
    );
}

#[tokio::test]
async fn test_completion_hook_runs_before_next_task() {
    let h = Harness::new(&[1, 2]).await;
    let journal = h.journal.clone();

    h.queue
        .submit(sync(1).on_complete(move |outcome| async move {
            journal.push(format!("hook:{}", outcome.exit_code.unwrap()));
        }))
        .await
        .unwrap();
    h.queue.submit(sync(2)).await.unwrap();
    h.drain().await;

    assert_eq!(
        h.journal.entries(),
        vec![
            "run:1:upload:start",
            "run:1:upload:end",
            "hook:0",
            "run:2:upload:start",
            "run:2:upload:end",
        ]
    );
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_only_registered_targets_execute() {
    let h = Harness::new(&[1, 3]).await;
    let mut events = h.event_bus.stream();

    let first = h.queue.submit(sync(1)).await.unwrap();
    let second = h.queue.submit(sync(2)).await.unwrap();
    let third = h.queue.submit(sync(3)).await.unwrap();
    h.drain().await;

    assert!(first.is_some());
    assert!(second.is_none());
    assert!(third.is_some());
    assert_eq!(h.backend.run_targets(), vec![1, 3]);
    assert!(sync_events(&mut events)
        .iter()
        .all(|event| event.target() != SyncTarget::new(2)));
}

#[tokio::test]
async fn test_denied_task_leaves_queue_untouched() {
    let h = Harness::new(&[]).await;
    let mut events = h.event_bus.stream();

    let handle = h
        .queue
        .submit(SyncTask::sync(SyncTarget::new(9), SyncOperation::Download).with_process(55))
        .await
        .unwrap();

    assert!(handle.is_none());
    assert!(!h.queue.is_busy());
    assert_eq!(h.queue.pending(), 0);
    assert!(events.drain().is_empty());
    // no pause for a task that never ran
    assert!(h.journal.entries().is_empty());
    assert!(h.backend.runs().is_empty());
}

#[tokio::test]
async fn test_screenshot_tasks_bypass_admission() {
    let h = Harness::new(&[]).await;

    let handle = h
        .queue
        .submit(SyncTask::screenshot("76561198000000000", "123/screenshots/shot.jpg"))
        .await
        .unwrap()
        .expect("screenshot uploads are never gated");
    let outcome = handle.wait().await.unwrap();

    assert!(outcome.is_success());
    assert!(matches!(outcome.kind, TaskKind::Screenshot { .. }));
    assert_eq!(
        h.backend.screenshots(),
        vec![(
            "76561198000000000".to_string(),
            "123/screenshots/shot.jpg".to_string()
        )]
    );
}

#[tokio::test]
async fn test_registry_refresh_changes_admission() {
    let h = Harness::new(&[]).await;
    assert!(h.queue.submit(sync(4)).await.unwrap().is_none());

    h.filters.set_eligible(&[4]);
    h.registry.refresh().await.unwrap();

    assert!(h.queue.submit(sync(4)).await.unwrap().is_some());
    h.drain().await;
    assert_eq!(h.backend.run_targets(), vec![4]);
}

// ============================================================================
// Busy state
// ============================================================================

#[tokio::test]
async fn test_busy_edges_fire_once_per_burst() {
    let h = Harness::new(&[1]).await;
    h.backend.set_delay(Duration::from_millis(10));
    let mut events = h.event_bus.stream();

    h.queue.submit(sync(1)).await.unwrap();
    // busy as soon as work is pending
    assert!(h.queue.is_busy());
    assert!(*h.queue.busy_watch().borrow());
    h.queue.submit(sync(1)).await.unwrap();
    h.drain().await;

    assert_eq!(h.backend.run_targets(), vec![1, 1]);
    assert_eq!(busy_edges(&mut events), vec![true, false]);
    assert!(!h.queue.is_busy());

    h.queue.submit(sync(1)).await.unwrap();
    h.drain().await;
    assert_eq!(busy_edges(&mut events), vec![true, false]);
}

#[tokio::test]
async fn test_busy_event_precedes_task_start() {
    let h = Harness::new(&[1]).await;
    let mut events = h.event_bus.stream();

    h.queue.submit(sync(1)).await.unwrap();
    h.drain().await;

    let events = events.drain();
    assert_eq!(events.first(), Some(&CoreEvent::Queue(QueueEvent::Busy { busy: true })));
    assert_eq!(events.last(), Some(&CoreEvent::Queue(QueueEvent::Busy { busy: false })));
    assert!(matches!(events[1], CoreEvent::Sync(SyncEvent::Queued { .. })));
    assert!(matches!(events[2], CoreEvent::Sync(SyncEvent::Started { .. })));
}

#[tokio::test]
async fn test_wait_idle_returns_when_idle() {
    let h = Harness::new(&[]).await;
    tokio::time::timeout(Duration::from_millis(100), h.queue.wait_idle())
        .await
        .expect("idle queue must not block")
        .unwrap();
}

// ============================================================================
// Bracketing and failures
// ============================================================================

#[tokio::test]
async fn test_panicking_task_is_bracketed_and_reported() {
    let h = Harness::new(&[5]).await;
    h.backend.script(5, &[Behavior::Panic]);
    let mut events = h.event_bus.stream();

    let handle = h
        .queue
        .submit(SyncTask::sync(SyncTarget::new(5), SyncOperation::Download).with_process(100))
        .await
        .unwrap()
        .unwrap();
    let outcome = handle.wait().await.unwrap();
    h.drain().await;

    assert_eq!(outcome.exit_code, None);
    assert_eq!(
        h.journal.entries(),
        vec![
            "pause:100",
            "run:5:download:start",
            "run:5:download:end",
            "resume:100"
        ]
    );

    let failures: Vec<SyncEvent> = sync_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, SyncEvent::Failed { .. }))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        SyncEvent::Failed { target, exit_code: None, .. } if *target == SyncTarget::new(5)
    ));
    assert!(!h.queue.is_busy());

    let notifications = h.notifier.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].message,
        "Sync for \"app 5\" failed with exit code unknown, click here to see the errors"
    );
    assert_eq!(notifications[0].duration, Duration::from_secs(10));
    assert_eq!(
        notifications[0].action,
        Some(NotificationAction::OpenTargetLogs(SyncTarget::new(5)))
    );
}

#[tokio::test]
async fn test_resume_runs_on_success_and_error() {
    let h = Harness::new(&[5]).await;
    h.backend.script(5, &[Behavior::Exit(0), Behavior::Error]);

    for _ in 0..2 {
        h.queue
            .submit(sync(5).with_process(100))
            .await
            .unwrap();
    }
    h.drain().await;

    let entries = h.journal.entries();
    assert_eq!(entries.iter().filter(|e| *e == "pause:100").count(), 2);
    assert_eq!(entries.iter().filter(|e| *e == "resume:100").count(), 2);
    assert_eq!(entries.last().map(String::as_str), Some("resume:100"));
}

#[tokio::test]
async fn test_worker_survives_failures() {
    let h = Harness::new(&[1, 2, 3]).await;
    h.backend.script(1, &[Behavior::Panic]);
    h.backend.script(2, &[Behavior::Error]);

    for id in [1, 2, 3] {
        h.queue.submit(sync(id)).await.unwrap();
    }
    h.drain().await;

    assert_eq!(h.backend.run_targets(), vec![1, 2, 3]);
    assert_eq!(h.notifier.notifications().len(), 2);
}

struct PanickingNotifier;

#[async_trait]
impl Notifier for PanickingNotifier {
    async fn notify(&self, _notification: Notification) -> BridgeResult<()> {
        panic!("toaster crashed");
    }
}

struct PanickingResume;

#[async_trait]
impl ProcessControl for PanickingResume {
    async fn pause(&self, _pid: ProcessId) -> BridgeResult<()> {
        Ok(())
    }

    async fn resume(&self, _pid: ProcessId) -> BridgeResult<()> {
        panic!("process table unreadable");
    }
}

#[tokio::test]
async fn test_worker_survives_collaborator_panics() {
    let journal = Journal::default();
    let backend = Arc::new(ScriptedBackend::new(journal));
    backend.script(1, &[Behavior::Exit(1), Behavior::Exit(0)]);
    let registry = Arc::new(TargetRegistry::new(Arc::new(StaticFilters::with_targets(&[1]))));
    registry.refresh().await.unwrap();
    let event_bus = EventBus::new(64);
    let mut events = event_bus.stream();

    let queue = TaskQueue::new(
        registry,
        ProcessGate::new(Arc::new(PanickingResume)),
        backend.clone(),
        Arc::new(PanickingNotifier),
        event_bus,
        QueueConfig::default(),
    );

    let hook_ran = Arc::new(Mutex::new(false));
    let first = {
        let hook_ran = Arc::clone(&hook_ran);
        queue
            .submit(sync(1).with_process(100).on_complete(move |_| async move {
                *hook_ran.lock().unwrap() = true;
            }))
            .await
            .unwrap()
            .unwrap()
    };
    let outcome = first.wait().await.unwrap();
    assert_eq!(outcome.exit_code, Some(1));
    assert!(*hook_ran.lock().unwrap());

    tokio::time::timeout(Duration::from_millis(500), queue.wait_idle())
        .await
        .expect("queue stayed busy")
        .unwrap();
    assert!(!queue.is_busy());

    let second = queue.submit(sync(1)).await.unwrap().unwrap();
    assert!(second.wait().await.unwrap().is_success());
    assert_eq!(backend.run_targets(), vec![1, 1]);
    queue.wait_idle().await.unwrap();
    assert_eq!(busy_edges(&mut events), vec![true, false, true, false]);
}

#[tokio::test]
async fn test_exit_code_classification() {
    let cases = [(0, true), (6, true), (-1, false), (1, false), (5, false), (7, false)];
    let h = Harness::new(&[1]).await;
    h.backend.script(
        1,
        &cases.iter().map(|(code, _)| Behavior::Exit(*code)).collect::<Vec<_>>(),
    );
    let mut events = h.event_bus.stream();

    let mut handles = Vec::new();
    for _ in cases {
        handles.push(h.queue.submit(sync(1)).await.unwrap().unwrap());
    }
    for (handle, (code, success)) in handles.into_iter().zip(cases) {
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.exit_code, Some(code));
        assert_eq!(outcome.is_success(), success, "exit code {}", code);
    }
    h.drain().await;

    let reported: Vec<(i32, bool)> = sync_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::Completed { exit_code, .. } => Some((exit_code, true)),
            SyncEvent::Failed { exit_code, .. } => Some((exit_code.unwrap(), false)),
            _ => None,
        })
        .collect();
    assert_eq!(reported, cases.to_vec());
    assert_eq!(h.notifier.notifications().len(), 4);
}

#[tokio::test]
async fn test_two_tasks_same_target_scenario() {
    let h = Harness::new(&[7]).await;
    let mut events = h.event_bus.stream();
    let observed = Arc::new(Mutex::new(Vec::new()));

    let mut busy = h.queue.busy_watch();
    let watcher = {
        let observed = Arc::clone(&observed);
        tokio::spawn(async move {
            while busy.changed().await.is_ok() {
                let value = *busy.borrow();
                observed.lock().unwrap().push(value);
                if !value {
                    break;
                }
            }
        })
    };

    h.queue.submit(sync(7)).await.unwrap();
    h.queue.submit(sync(7)).await.unwrap();
    h.drain().await;
    watcher.await.unwrap();

    assert_eq!(h.backend.run_targets(), vec![7, 7]);
    assert_eq!(busy_edges(&mut events), vec![true, false]);
    assert_eq!(observed.lock().unwrap().last(), Some(&false));
    assert!(h.notifier.notifications().is_empty());
}

#[tokio::test]
async fn test_dropped_handle_does_not_cancel() {
    let h = Harness::new(&[1]).await;
    h.backend.set_delay(Duration::from_millis(10));

    drop(h.queue.submit(sync(1)).await.unwrap());
    h.drain().await;

    assert_eq!(h.backend.run_targets(), vec![1]);
}
