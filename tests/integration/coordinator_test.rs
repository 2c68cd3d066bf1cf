//! Status coordination tests
//!
//! Exactly-once notices across failures, retries and connectivity changes.

use pattern_sync::offline::MutationId;
use pattern_sync::sync::{ListenerPolicy, Notice};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::common::{ScriptedMutation, Session, WINDOW};
use crate::{assert_failure_notices, assert_last_error};

#[tokio::test]
async fn test_two_failures_then_partial_retry() {
    let session = Session::in_memory();
    let tracker = session.service.tracker();
    let _listener = session.listener(ListenerPolicy::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = session.service.subscribe(move |snapshot| {
        sink.lock().unwrap().push(snapshot.last_error_mutation_id);
    });

    let first = ScriptedMutation::failing("network error");
    let second = ScriptedMutation::failing("conflict");
    tracker.track(MutationId(101), first.retry()).await;
    tracker.fail(MutationId(101), "network error").await;
    tracker.track(MutationId(102), second.retry()).await;
    tracker.fail(MutationId(102), "conflict").await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(MutationId(101)), Some(MutationId(102))]
    );
    assert_last_error!(session.service.snapshot(), 102, "conflict");

    first.succeed();
    let report = session.service.retry_all().await;
    assert_eq!(report.succeeded, vec![MutationId(101)]);
    assert_eq!(report.failed, vec![MutationId(102)]);

    // Nothing new was published and only 102 is still tracked.
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_last_error!(session.service.snapshot(), 102, "conflict");
    let records = tracker.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, MutationId(102));

    let notices = session.notifier.take();
    assert_failure_notices!(notices, 2);
}

#[tokio::test]
async fn test_failures_announced_in_failure_order_not_id_order() {
    let session = Session::in_memory();
    let tracker = session.service.tracker();
    let _listener = session.listener(ListenerPolicy::default());

    let earlier = tracker.next_id();
    let later = tracker.next_id();
    tracker.fail(later, "conflict").await;
    tracker.fail(earlier, "network error").await;

    assert_eq!(
        session.notifier.take(),
        vec![
            Notice::SyncFailed {
                mutation_id: later,
                message: "conflict".to_string()
            },
            Notice::SyncFailed {
                mutation_id: earlier,
                message: "network error".to_string()
            },
        ]
    );
    assert_last_error!(session.service.snapshot(), earlier.0, "network error");

    // Failing again moves the exposed error without a second notice.
    tracker.fail(later, "conflict").await;
    assert!(session.notifier.take().is_empty());
    assert_last_error!(session.service.snapshot(), later.0, "conflict");
}

#[tokio::test]
async fn test_retry_twice_does_not_replay_successes() {
    let session = Session::in_memory();
    let tracker = session.service.tracker();

    let ok = ScriptedMutation::failing("network error");
    tracker.track(MutationId(1), ok.retry()).await;
    tracker.fail(MutationId(1), "network error").await;
    ok.succeed();

    assert_eq!(session.service.retry_all().await.attempted, 1);
    assert_eq!(session.service.retry_all().await.attempted, 0);
    assert_eq!(ok.attempts(), 1);
    assert_last_error!(session.service.snapshot(), None);
}

#[tokio::test]
async fn test_remount_does_not_replay_failure() {
    let session = Session::in_memory();
    let listener = session.listener(ListenerPolicy::default());
    session
        .service
        .tracker()
        .fail(MutationId(7), "conflict")
        .await;
    assert_eq!(session.notifier.take().len(), 1);

    listener.unmount();
    listener.mount();
    assert!(!listener.mount());
    session
        .service
        .tracker()
        .fail(MutationId(7), "conflict")
        .await;

    assert!(session.notifier.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_flap_within_window_is_silent() {
    let session = Session::in_memory();
    let _listener = session.listener(ListenerPolicy::default());

    session.set_online(false);
    sleep(Duration::from_millis(100)).await;
    session.set_online(true);
    sleep(WINDOW * 4).await;

    assert!(session.notifier.take().is_empty());
    assert!(session.service.snapshot().is_online);
}

#[tokio::test(start_paused = true)]
async fn test_offline_online_notices_once_each() {
    let session = Session::in_memory();
    let _listener = session.listener(ListenerPolicy::default());

    for _ in 0..5 {
        session.set_online(false);
    }
    sleep(WINDOW * 2).await;
    for _ in 0..5 {
        session.set_online(true);
    }
    sleep(WINDOW * 2).await;

    assert_eq!(
        session.notifier.take(),
        vec![Notice::Offline, Notice::BackOnline]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unmount_mid_retry() {
    let session = Session::in_memory();
    let tracker = session.service.tracker().clone();
    let listener = session.listener(ListenerPolicy {
        retry_on_reconnect: false,
    });

    let mutation = ScriptedMutation::failing("network error");
    tracker.track(MutationId(1), mutation.retry()).await;
    tracker.fail(MutationId(1), "network error").await;
    session.notifier.take();

    // The retry fails again with a new message while the listener is gone.
    mutation.fail_with("timeout");
    let retry = tokio::spawn({
        let coordinator = session.service.coordinator().clone();
        async move { coordinator.retry_all().await }
    });
    listener.unmount();
    let report = retry.await.unwrap();

    assert_eq!(report.attempted, 1);
    assert!(session.notifier.take().is_empty());
    // The coordinator still owns the outcome.
    assert_last_error!(session.service.snapshot(), 1, "timeout");
}
