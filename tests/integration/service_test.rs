//! End-to-end session tests through `SyncService`

use pattern_sync::offline::{MutationEffect, MutationOutcome, StoreCapability};
use pattern_sync::shared::{CacheKey, SyncConfig};
use pattern_sync::sync::{ListenerPolicy, Notice, SyncService};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;

use crate::assert_last_error;
use crate::common::{ScriptedFetcher, Session, WINDOW};

#[tokio::test(start_paused = true)]
async fn test_offline_write_is_retried_on_reconnect() {
    let session = Session::in_memory();
    let _listener = session.listener(ListenerPolicy::default());
    let list = CacheKey::new(["patterns", "list"]).param("page", 1).build();

    session.service.cache().read(&list).await.unwrap();

    session.set_online(false);
    sleep(WINDOW * 2).await;

    let backend_up = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&backend_up);
    let outcome = session
        .service
        .cache()
        .mutate(MutationEffect::none().invalidating(list.clone()), move || {
            let up = flag.load(Ordering::SeqCst);
            async move {
                if up {
                    Ok(None)
                } else {
                    Err(pattern_sync::offline::RemoteError::new("network error"))
                }
            }
        })
        .await;
    let MutationOutcome::Failed { mutation_id, .. } = outcome else {
        panic!("mutation should fail while offline: {outcome:?}");
    };

    // Cached data is still served while offline.
    assert!(session.service.cache().read(&list).await.is_ok());

    backend_up.store(true, Ordering::SeqCst);
    session.set_online(true);
    sleep(WINDOW * 2).await;

    assert_eq!(
        session.notifier.take(),
        vec![
            Notice::Offline,
            Notice::SyncFailed {
                mutation_id,
                message: "network error".to_string()
            },
            Notice::BackOnline,
        ]
    );
    assert!(session.service.tracker().is_empty().await);
    assert_last_error!(session.service.snapshot(), None);
    assert!(session.service.cache().peek(&list).await.is_none());
    session.service.shutdown().await;
}

#[tokio::test]
async fn test_sqlite_session_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig::builder()
        .database_path(dir.path().join("cache.db"))
        .sweep_interval(std::time::Duration::ZERO)
        .build()
        .unwrap();
    let key = CacheKey::new(["tags"]).build();

    let first = SyncService::open(config.clone(), ScriptedFetcher::new())
        .await
        .unwrap();
    assert_eq!(
        first.cache().store().capability(),
        StoreCapability::Available
    );
    first.cache().write(&key, json!(["forms", "feedback"])).await;
    first.shutdown().await;

    let fetcher = ScriptedFetcher::new();
    fetcher.set_online(false);
    let second = SyncService::open(config, fetcher).await.unwrap();
    let read = second.cache().read(&key).await.unwrap();
    assert!(read.is_stale);
    assert_eq!(read.value, json!(["forms", "feedback"]));
    second.shutdown().await;
}

#[tokio::test]
async fn test_degraded_store_never_surfaces() {
    let key = CacheKey::new(["patterns", "list"]).param("page", 2).build();
    let config = SyncConfig::builder().persist(false).build().unwrap();
    let service = SyncService::open(config, ScriptedFetcher::new())
        .await
        .unwrap();
    service.cache().write(&key, json!([])).await;
    service.cache().flush().await;

    assert!(service.cache().store().capability().is_degraded());
    assert!(!service.cache().read(&key).await.unwrap().is_stale);
    assert_last_error!(service.snapshot(), None);
    service.shutdown().await;
}
