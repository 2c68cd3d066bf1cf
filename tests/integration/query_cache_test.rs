//! Query cache tests against memory and SQLite stores

use chrono::Utc;
use pattern_sync::offline::{
    CacheStore, MutationEffect, MutationOutcome, MutationTracker, QueryCache,
};
use pattern_sync::shared::{CacheKey, ManualClock};
use serde_json::json;
use std::sync::Arc;

use crate::common::{memory_store, sqlite_store, ScriptedFetcher, ScriptedMutation};

fn page(n: u32) -> CacheKey {
    CacheKey::new(["patterns", "list"]).param("page", n).build()
}

fn cache_on(store: CacheStore, fetcher: Arc<ScriptedFetcher>, clock: &ManualClock) -> QueryCache {
    QueryCache::new(
        store,
        fetcher,
        MutationTracker::with_clock(Arc::new(clock.clone())),
        Arc::new(clock.clone()),
    )
}

#[tokio::test]
async fn test_key_scheme_matches_persisted_key() {
    assert_eq!(page(1).as_str(), "patterns:list:page=1");
}

#[tokio::test]
async fn test_entry_read_at_25_hours_is_stale() {
    let clock = ManualClock::new(Utc::now());
    let store = memory_store(&clock);
    store.set(&page(1), json!(["modal", "toast"])).await;

    clock.advance(chrono::Duration::hours(25));
    let fetcher = ScriptedFetcher::new();
    fetcher.set_online(false);
    let cache = cache_on(store.clone(), fetcher.clone(), &clock);

    let read = cache.read(&page(1)).await.unwrap();
    assert!(read.is_stale);
    assert_eq!(read.value, json!(["modal", "toast"]));
    // The durable contract still reports it absent.
    assert!(store.get(&page(1)).await.is_none());

    cache.flush().await;
    assert_eq!(fetcher.calls(), 1);
    assert!(cache.read(&page(1)).await.unwrap().is_stale);
}

#[tokio::test]
async fn test_warm_start_from_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let clock = ManualClock::new(Utc::now());

    {
        let cache = cache_on(sqlite_store(&path, &clock).await, ScriptedFetcher::new(), &clock);
        cache.write(&page(1), json!(["from first session"])).await;
        cache.flush().await;
    }

    let fetcher = ScriptedFetcher::new();
    fetcher.set_value(&page(1), json!(["from server"]));
    let cache = cache_on(sqlite_store(&path, &clock).await, fetcher.clone(), &clock);

    let read = cache.read(&page(1)).await.unwrap();
    assert!(read.is_stale);
    assert_eq!(read.value, json!(["from first session"]));

    cache.flush().await;
    let read = cache.read(&page(1)).await.unwrap();
    assert!(!read.is_stale);
    assert_eq!(read.value, json!(["from server"]));
}

#[tokio::test]
async fn test_concurrent_stale_reads_revalidate_once() {
    let clock = ManualClock::new(Utc::now());
    let store = memory_store(&clock);
    store.set(&page(3), json!("cached")).await;
    let fetcher = ScriptedFetcher::new();
    let cache = cache_on(store, fetcher.clone(), &clock);

    let key = page(3);
    let reads = futures_util::future::join_all((0..8).map(|_| cache.read(&key))).await;
    assert!(reads.iter().all(|r| r.as_ref().unwrap().is_stale));

    cache.flush().await;
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_failed_mutation_retried_applies_effect() {
    let clock = ManualClock::new(Utc::now());
    let cache = cache_on(memory_store(&clock), ScriptedFetcher::new(), &clock);
    cache.write(&page(1), json!(["old list"])).await;

    let mutation = ScriptedMutation::failing("network error");
    let detail = CacheKey::new(["patterns", "detail"]).param("slug", "modal").build();
    let attempt = mutation.clone();
    let outcome = cache
        .mutate(
            MutationEffect::write_to(detail.clone()).invalidating(page(1)),
            move || {
                let result = attempt.attempt();
                async move { result }
            },
        )
        .await;
    assert!(matches!(outcome, MutationOutcome::Failed { .. }));
    assert!(cache.peek(&page(1)).await.is_some());

    mutation.succeed();
    let report = cache.tracker().retry_all().await;
    assert_eq!(report.succeeded, vec![outcome.mutation_id()]);
    assert!(cache.peek(&page(1)).await.is_none());
    assert_eq!(
        cache.peek(&detail).await.unwrap().value,
        json!({ "saved": true })
    );
}
