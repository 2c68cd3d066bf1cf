/**
 * Pattern Sync Demo Entry Point
 *
 * Walks one session through a connectivity loss: a cached read, a write
 * that fails while offline, and the retry once the host is back online.
 * Notices are written to the log.
 */

#[cfg(feature = "demo")]
mod scripted {
    use async_trait::async_trait;
    use pattern_sync::offline::remote::{QueryFetcher, RemoteError};
    use pattern_sync::shared::CacheKey;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Backend stand-in whose reachability is toggled by the demo
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedBackend {
        offline: Arc<AtomicBool>,
    }

    impl ScriptedBackend {
        pub fn set_online(&self, online: bool) {
            self.offline.store(!online, Ordering::SeqCst);
        }

        pub fn reachable(&self) -> Result<(), RemoteError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(RemoteError::new("network error"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl QueryFetcher for ScriptedBackend {
        async fn fetch(&self, key: &CacheKey) -> Result<Value, RemoteError> {
            self.reachable()?;
            Ok(json!({
                "key": key.as_str(),
                "items": ["Modal", "Toast", "Skeleton loader"],
            }))
        }
    }
}

#[cfg(feature = "demo")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use pattern_sync::offline::{MutationEffect, MutationOutcome};
    use pattern_sync::shared::{CacheKey, SyncConfig};
    use pattern_sync::sync::{ListenerPolicy, SyncService, TracingNotifier};
    use serde_json::json;
    use std::sync::Arc;

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    }
    .with_env_overrides()?;

    let backend = scripted::ScriptedBackend::default();
    let service = SyncService::open(config, Arc::new(backend.clone())).await?;
    let listener = service.status_listener(Arc::new(TracingNotifier), ListenerPolicy::default());
    listener.mount();

    let list = CacheKey::new(["patterns", "list"]).param("page", 1).build();
    let read = service.cache().read(&list).await?;
    tracing::info!("[Demo] Read {} (stale: {})", list, read.is_stale);

    let settle = service.config().debounce() * 2;

    backend.set_online(false);
    service.signal_connectivity(false);
    tokio::time::sleep(settle).await;

    let created = CacheKey::new(["patterns", "detail"]).param("slug", "toast").build();
    let write_backend = backend.clone();
    let outcome = service
        .cache()
        .mutate(
            MutationEffect::write_to(created).invalidating(list.clone()),
            move || {
                let reachable = write_backend.reachable();
                async move { reachable.map(|()| Some(json!({ "slug": "toast", "title": "Toast" }))) }
            },
        )
        .await;
    if let MutationOutcome::Failed { mutation_id, .. } = &outcome {
        tracing::info!("[Demo] Mutation {} queued for retry", mutation_id);
    }

    // Cached data stays readable while offline.
    let read = service.cache().read(&list).await?;
    tracing::info!("[Demo] Offline read of {} (stale: {})", list, read.is_stale);

    backend.set_online(true);
    service.signal_connectivity(true);
    tokio::time::sleep(settle).await;

    // The listener started the retry; make sure it settled.
    service.retry_all().await;
    let stats = service.cache().stats().await;
    tracing::info!(
        "[Demo] Cache: {} in memory, {} on disk ({:?}); mutations: {:?}",
        stats.memory_entries,
        stats.store.entries,
        stats.store.capability,
        stats.mutations
    );
    tracing::info!("[Demo] Final status: {:?}", service.snapshot());

    drop(listener);
    service.shutdown().await;
    Ok(())
}

#[cfg(not(feature = "demo"))]
fn main() {
    eprintln!("The demo requires the 'demo' feature to be enabled.");
    eprintln!("Run with: cargo run --bin sync-demo --features demo");
    std::process::exit(1);
}
