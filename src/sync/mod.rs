//! # Sync Status Service
//!
//! Composition root of the offline-tolerant sync subsystem. Wires the
//! durable store, query cache, mutation tracker, connectivity monitor and
//! status coordinator into one explicitly constructed instance.
//!
//! ## Architecture
//!
//! - **Network Monitor**: debounced online/offline state
//! - **Sync State**: immutable snapshots and the transitions between them
//! - **Coordinator**: exactly-once publication of status changes
//! - **Listener**: maps transitions to user-visible notices
//! - **Background**: periodic purge of expired durable entries
//!
//! ## Lifecycle
//!
//! [`SyncService::open`] (or [`SyncService::with_store`] for an injected
//! store) spawns the connectivity driver and the sweeper, so it must run
//! inside a Tokio runtime. [`SyncService::shutdown`] stops both, flushes
//! queued cache writes and detaches the coordinator. Nothing here is global;
//! tests build as many services as they need.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pattern_sync::offline::remote::QueryFetcher;
//! use pattern_sync::shared::SyncConfig;
//! use pattern_sync::sync::{ListenerPolicy, SyncService, TracingNotifier};
//! use std::sync::Arc;
//!
//! # async fn example(fetcher: Arc<dyn QueryFetcher>) -> pattern_sync::shared::SyncResult<()> {
//! let service = SyncService::open(SyncConfig::default().with_env_overrides()?, fetcher).await?;
//! let listener = service.status_listener(Arc::new(TracingNotifier), ListenerPolicy::default());
//! listener.mount();
//!
//! // Feed the host's raw connectivity signal
//! service.signal_connectivity(false);
//!
//! let snapshot = service.snapshot();
//! println!("online: {}", snapshot.is_online);
//!
//! drop(listener);
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod background;
pub mod coordinator;
pub mod listener;
pub mod network_monitor;
pub mod sync_state;

pub use background::PurgeSweeper;
pub use coordinator::SyncStatusCoordinator;
pub use listener::{ListenerPolicy, Notice, Notifier, StatusListener, TracingNotifier};
pub use network_monitor::{ConnectivityMonitor, ConnectivityState};
pub use sync_state::{StatusTransition, SyncStatusSnapshot};

use std::sync::Arc;

use crate::offline::remote::QueryFetcher;
use crate::offline::store::CacheStore;
use crate::offline::tracker::{MutationTracker, RetryReport};
use crate::offline::QueryCache;
use crate::shared::clock::{self, Clock};
use crate::shared::config::{ConfigError, SyncConfig};
use crate::shared::error::SyncResult;
use crate::shared::listeners::Subscription;

/// Offline-tolerant sync subsystem for one application session
#[derive(Debug)]
pub struct SyncService {
    /// Validated configuration
    config: SyncConfig,
    /// Query cache in front of the durable store
    cache: QueryCache,
    /// Outstanding mutations
    tracker: MutationTracker,
    /// Debounced connectivity
    monitor: ConnectivityMonitor,
    /// Status read model
    coordinator: SyncStatusCoordinator,
    /// Periodic purge, absent when disabled by configuration
    sweeper: Option<PurgeSweeper>,
}

impl SyncService {
    /// Open the durable store described by `config` and start the service
    ///
    /// Fails only on invalid configuration. An unusable store degrades to
    /// memory-only caching instead.
    pub async fn open(config: SyncConfig, fetcher: Arc<dyn QueryFetcher>) -> SyncResult<Self> {
        config.validate()?;
        let clock = clock::system_clock();
        let store = CacheStore::open(&config, Arc::clone(&clock)).await;
        Self::with_store(config, store, fetcher, clock)
    }

    /// Start the service on an already opened store
    ///
    /// The store must have been built with the configured `max_age`.
    pub fn with_store(
        config: SyncConfig,
        store: CacheStore,
        fetcher: Arc<dyn QueryFetcher>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        config.validate()?;
        if store.max_age() != config.max_age() {
            return Err(ConfigError::InvalidValue {
                field: "max_age_ms",
                reason: format!(
                    "store was opened with a lifetime of {:?}, configuration asks for {:?}",
                    store.max_age(),
                    config.max_age()
                ),
            }
            .into());
        }

        let tracker = MutationTracker::with_clock(Arc::clone(&clock));
        let cache = QueryCache::new(store.clone(), fetcher, tracker.clone(), Arc::clone(&clock));
        // Assume online until the host says otherwise.
        let monitor = ConnectivityMonitor::new(true, config.debounce(), clock);
        let coordinator = SyncStatusCoordinator::new(&monitor, tracker.clone());

        let sweeper = config.sweep_interval().map(|every| {
            let mut sweeper = PurgeSweeper::new(store.clone(), every);
            sweeper.start();
            sweeper
        });

        tracing::info!(
            "[SyncService] Started (store: {:?}, max_age: {:?}, debounce: {:?})",
            store.capability(),
            config.max_age(),
            config.debounce()
        );

        Ok(Self {
            config,
            cache,
            tracker,
            monitor,
            coordinator,
            sweeper,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Query cache
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Mutation tracker
    pub fn tracker(&self) -> &MutationTracker {
        &self.tracker
    }

    /// Connectivity monitor
    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Status coordinator
    pub fn coordinator(&self) -> &SyncStatusCoordinator {
        &self.coordinator
    }

    /// Observe status snapshots
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<SyncStatusSnapshot>) + Send + Sync + 'static,
    {
        self.coordinator.subscribe(callback)
    }

    /// Current status snapshot
    pub fn snapshot(&self) -> Arc<SyncStatusSnapshot> {
        self.coordinator.get_snapshot()
    }

    /// Replay every failed mutation
    pub async fn retry_all(&self) -> RetryReport {
        self.coordinator.retry_all().await
    }

    /// Feed a raw connectivity signal from the host
    pub fn signal_connectivity(&self, online: bool) {
        self.monitor.signal(online);
    }

    /// Create an unmounted listener on this service's coordinator
    pub fn status_listener(
        &self,
        notifier: Arc<dyn Notifier>,
        policy: ListenerPolicy,
    ) -> StatusListener {
        StatusListener::new(self.coordinator.clone(), notifier, policy)
    }

    /// Stop background work and flush queued cache writes
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.as_mut() {
            sweeper.stop().await;
        }
        self.cache.flush().await;
        self.coordinator.shutdown();
        self.monitor.shutdown().await;
        tracing::info!("[SyncService] Shut down");
    }
}
