//! # Offline Data Layer
//!
//! Keeps previously fetched server data readable without connectivity and
//! keeps failed writes around until they can be replayed.
//!
//! ## Architecture
//!
//! - **Durable Store**: SQLite-backed key/value store with a 24h lifetime
//! - **Query Cache**: in-memory cache warm-started from the durable store
//! - **Mutation Tracker**: outstanding writes, last-error projection, retry
//! - **Remote Contracts**: the read/write seams toward the hosted backend
//!
//! ## Key Components
//!
//! - `store.rs`: durable store, TTL and degraded mode
//! - `query_cache.rs`: read path, persist queue, mutations
//! - `tracker.rs`: mutation records and `retry_all`
//! - `remote.rs`: `QueryFetcher` and mutation closure types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pattern_sync::offline::{CacheStore, MutationEffect, MutationTracker, QueryCache};
//! use pattern_sync::offline::remote::QueryFetcher;
//! use pattern_sync::shared::{clock, CacheKey, SyncConfig};
//! use std::sync::Arc;
//!
//! # async fn example(fetcher: Arc<dyn QueryFetcher>) -> pattern_sync::shared::SyncResult<()> {
//! let clock = clock::system_clock();
//! let store = CacheStore::open(&SyncConfig::default(), clock.clone()).await;
//! let cache = QueryCache::new(store, fetcher, MutationTracker::new(), clock);
//!
//! let key = CacheKey::new(["patterns", "list"]).param("page", 1).build();
//! let read = cache.read(&key).await?;
//! if read.is_stale {
//!     // Render the placeholder; a refetch is already running.
//! }
//!
//! cache
//!     .mutate(MutationEffect::none().invalidating(key), || async { Ok(None) })
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod query_cache;
pub mod remote;
pub mod store;
pub mod tracker;

// Re-export main types
pub use query_cache::{CachedRead, MutationEffect, MutationOutcome, QueryCache};
pub use remote::{retry_fn, MutationResult, QueryFetcher, RemoteError, RetryFn};
pub use store::{
    CacheEntry, CacheStore, DurableBackend, Freshness, MemoryBackend, SqliteBackend,
    StoreCapability, StoreStats, StoredEntry,
};
pub use tracker::{
    LastError, MutationId, MutationStatus, MutationTracker, MutationView, RetryReport,
    TrackerStats, TrackerUpdate,
};

/// Offline layer statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineStats {
    /// Keys held by the query cache
    pub memory_entries: usize,
    /// Durable store entries and capability
    pub store: StoreStats,
    /// Outstanding mutations
    pub mutations: TrackerStats,
}

impl QueryCache {
    /// Get offline layer statistics
    pub async fn stats(&self) -> OfflineStats {
        OfflineStats {
            memory_entries: self.len().await,
            store: self.store().stats().await,
            mutations: self.tracker().stats().await,
        }
    }
}
