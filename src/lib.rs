//! Pattern Sync - Main Library
//!
//! Offline-tolerant synchronization for the design-pattern catalogue client:
//! a durable local cache of server data, debounced connectivity detection,
//! tracking and replay of failed writes, and a race-free status contract for
//! the UI layer (toasts, badges).
//!
//! # Module Structure
//!
//! - **`shared`** - Types used everywhere
//!   - Crate error, configuration, canonical cache keys
//!   - Injectable clock, listener registry
//!
//! - **`local_db`** - SQLite persistence through `sqlx`
//!   - Schema versioning and migrations
//!   - `cache_entries` table operations
//!
//! - **`offline`** - Offline data layer
//!   - Durable cache store with TTL and degraded mode
//!   - Query cache with warm start and background revalidation
//!   - Mutation tracker with `retry_all`
//!
//! - **`sync`** - Status model
//!   - Connectivity monitor, status coordinator, status listener
//!   - Periodic purge sweeper and the `SyncService` composition root
//!
//! # Feature Flags
//!
//! - **`demo`** - builds the `sync-demo` binary and pulls in
//!   `tracing-subscriber`; the library itself never installs a subscriber
//!
//! # Usage
//!
//! ```rust,no_run
//! use pattern_sync::offline::remote::QueryFetcher;
//! use pattern_sync::shared::{CacheKey, SyncConfig};
//! use pattern_sync::sync::SyncService;
//! use std::sync::Arc;
//!
//! # async fn example(fetcher: Arc<dyn QueryFetcher>) -> pattern_sync::shared::SyncResult<()> {
//! let service = SyncService::open(SyncConfig::default(), fetcher).await?;
//!
//! let key = CacheKey::new(["patterns", "list"]).param("page", 1).build();
//! let read = service.cache().read(&key).await?;
//! println!("{} (stale: {})", read.value, read.is_stale);
//!
//! let _subscription = service.subscribe(|snapshot| {
//!     println!("online: {}, last error: {:?}", snapshot.is_online, snapshot.last_error_message);
//! });
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! Every component is `Send + Sync` and cheap to clone (`Arc` inside).
//! Background work (connectivity debounce, persist queue, revalidation, purge
//! sweep) runs on Tokio tasks; constructors that spawn must be called inside a
//! runtime.
//!
//! # Error Handling
//!
//! - `SyncResult<T>` for construction and for cache misses whose fetch fails
//! - Durable-store failures are absorbed and logged; the store degrades
//! - Mutation failures live on the tracker and surface through snapshots

/// Shared types and data structures
pub mod shared;

/// SQLite persistence
pub mod local_db;

/// Offline data layer
pub mod offline;

/// Connectivity and status coordination
pub mod sync;
