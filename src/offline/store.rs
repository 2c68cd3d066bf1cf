//! # Durable Cache Store
//!
//! Key/value persistence with a time-to-live, backing the in-memory query
//! cache across restarts.
//!
//! ## Features
//!
//! - **TTL**: entries older than `max_age` are reported absent by [`CacheStore::get`]
//!   and reclaimed lazily, on that read or by a periodic sweep
//! - **Capability check**: a store is either `Available` or `Degraded`; a
//!   degraded store turns every operation into a no-op
//! - **Pluggable backends**: SQLite for real sessions, memory for tests and
//!   sessions configured without persistence
//!
//! Storage failures never reach the caller. The first failure is logged for
//! operators and the store degrades for the rest of the session, leaving the
//! query cache as the only cache.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pattern_sync::offline::store::CacheStore;
//! use pattern_sync::shared::{clock, CacheKey, SyncConfig};
//!
//! # async fn example() {
//! let store = CacheStore::open(&SyncConfig::default(), clock::system_clock()).await;
//! let key = CacheKey::new(["patterns", "list"]).param("page", 1).build();
//! store.set(&key, serde_json::json!(["modal", "toast"])).await;
//! assert!(store.get(&key).await.is_some() || store.capability().is_degraded());
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::local_db::LocalDatabase;
use crate::shared::cache_key::CacheKey;
use crate::shared::clock::Clock;
use crate::shared::config::SyncConfig;
use crate::shared::error::{SyncError, SyncResult};

/// One persisted cache value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Canonical cache key
    pub key: CacheKey,
    /// Opaque serialized payload
    pub value: Value,
    /// When the value was stored
    pub stored_at: DateTime<Utc>,
}

/// Freshness of a raw lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than `max_age`
    Fresh,
    /// Past `max_age`; must be revalidated before being trusted
    Expired,
}

/// Entry returned by [`CacheStore::lookup`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    /// The stored entry
    pub entry: CacheEntry,
    /// Whether it is still within `max_age`
    pub freshness: Freshness,
}

/// Result of the store capability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCapability {
    /// Durable storage is in use
    Available,
    /// Durable storage is unusable; caching is memory-only
    Degraded {
        /// Why the store degraded
        reason: String,
    },
}

impl StoreCapability {
    /// Whether the store fell back to memory-only caching
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Physically stored entries, expired ones included
    pub entries: u64,
    /// Current capability
    pub capability: StoreCapability,
}

/// Storage medium behind a [`CacheStore`]
#[async_trait]
pub trait DurableBackend: Send + Sync + std::fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Load an entry regardless of age
    async fn load(&self, key: &str) -> SyncResult<Option<CacheEntry>>;

    /// Insert or replace an entry
    async fn save(&self, entry: &CacheEntry) -> SyncResult<()>;

    /// Delete an entry
    async fn delete(&self, key: &str) -> SyncResult<()>;

    /// Delete an entry only if it was stored at `stored_at`
    ///
    /// Returns whether a row was removed. A row rewritten since it was loaded
    /// is left alone.
    async fn delete_stored_at(&self, key: &str, stored_at: DateTime<Utc>) -> SyncResult<bool>;

    /// Delete entries stored before `cutoff`, returning how many were removed
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> SyncResult<u64>;

    /// Number of stored entries
    async fn count(&self) -> SyncResult<u64>;
}

/// SQLite backend
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db: LocalDatabase,
}

impl SqliteBackend {
    /// Wrap an opened database
    pub fn new(db: LocalDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DurableBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load(&self, key: &str) -> SyncResult<Option<CacheEntry>> {
        Ok(self.db.get_cache_entry(key).await?)
    }

    async fn save(&self, entry: &CacheEntry) -> SyncResult<()> {
        Ok(self.db.upsert_cache_entry(entry).await?)
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.db.delete_cache_entry(key).await?;
        Ok(())
    }

    async fn delete_stored_at(&self, key: &str, stored_at: DateTime<Utc>) -> SyncResult<bool> {
        Ok(self.db.delete_cache_entry_stored_at(key, stored_at).await?)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> SyncResult<u64> {
        Ok(self.db.delete_cache_entries_before(cutoff).await?)
    }

    async fn count(&self) -> SyncResult<u64> {
        Ok(self.db.count_cache_entries().await?)
    }
}

/// In-memory backend
///
/// Can be switched unavailable to simulate a storage medium that stops
/// accepting writes (quota exceeded, storage disabled by the host).
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> SyncResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::store_unavailable("storage quota exceeded"));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, key: &str) -> SyncResult<Option<CacheEntry>> {
        self.check()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, entry: &CacheEntry) -> SyncResult<()> {
        self.check()?;
        self.entries
            .write()
            .await
            .insert(entry.key.as_str().to_string(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.check()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_stored_at(&self, key: &str, stored_at: DateTime<Utc>) -> SyncResult<bool> {
        self.check()?;
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.stored_at == stored_at) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> SyncResult<u64> {
        self.check()?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }

    async fn count(&self) -> SyncResult<u64> {
        self.check()?;
        Ok(self.entries.read().await.len() as u64)
    }
}

/// Durable cache store with TTL and degraded mode
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    backend: Option<Arc<dyn DurableBackend>>,
    max_age: Duration,
    clock: Arc<dyn Clock>,
    degraded: StdRwLock<Option<String>>,
}

impl CacheStore {
    /// Create a store on top of a backend
    pub fn new(backend: Arc<dyn DurableBackend>, max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend: Some(backend),
                max_age,
                clock,
                degraded: StdRwLock::new(None),
            }),
        }
    }

    /// Create a store that is degraded from the start
    pub fn degraded(reason: impl Into<String>, max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend: None,
                max_age,
                clock,
                degraded: StdRwLock::new(Some(reason.into())),
            }),
        }
    }

    /// Open the store described by `config`
    ///
    /// Never fails: if the SQLite file cannot be opened the store comes back
    /// degraded and the session caches in memory only.
    pub async fn open(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        if !config.persist {
            tracing::info!("[CacheStore] Persistence disabled, caching in memory only");
            return Self::degraded("persistence disabled by configuration", config.max_age(), clock);
        }

        let path = config.resolved_database_path();
        match LocalDatabase::open(&path).await {
            Ok(db) => {
                tracing::debug!("[CacheStore] Using SQLite cache at {}", path.display());
                Self::new(Arc::new(SqliteBackend::new(db)), config.max_age(), clock)
            }
            Err(e) => {
                tracing::warn!(
                    "[CacheStore] Cannot open {}: {}; caching in memory only",
                    path.display(),
                    e
                );
                Self::degraded(e.to_string(), config.max_age(), clock)
            }
        }
    }

    /// Current capability
    pub fn capability(&self) -> StoreCapability {
        match &*self.inner.degraded.read().unwrap_or_else(PoisonError::into_inner) {
            Some(reason) => StoreCapability::Degraded {
                reason: reason.clone(),
            },
            None => StoreCapability::Available,
        }
    }

    /// Configured entry lifetime
    pub fn max_age(&self) -> Duration {
        self.inner.max_age
    }

    /// Fresh entry for `key`
    ///
    /// Expired entries are reported absent and deleted on the way out,
    /// unless a `set` replaced them in the meantime.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let stored = self.lookup(key).await?;
        match stored.freshness {
            Freshness::Fresh => Some(stored.entry),
            Freshness::Expired => {
                self.reclaim(&stored.entry).await;
                None
            }
        }
    }

    async fn reclaim(&self, expired: &CacheEntry) {
        let Some(backend) = self.backend() else {
            return;
        };
        match backend
            .delete_stored_at(expired.key.as_str(), expired.stored_at)
            .await
        {
            Ok(true) => tracing::debug!("[CacheStore] Reclaimed expired {}", expired.key),
            Ok(false) => {}
            Err(e) => self.degrade("delete", e),
        }
    }

    /// Entry for `key` tagged with its freshness
    pub async fn lookup(&self, key: &CacheKey) -> Option<StoredEntry> {
        let backend = self.backend()?;
        let entry = match backend.load(key.as_str()).await {
            Ok(entry) => entry?,
            Err(e) => {
                self.degrade("load", e);
                return None;
            }
        };
        let freshness = if self.is_expired(entry.stored_at, self.inner.max_age) {
            Freshness::Expired
        } else {
            Freshness::Fresh
        };
        Some(StoredEntry { entry, freshness })
    }

    /// Store `value` under `key`, stamped with the current time
    ///
    /// Returns once the write is durable, so a following `get` sees it.
    pub async fn set(&self, key: &CacheKey, value: Value) {
        let Some(backend) = self.backend() else {
            return;
        };
        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: self.inner.clock.now(),
        };
        if let Err(e) = backend.save(&entry).await {
            self.degrade("save", e);
        }
    }

    /// Delete the entry for `key`
    pub async fn remove(&self, key: &CacheKey) {
        let Some(backend) = self.backend() else {
            return;
        };
        if let Err(e) = backend.delete(key.as_str()).await {
            self.degrade("delete", e);
        }
    }

    /// Reclaim entries older than `max_age`, returning how many were removed
    pub async fn purge_expired(&self, max_age: Duration) -> u64 {
        let Some(backend) = self.backend() else {
            return 0;
        };
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = self
            .inner
            .clock
            .now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        match backend.delete_before(cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!("[CacheStore] Purged {} expired entries", removed);
                }
                removed
            }
            Err(e) => {
                self.degrade("purge", e);
                0
            }
        }
    }

    /// Entry count and capability
    pub async fn stats(&self) -> StoreStats {
        let entries = match self.backend() {
            Some(backend) => match backend.count().await {
                Ok(count) => count,
                Err(e) => {
                    self.degrade("count", e);
                    0
                }
            },
            None => 0,
        };
        StoreStats {
            entries,
            capability: self.capability(),
        }
    }

    fn backend(&self) -> Option<&Arc<dyn DurableBackend>> {
        if self.capability().is_degraded() {
            return None;
        }
        self.inner.backend.as_ref()
    }

    fn is_expired(&self, stored_at: DateTime<Utc>, max_age: Duration) -> bool {
        // Timestamps in the future (clock skew) count as fresh.
        match (self.inner.clock.now() - stored_at).to_std() {
            Ok(age) => age > max_age,
            Err(_) => false,
        }
    }

    fn degrade(&self, operation: &str, error: SyncError) {
        let mut degraded = self
            .inner
            .degraded
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if degraded.is_none() {
            let backend = self.inner.backend.as_ref().map_or("none", |b| b.name());
            tracing::warn!(
                "[CacheStore] {} backend failed during {}: {}; caching in memory only",
                backend,
                operation,
                error
            );
            *degraded = Some(error.to_string());
        }
    }
}
