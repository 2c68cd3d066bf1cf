//! # Query Cache
//!
//! In-memory mapping from canonical cache key to the last known server value,
//! warm-started from the durable store.
//!
//! ## Read path
//!
//! 1. **Memory hit**: returned immediately. Stale if it was seeded from disk
//!    and not yet revalidated, or if it is older than `max_age`.
//! 2. **Durable hit**: seeds memory, returned as stale, and a background
//!    revalidation is scheduled. This includes entries past `max_age`: they
//!    are shown as a placeholder but never reported fresh.
//! 3. **Miss**: fetched synchronously from the backend.
//!
//! ## Write path
//!
//! Memory is updated first and is the source of truth for the session.
//! Persistence goes through a single writer task in submission order, so the
//! last write for a key wins on disk too. [`QueryCache::flush`] waits for that
//! queue and for in-flight revalidations.
//!
//! Every write and invalidation bumps the key's generation. A fetch that
//! started under an older generation is discarded, so a refetch racing an
//! invalidation cannot bring back pre-mutation data as fresh.
//!
//! ## Mutations
//!
//! [`QueryCache::mutate`] runs a write against the backend, tracks it on the
//! [`MutationTracker`], and applies its [`MutationEffect`] on success. Replays
//! started by `retry_all` apply the same effect.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::offline::remote::{retry_fn, MutationResult, QueryFetcher, RetryFn};
use crate::offline::store::CacheStore;
use crate::offline::tracker::{MutationId, MutationTracker};
use crate::shared::cache_key::CacheKey;
use crate::shared::clock::Clock;
use crate::shared::error::SyncResult;

/// Value returned by [`QueryCache::read`]
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRead {
    /// Cached or freshly fetched value
    pub value: Value,
    /// Whether the value awaits revalidation
    pub is_stale: bool,
}

/// Cache changes applied when a mutation succeeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationEffect {
    /// Key receiving the value the mutation returned
    pub write_to: Option<CacheKey>,
    /// Keys dropped so the next read refetches them
    pub invalidate: Vec<CacheKey>,
}

impl MutationEffect {
    /// Effect that touches no cache entry
    pub fn none() -> Self {
        Self::default()
    }

    /// Store the mutation's returned value under `key`
    pub fn write_to(key: CacheKey) -> Self {
        Self {
            write_to: Some(key),
            invalidate: Vec::new(),
        }
    }

    /// Also invalidate `key` on success
    pub fn invalidating(mut self, key: CacheKey) -> Self {
        self.invalidate.push(key);
        self
    }
}

/// Result of the first attempt of [`QueryCache::mutate`]
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The backend accepted the write
    Applied {
        /// Tracker id of the mutation
        mutation_id: MutationId,
        /// Value the backend returned
        value: Option<Value>,
    },
    /// The write failed and is now tracked for retry
    Failed {
        /// Tracker id of the mutation
        mutation_id: MutationId,
        /// Failure message
        message: String,
    },
}

impl MutationOutcome {
    /// Tracker id of the mutation
    pub fn mutation_id(&self) -> MutationId {
        match self {
            Self::Applied { mutation_id, .. } | Self::Failed { mutation_id, .. } => *mutation_id,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    fetched_at: DateTime<Utc>,
    stale: bool,
}

/// Memory entries plus a per-key generation bumped by every write and
/// invalidation
///
/// A fetch records the generation it started under and is dropped if the key
/// moved on before it returned.
#[derive(Default)]
struct MemoryState {
    entries: HashMap<CacheKey, MemoryEntry>,
    generations: HashMap<CacheKey, u64>,
}

impl MemoryState {
    fn generation(&self, key: &CacheKey) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &CacheKey) {
        *self.generations.entry(key.clone()).or_insert(0) += 1;
    }
}

enum PersistOp {
    Put(CacheKey, Value),
    Remove(CacheKey),
    Flush(oneshot::Sender<()>),
}

/// In-memory query cache
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    memory: RwLock<MemoryState>,
    store: CacheStore,
    fetcher: Arc<dyn QueryFetcher>,
    tracker: MutationTracker,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    persist_tx: mpsc::UnboundedSender<PersistOp>,
    revalidating: Mutex<HashSet<CacheKey>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("store", &self.inner.store.capability())
            .field("max_age", &self.inner.max_age)
            .finish()
    }
}

impl QueryCache {
    /// Create a cache in front of `store`
    ///
    /// Spawns the persist writer task, so this must run inside a Tokio runtime.
    pub fn new(
        store: CacheStore,
        fetcher: Arc<dyn QueryFetcher>,
        tracker: MutationTracker,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_writer(store.clone(), persist_rx));

        Self {
            inner: Arc::new(CacheInner {
                memory: RwLock::new(MemoryState::default()),
                max_age: store.max_age(),
                store,
                fetcher,
                tracker,
                clock,
                persist_tx,
                revalidating: Mutex::new(HashSet::new()),
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Tracker receiving this cache's mutations
    pub fn tracker(&self) -> &MutationTracker {
        &self.inner.tracker
    }

    /// Durable store behind this cache
    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    /// Read `key`, fetching it on a full miss
    ///
    /// Fails only when nothing is cached and the backend fetch fails.
    pub async fn read(&self, key: &CacheKey) -> SyncResult<CachedRead> {
        let (cached, generation) = {
            let memory = self.inner.memory.read().await;
            let cached = memory.entries.get(key).map(|entry| self.to_read(entry));
            (cached, memory.generation(key))
        };
        if let Some(read) = cached {
            if read.is_stale {
                self.schedule_revalidation(key, generation);
            }
            return Ok(read);
        }

        if let Some(stored) = self.inner.store.lookup(key).await {
            let seeded = MemoryEntry {
                value: stored.entry.value,
                fetched_at: stored.entry.stored_at,
                stale: true,
            };
            let (read, current) = {
                let mut memory = self.inner.memory.write().await;
                let current = memory.generation(key);
                // A write or invalidation that landed while the store was read wins.
                let read = if current == generation {
                    let entry = memory.entries.entry(key.clone()).or_insert(seeded);
                    self.to_read(entry)
                } else if let Some(entry) = memory.entries.get(key) {
                    self.to_read(entry)
                } else {
                    self.to_read(&seeded)
                };
                (read, current)
            };
            if read.is_stale {
                tracing::debug!("[QueryCache] Warm start for {}, revalidating", key);
                self.schedule_revalidation(key, current);
            }
            return Ok(read);
        }

        let value = self.inner.fetcher.fetch(key).await?;
        self.commit_fetch(key, value.clone(), generation).await;
        Ok(CachedRead {
            value,
            is_stale: false,
        })
    }

    /// Memory-only lookup; never fetches or schedules work
    pub async fn peek(&self, key: &CacheKey) -> Option<CachedRead> {
        let memory = self.inner.memory.read().await;
        memory.entries.get(key).map(|entry| self.to_read(entry))
    }

    /// Store a fresh value
    ///
    /// Memory is updated before returning; the durable copy follows on the
    /// persist queue.
    pub async fn write(&self, key: &CacheKey, value: Value) {
        let mut memory = self.inner.memory.write().await;
        self.put(&mut memory, key, value);
    }

    /// Drop `key` from memory and queue its durable eviction
    ///
    /// A fetch of `key` already in flight is discarded when it returns.
    pub async fn invalidate(&self, key: &CacheKey) {
        let mut memory = self.inner.memory.write().await;
        memory.bump(key);
        memory.entries.remove(key);
        self.persist(PersistOp::Remove(key.clone()));
    }

    /// Number of keys held in memory
    pub async fn len(&self) -> usize {
        self.inner.memory.read().await.entries.len()
    }

    /// Whether memory holds no key
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run a backend write and track it for retry
    ///
    /// On success the returned value and `effect` are applied to the cache.
    /// On failure the mutation stays on the tracker; a later `retry_all`
    /// replays `op` and applies `effect` if the replay succeeds.
    pub async fn mutate<F, Fut>(&self, effect: MutationEffect, op: F) -> MutationOutcome
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MutationResult> + Send + 'static,
    {
        let tracker = &self.inner.tracker;
        let mutation_id = tracker.next_id();
        let attempt = self.attempt_fn(effect, op);
        tracker.track(mutation_id, Arc::clone(&attempt)).await;

        match attempt().await {
            Ok(value) => {
                tracker.succeed(mutation_id).await;
                MutationOutcome::Applied { mutation_id, value }
            }
            Err(error) => {
                tracker.fail(mutation_id, error.message.clone()).await;
                MutationOutcome::Failed {
                    mutation_id,
                    message: error.message,
                }
            }
        }
    }

    /// Wait for queued persistence and in-flight revalidations
    pub async fn flush(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut background = self
                    .inner
                    .background
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                background.drain(..).collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!("[QueryCache] Revalidation task failed: {}", e);
                }
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.persist(PersistOp::Flush(done_tx));
        // The writer only goes away with the last sender, which we hold.
        let _ = done_rx.await;
    }

    // Retries hold the cache weakly so tracked mutations do not keep it alive.
    fn attempt_fn<F, Fut>(&self, effect: MutationEffect, op: F) -> RetryFn
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MutationResult> + Send + 'static,
    {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let effect = Arc::new(effect);
        retry_fn(move || {
            let pending = op();
            let weak = weak.clone();
            let effect = Arc::clone(&effect);
            async move {
                let value = match pending.await {
                    Ok(value) => value,
                    Err(error) => return Err(error),
                };
                if let Some(inner) = weak.upgrade() {
                    QueryCache { inner }.apply_effect(&effect, value.as_ref()).await;
                }
                Ok(value)
            }
        })
    }

    async fn apply_effect(&self, effect: &MutationEffect, value: Option<&Value>) {
        if let (Some(key), Some(value)) = (&effect.write_to, value) {
            self.write(key, value.clone()).await;
        }
        for key in &effect.invalidate {
            self.invalidate(key).await;
        }
    }

    // Persist ops are queued under the memory lock so the durable order
    // matches the memory order.
    fn put(&self, memory: &mut MemoryState, key: &CacheKey, value: Value) {
        memory.bump(key);
        memory.entries.insert(
            key.clone(),
            MemoryEntry {
                value: value.clone(),
                fetched_at: self.inner.clock.now(),
                stale: false,
            },
        );
        self.persist(PersistOp::Put(key.clone(), value));
    }

    /// Store a fetched value unless `key` was written or invalidated since
    /// `generation` was read
    async fn commit_fetch(&self, key: &CacheKey, value: Value, generation: u64) -> bool {
        let mut memory = self.inner.memory.write().await;
        if memory.generation(key) != generation {
            tracing::debug!("[QueryCache] Dropping superseded fetch of {}", key);
            return false;
        }
        self.put(&mut memory, key, value);
        true
    }

    fn to_read(&self, entry: &MemoryEntry) -> CachedRead {
        let expired = match (self.inner.clock.now() - entry.fetched_at).to_std() {
            Ok(age) => age > self.inner.max_age,
            Err(_) => false,
        };
        CachedRead {
            value: entry.value.clone(),
            is_stale: entry.stale || expired,
        }
    }

    /// Refetch `key` in the background
    ///
    /// The result is kept only if `key` is still at `generation`.
    fn schedule_revalidation(&self, key: &CacheKey, generation: u64) {
        {
            let mut revalidating = self
                .inner
                .revalidating
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !revalidating.insert(key.clone()) {
                return;
            }
        }

        let cache = self.clone();
        let key = key.clone();
        let handle = tokio::spawn(async move {
            match cache.inner.fetcher.fetch(&key).await {
                Ok(value) => {
                    cache.commit_fetch(&key, value, generation).await;
                }
                Err(e) => tracing::debug!("[QueryCache] Revalidation of {} failed: {}", key, e),
            }
            cache
                .inner
                .revalidating
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        });

        let mut background = self
            .inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        background.retain(|handle| !handle.is_finished());
        background.push(handle);
    }

    fn persist(&self, op: PersistOp) {
        if self.inner.persist_tx.send(op).is_err() {
            tracing::debug!("[QueryCache] Persist writer stopped, keeping value in memory only");
        }
    }
}

async fn persist_writer(store: CacheStore, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::Put(key, value) => store.set(&key, value).await,
            PersistOp::Remove(key) => store.remove(&key).await,
            PersistOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
