//! # Mutation Tracker
//!
//! Records outstanding write operations and drives their retry.
//!
//! ## Features
//!
//! - **One record per mutation**: `fail` on a known id updates its message in place
//! - **Last error projection**: the record that failed most recently, whatever
//!   order the ids were allocated in
//! - **Retry fan-out**: [`MutationTracker::retry_all`] replays every failed
//!   mutation concurrently and settles them as one batch
//! - **Change feed**: observers receive a [`TrackerUpdate`] after each change,
//!   delivered in revision order
//!
//! Status moves `Pending -> (Error -> Pending)* -> evicted`. Records are only
//! mutated through this API; success and dismissal evict them.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pattern_sync::offline::remote::retry_fn;
//! use pattern_sync::offline::tracker::MutationTracker;
//!
//! # async fn example() {
//! let tracker = MutationTracker::new();
//! let id = tracker.next_id();
//! tracker.track(id, retry_fn(|| async { Ok(None) })).await;
//! tracker.fail(id, "network error").await;
//!
//! let report = tracker.retry_all().await;
//! assert_eq!(report.succeeded, vec![id]);
//! # }
//! ```

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::offline::remote::RetryFn;
use crate::shared::clock::{self, Clock};
use crate::shared::listeners::{Listeners, Subscription};

/// Monotonic mutation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution status of a tracked mutation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MutationStatus {
    /// Submitted or being retried
    Pending,
    /// Last attempt failed
    Error,
}

/// Tracked mutation
struct MutationRecord {
    status: MutationStatus,
    error_message: Option<String>,
    retries: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    retry_fn: Option<RetryFn>,
    /// Failure order of the latest failure, 0 if never failed
    failed_seq: u64,
    /// Failure order of the first failure, 0 if never failed
    first_failed_seq: u64,
}

impl MutationRecord {
    fn new(now: DateTime<Utc>, retry_fn: Option<RetryFn>) -> Self {
        Self {
            status: MutationStatus::Pending,
            error_message: None,
            retries: 0,
            created_at: now,
            updated_at: now,
            retry_fn,
            failed_seq: 0,
            first_failed_seq: 0,
        }
    }
}

/// Read-only view of a tracked mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationView {
    /// Mutation id
    pub id: MutationId,
    /// Current status
    pub status: MutationStatus,
    /// Message of the last failure
    pub error_message: Option<String>,
    /// Number of replays started through `retry_all`
    pub retries: u32,
    /// When the mutation was first seen
    pub created_at: DateTime<Utc>,
    /// When the record last changed
    pub updated_at: DateTime<Utc>,
    /// Whether `retry_all` can replay it
    pub retryable: bool,
}

/// Most recent failure exposed to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    /// Failing mutation
    pub mutation_id: MutationId,
    /// Its latest failure message
    pub message: String,
    /// Tracker-wide order of this mutation's first failure
    ///
    /// Strictly increasing across mutations, unchanged when the same
    /// mutation fails again. Observers use it to tell a new failure from a
    /// repeated one.
    pub first_failure_seq: u64,
}

/// Change notification sent to tracker observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerUpdate {
    /// Strictly increasing per change; observers drop out-of-order updates
    pub revision: u64,
    /// Current last-error projection
    pub last_error: Option<LastError>,
    /// Number of tracked records
    pub outstanding: usize,
}

/// Aggregate result of [`MutationTracker::retry_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Mutations replayed
    pub attempted: usize,
    /// Mutations that succeeded and were evicted
    pub succeeded: Vec<MutationId>,
    /// Mutations that failed again and stay tracked
    pub failed: Vec<MutationId>,
}

/// Tracker statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Records awaiting an outcome
    pub pending: usize,
    /// Records whose last attempt failed
    pub failed: usize,
}

#[derive(Default)]
struct TrackerState {
    records: BTreeMap<MutationId, MutationRecord>,
    revision: u64,
    failure_seq: u64,
}

impl TrackerState {
    fn last_error(&self) -> Option<LastError> {
        self.records
            .iter()
            .filter(|(_, record)| record.failed_seq > 0)
            .max_by_key(|(_, record)| record.failed_seq)
            .and_then(|(id, record)| {
                record.error_message.as_ref().map(|message| LastError {
                    mutation_id: *id,
                    message: message.clone(),
                    first_failure_seq: record.first_failed_seq,
                })
            })
    }

    /// Mark `id` failed with `message` as the latest failure
    fn record_failure(&mut self, id: MutationId, message: String, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        self.failure_seq += 1;
        record.status = MutationStatus::Error;
        record.error_message = Some(message);
        record.updated_at = now;
        record.failed_seq = self.failure_seq;
        if record.first_failed_seq == 0 {
            record.first_failed_seq = self.failure_seq;
        }
        true
    }

    fn bump(&mut self) -> TrackerUpdate {
        self.revision += 1;
        TrackerUpdate {
            revision: self.revision,
            last_error: self.last_error(),
            outstanding: self.records.len(),
        }
    }
}

/// Tracker of outstanding mutations
#[derive(Clone)]
pub struct MutationTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    state: RwLock<TrackerState>,
    next_id: AtomicU64,
    listeners: Listeners<TrackerUpdate>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MutationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationTracker")
            .field("next_id", &self.inner.next_id.load(Ordering::SeqCst))
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

impl Default for MutationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::with_clock(clock::system_clock())
    }

    /// Create an empty tracker stamping records with `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                state: RwLock::new(TrackerState::default()),
                next_id: AtomicU64::new(1),
                listeners: Listeners::new(),
                clock,
            }),
        }
    }

    /// Allocate the next mutation id
    pub fn next_id(&self) -> MutationId {
        MutationId(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Observe tracker changes
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TrackerUpdate) + Send + Sync + 'static,
    {
        self.inner.listeners.add(callback)
    }

    /// Register a pending mutation and the closure that replays it
    ///
    /// Tracking a known id only replaces its retry closure.
    pub async fn track(&self, id: MutationId, retry_fn: RetryFn) {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.write().await;
        state
            .records
            .entry(id)
            .and_modify(|record| {
                record.retry_fn = Some(Arc::clone(&retry_fn));
                record.updated_at = now;
            })
            .or_insert_with(|| MutationRecord::new(now, Some(retry_fn)));
        self.publish(&mut state);
    }

    /// Record a failure
    ///
    /// Idempotent per id: a repeated failure updates the message of the
    /// existing record. An unknown id gets a record that cannot be replayed.
    pub async fn fail(&self, id: MutationId, message: impl Into<String>) {
        let message = message.into();
        let now = self.inner.clock.now();
        tracing::info!("[Tracker] Mutation {} failed: {}", id, message);
        let mut state = self.inner.state.write().await;
        state
            .records
            .entry(id)
            .or_insert_with(|| MutationRecord::new(now, None));
        state.record_failure(id, message, now);
        self.publish(&mut state);
    }

    /// Record a success, evicting the mutation
    pub async fn succeed(&self, id: MutationId) {
        if self.evict(id).await {
            tracing::debug!("[Tracker] Mutation {} succeeded", id);
        }
    }

    /// Drop a mutation without replaying it
    ///
    /// Returns whether the id was tracked.
    pub async fn dismiss(&self, id: MutationId) -> bool {
        let removed = self.evict(id).await;
        if removed {
            tracing::info!("[Tracker] Mutation {} dismissed", id);
        }
        removed
    }

    async fn evict(&self, id: MutationId) -> bool {
        let mut state = self.inner.state.write().await;
        if state.records.remove(&id).is_none() {
            return false;
        }
        self.publish(&mut state);
        true
    }

    /// Replay every failed mutation concurrently
    ///
    /// Resolves once all replays settled. Successes are evicted, failures stay
    /// tracked with their new message. Mutations already pending (including
    /// ones being replayed by a concurrent call) are not started again.
    ///
    /// Failures of one batch are recorded in id order, except that the
    /// mutation exposed as last error before the batch is recorded last so it
    /// stays exposed if it failed again.
    pub async fn retry_all(&self) -> RetryReport {
        let batch: Vec<(MutationId, RetryFn)> = {
            let mut state = self.inner.state.write().await;
            let now = self.inner.clock.now();
            state
                .records
                .iter_mut()
                .filter(|(_, record)| record.status == MutationStatus::Error)
                .filter_map(|(id, record)| {
                    let retry_fn = record.retry_fn.clone()?;
                    record.status = MutationStatus::Pending;
                    record.retries += 1;
                    record.updated_at = now;
                    Some((*id, retry_fn))
                })
                .collect()
        };

        if batch.is_empty() {
            return RetryReport::default();
        }
        tracing::info!("[Tracker] Retrying {} failed mutations", batch.len());

        let attempts = batch.into_iter().map(|(id, retry_fn)| async move {
            let result = retry_fn().await;
            (id, result)
        });
        let results = join_all(attempts).await;

        let mut report = RetryReport {
            attempted: results.len(),
            ..RetryReport::default()
        };
        let mut state = self.inner.state.write().await;
        let now = self.inner.clock.now();
        let exposed = state.last_error().map(|error| error.mutation_id);
        let mut failures = Vec::new();
        for (id, result) in results {
            match result {
                Ok(_) => {
                    state.records.remove(&id);
                    report.succeeded.push(id);
                }
                Err(error) => failures.push((id, error.message)),
            }
        }
        // `results` follows the batch, which is in id order.
        failures.sort_by_key(|(id, _)| Some(*id) == exposed);
        for (id, message) in failures {
            // Dismissed or resolved while the replay was in flight.
            if state.record_failure(id, message, now) {
                report.failed.push(id);
            }
        }
        report.failed.sort();

        tracing::info!(
            "[Tracker] Retry settled: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        self.publish(&mut state);
        report
    }

    /// Current last-error projection
    pub async fn last_error(&self) -> Option<LastError> {
        self.inner.state.read().await.last_error()
    }

    /// View of one tracked mutation
    pub async fn get(&self, id: MutationId) -> Option<MutationView> {
        let state = self.inner.state.read().await;
        state.records.get(&id).map(|record| view(id, record))
    }

    /// Views of every tracked mutation, oldest first
    pub async fn records(&self) -> Vec<MutationView> {
        let state = self.inner.state.read().await;
        state
            .records
            .iter()
            .map(|(id, record)| view(*id, record))
            .collect()
    }

    /// Pending and failed counts
    pub async fn stats(&self) -> TrackerStats {
        let state = self.inner.state.read().await;
        state
            .records
            .values()
            .fold(TrackerStats::default(), |mut stats, record| {
                match record.status {
                    MutationStatus::Pending => stats.pending += 1,
                    MutationStatus::Error => stats.failed += 1,
                }
                stats
            })
    }

    /// Number of tracked mutations
    pub async fn len(&self) -> usize {
        self.inner.state.read().await.records.len()
    }

    /// Whether nothing is tracked
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Bump the revision and notify observers
    ///
    /// Runs under the state lock so observers see updates in revision order.
    /// Callbacks must not wait on the tracker.
    fn publish(&self, state: &mut TrackerState) {
        let update = state.bump();
        self.inner.listeners.emit(&update);
    }
}

fn view(id: MutationId, record: &MutationRecord) -> MutationView {
    MutationView {
        id,
        status: record.status,
        error_message: record.error_message.clone(),
        retries: record.retries,
        created_at: record.created_at,
        updated_at: record.updated_at,
        retryable: record.retry_fn.is_some(),
    }
}
