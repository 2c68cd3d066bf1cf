//! # Sync Status Coordinator
//!
//! Single source of truth combining connectivity and the mutation tracker
//! into one [`SyncStatusSnapshot`].
//!
//! ## Delivery
//!
//! - A snapshot is published only when its state differs from the current one
//! - Publication is serialized: subscribers see snapshots in `seq` order
//! - Tracker updates carrying an older revision than the last one applied are
//!   dropped, so concurrent retries cannot roll the projection back
//! - The coordinator never retries on its own; reacting to reconnection is
//!   the listener's call
//!
//! Upstream subscriptions hold the coordinator weakly and are released by
//! [`SyncStatusCoordinator::shutdown`].

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::offline::tracker::{MutationTracker, RetryReport, TrackerUpdate};
use crate::shared::listeners::{Listeners, Subscription};
use crate::sync::network_monitor::{ConnectivityMonitor, ConnectivityState};
use crate::sync::sync_state::SyncStatusSnapshot;

/// Coordinator of the sync status read model
#[derive(Clone)]
pub struct SyncStatusCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    state: Mutex<CoordinatorState>,
    delivery: Mutex<()>,
    listeners: Listeners<Arc<SyncStatusSnapshot>>,
    tracker: MutationTracker,
    upstream: Mutex<Vec<Subscription>>,
}

struct CoordinatorState {
    snapshot: Arc<SyncStatusSnapshot>,
    tracker_revision: u64,
}

impl std::fmt::Debug for SyncStatusCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStatusCoordinator")
            .field("snapshot", &self.get_snapshot())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

impl SyncStatusCoordinator {
    /// Wire a coordinator to `monitor` and `tracker`
    ///
    /// Failures recorded on the tracker before this call are picked up with
    /// its next change.
    pub fn new(monitor: &ConnectivityMonitor, tracker: MutationTracker) -> Self {
        let inner = Arc::new(CoordinatorInner {
            state: Mutex::new(CoordinatorState {
                snapshot: Arc::new(SyncStatusSnapshot::initial(monitor.current())),
                tracker_revision: 0,
            }),
            delivery: Mutex::new(()),
            listeners: Listeners::new(),
            tracker: tracker.clone(),
            upstream: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        let connectivity = monitor.on_change(move |state: &ConnectivityState| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.apply_connectivity(state.is_online);
            }
        });
        let weak = Arc::downgrade(&inner);
        let mutations = tracker.on_change(move |update: &TrackerUpdate| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.apply_tracker(update);
            }
        });
        inner
            .upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([connectivity, mutations]);

        // A change that raced the subscription above.
        inner.apply_connectivity(monitor.current());

        Self { inner }
    }

    /// Current snapshot
    pub fn get_snapshot(&self) -> Arc<SyncStatusSnapshot> {
        Arc::clone(&self.inner.lock_state().snapshot)
    }

    /// Observe published snapshots
    ///
    /// Callbacks run on the task that caused the change and must not block.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<SyncStatusSnapshot>) + Send + Sync + 'static,
    {
        self.inner.listeners.add(callback)
    }

    /// Replay every failed mutation
    pub async fn retry_all(&self) -> RetryReport {
        self.inner.tracker.retry_all().await
    }

    /// Tracker feeding this coordinator
    pub fn tracker(&self) -> &MutationTracker {
        &self.inner.tracker
    }

    /// Detach from the monitor and the tracker
    ///
    /// The last snapshot stays readable; nothing is published afterwards.
    pub fn shutdown(&self) {
        let upstream: Vec<Subscription> = self
            .inner
            .upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if !upstream.is_empty() {
            tracing::debug!("[Coordinator] Detached from connectivity and tracker");
        }
    }
}

impl CoordinatorInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_connectivity(&self, is_online: bool) {
        self.publish_with(|state| {
            Some(SyncStatusSnapshot {
                is_online,
                ..(*state.snapshot).clone()
            })
        });
    }

    fn apply_tracker(&self, update: &TrackerUpdate) {
        self.publish_with(|state| {
            if update.revision <= state.tracker_revision {
                return None;
            }
            state.tracker_revision = update.revision;

            let current = &state.snapshot;
            let (last_handled_mutation_id, last_handled_failure_seq) = match &update.last_error {
                Some(error) if error.first_failure_seq > current.last_handled_failure_seq => {
                    (Some(error.mutation_id), error.first_failure_seq)
                }
                _ => (
                    current.last_handled_mutation_id,
                    current.last_handled_failure_seq,
                ),
            };
            Some(SyncStatusSnapshot {
                last_error_message: update.last_error.as_ref().map(|e| e.message.clone()),
                last_error_mutation_id: update.last_error.as_ref().map(|e| e.mutation_id),
                last_handled_mutation_id,
                last_handled_failure_seq,
                ..(**current).clone()
            })
        });
    }

    /// Derive and publish the next snapshot
    ///
    /// The delivery lock is held from derivation through fan-out, which keeps
    /// publications totally ordered.
    fn publish_with<F>(&self, derive: F)
    where
        F: FnOnce(&mut CoordinatorState) -> Option<SyncStatusSnapshot>,
    {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        let published = {
            let mut state = self.lock_state();
            let Some(mut next) = derive(&mut *state) else {
                return;
            };
            if next.same_state(&state.snapshot) {
                return;
            }
            next.seq = state.snapshot.seq + 1;
            let next = Arc::new(next);
            state.snapshot = Arc::clone(&next);
            next
        };

        tracing::debug!(
            "[Coordinator] Snapshot {}: online={}, last_error={:?}",
            published.seq,
            published.is_online,
            published.last_error_mutation_id
        );
        self.listeners.emit(&published);
    }
}
