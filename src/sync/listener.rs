//! # Status Listener
//!
//! Passive subscriber turning coordinator snapshots into user-visible
//! notices: one "offline", one "back online", and one "sync failed" per newly
//! surfaced mutation failure.
//!
//! ## Features
//!
//! - **Idempotent mount**: mounting twice keeps a single subscription
//! - **Previous-snapshot slot**: transitions are derived against the last
//!   snapshot this listener handled; anything with a lower or equal `seq` is
//!   ignored
//! - **Teardown**: unmounting (or dropping the listener) unsubscribes; a retry
//!   already in flight runs to completion but its outcome is not announced
//! - **Reconnect policy**: on reconnection the listener, not the coordinator,
//!   decides whether to call `retry_all`
//!
//! Presentation is delegated to a [`Notifier`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::offline::tracker::MutationId;
use crate::shared::listeners::Subscription;
use crate::sync::coordinator::SyncStatusCoordinator;
use crate::sync::sync_state::{StatusTransition, SyncStatusSnapshot};

/// User-visible notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// "You are offline"
    Offline,
    /// "Back online"
    BackOnline,
    /// "Sync failed", offered with a manual retry action
    SyncFailed {
        /// Failing mutation
        mutation_id: MutationId,
        /// Failure message
        message: String,
    },
}

impl From<StatusTransition> for Notice {
    fn from(transition: StatusTransition) -> Self {
        match transition {
            StatusTransition::WentOffline => Notice::Offline,
            StatusTransition::CameOnline => Notice::BackOnline,
            StatusTransition::MutationFailed {
                mutation_id,
                message,
            } => Notice::SyncFailed {
                mutation_id,
                message,
            },
        }
    }
}

/// Presentation of notices (toasts, badges, logs)
pub trait Notifier: Send + Sync {
    /// Show one notice
    fn notify(&self, notice: &Notice);
}

/// Notifier writing notices to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::Offline => tracing::warn!("[StatusListener] You are offline"),
            Notice::BackOnline => tracing::info!("[StatusListener] Back online"),
            Notice::SyncFailed {
                mutation_id,
                message,
            } => tracing::warn!("[StatusListener] Sync failed ({}): {}", mutation_id, message),
        }
    }
}

/// Listener behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerPolicy {
    /// Call `retry_all` when connectivity comes back
    pub retry_on_reconnect: bool,
}

impl Default for ListenerPolicy {
    fn default() -> Self {
        Self {
            retry_on_reconnect: true,
        }
    }
}

/// Notice-producing subscriber of a [`SyncStatusCoordinator`]
pub struct StatusListener {
    coordinator: SyncStatusCoordinator,
    notifier: Arc<dyn Notifier>,
    policy: ListenerPolicy,
    mounted: Mutex<Option<Mounted>>,
}

struct Mounted {
    _subscription: Subscription,
    slot: Arc<ListenerSlot>,
}

struct ListenerSlot {
    previous: Mutex<Arc<SyncStatusSnapshot>>,
    active: AtomicBool,
}

impl std::fmt::Debug for StatusListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusListener")
            .field("policy", &self.policy)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

impl StatusListener {
    /// Create an unmounted listener
    pub fn new(
        coordinator: SyncStatusCoordinator,
        notifier: Arc<dyn Notifier>,
        policy: ListenerPolicy,
    ) -> Self {
        Self {
            coordinator,
            notifier,
            policy,
            mounted: Mutex::new(None),
        }
    }

    /// Subscribe to the coordinator
    ///
    /// The current snapshot becomes the baseline, so state that existed before
    /// mounting is not announced. Returns `false` if already mounted.
    pub fn mount(&self) -> bool {
        let mut mounted = self.lock_mounted();
        if mounted.is_some() {
            return false;
        }

        let slot = Arc::new(ListenerSlot {
            previous: Mutex::new(self.coordinator.get_snapshot()),
            active: AtomicBool::new(true),
        });
        let subscription = {
            let slot = Arc::clone(&slot);
            let notifier = Arc::clone(&self.notifier);
            let coordinator = self.coordinator.clone();
            let policy = self.policy;
            self.coordinator.subscribe(move |snapshot| {
                handle(&slot, snapshot, notifier.as_ref(), &coordinator, policy);
            })
        };

        *mounted = Some(Mounted {
            _subscription: subscription,
            slot,
        });
        tracing::debug!("[StatusListener] Mounted");
        true
    }

    /// Unsubscribe; returns `false` if not mounted
    pub fn unmount(&self) -> bool {
        let Some(mounted) = self.lock_mounted().take() else {
            return false;
        };
        // A publication already being delivered must not notify.
        mounted.slot.active.store(false, Ordering::SeqCst);
        tracing::debug!("[StatusListener] Unmounted");
        true
    }

    /// Whether the listener is subscribed
    pub fn is_mounted(&self) -> bool {
        self.lock_mounted().is_some()
    }

    fn lock_mounted(&self) -> std::sync::MutexGuard<'_, Option<Mounted>> {
        self.mounted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StatusListener {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn handle(
    slot: &ListenerSlot,
    snapshot: &Arc<SyncStatusSnapshot>,
    notifier: &dyn Notifier,
    coordinator: &SyncStatusCoordinator,
    policy: ListenerPolicy,
) {
    let transitions = {
        let mut previous = slot.previous.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshot.seq <= previous.seq {
            return;
        }
        let transitions = snapshot.transitions_since(&previous);
        *previous = Arc::clone(snapshot);
        transitions
    };

    for transition in transitions {
        if !slot.active.load(Ordering::SeqCst) {
            return;
        }
        let reconnected = transition == StatusTransition::CameOnline;
        notifier.notify(&Notice::from(transition));

        if reconnected && policy.retry_on_reconnect {
            spawn_retry(coordinator);
        }
    }
}

fn spawn_retry(coordinator: &SyncStatusCoordinator) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("[StatusListener] No runtime available, skipping retry on reconnect");
        return;
    };
    let coordinator = coordinator.clone();
    runtime.spawn(async move {
        let report = coordinator.retry_all().await;
        if report.attempted > 0 {
            tracing::info!(
                "[StatusListener] Retry on reconnect: {} of {} succeeded",
                report.succeeded.len(),
                report.attempted
            );
        }
    });
}
