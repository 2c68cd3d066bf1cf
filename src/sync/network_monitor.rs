//! # Connectivity Monitor
//!
//! Normalizes the host's raw online/offline signal into a single debounced
//! boolean.
//!
//! ## Features
//!
//! - **Debounce**: a raw change must stay stable for the whole window before
//!   it counts; every change restarts the window
//! - **Net change only**: a transition is emitted only when the debounced
//!   value differs from the last emitted one, so flapping that reverts inside
//!   the window emits nothing
//! - **Two feeds**: synchronous callbacks via [`ConnectivityMonitor::on_change`]
//!   and a `watch` channel via [`ConnectivityMonitor::watch`]
//!
//! The debounce timer lives in a driver task owned by the monitor. It stops on
//! [`ConnectivityMonitor::shutdown`] or when the last handle is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::shared::clock::Clock;
use crate::shared::listeners::{Listeners, Subscription};

/// Debounced connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    /// Whether the host is considered online
    pub is_online: bool,
    /// When the debounced value last changed
    pub last_changed_at: DateTime<Utc>,
}

/// Debounced connectivity monitor
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    raw_tx: mpsc::UnboundedSender<bool>,
    state_tx: Arc<watch::Sender<ConnectivityState>>,
    listeners: Listeners<ConnectivityState>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.state())
            .field("debounce", &self.inner.debounce)
            .finish()
    }
}

impl ConnectivityMonitor {
    /// Create a monitor starting in `initial` and spawn its driver task
    pub fn new(initial: bool, debounce: Duration, clock: Arc<dyn Clock>) -> Self {
        let state = ConnectivityState {
            is_online: initial,
            last_changed_at: clock.now(),
        };
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(state);
        let state_tx = Arc::new(state_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listeners = Listeners::new();

        let driver = tokio::spawn(drive(
            raw_rx,
            shutdown_rx,
            Arc::clone(&state_tx),
            listeners.clone(),
            debounce,
            clock,
        ));

        Self {
            inner: Arc::new(MonitorInner {
                raw_tx,
                state_tx,
                listeners,
                shutdown_tx,
                driver: Mutex::new(Some(driver)),
                debounce,
            }),
        }
    }

    /// Feed a raw signal from the host environment
    pub fn signal(&self, online: bool) {
        if self.inner.raw_tx.send(online).is_err() {
            tracing::debug!("[Connectivity] Monitor stopped, ignoring raw signal");
        }
    }

    /// Current debounced value
    pub fn current(&self) -> bool {
        self.inner.state_tx.borrow().is_online
    }

    /// Current debounced state
    pub fn state(&self) -> ConnectivityState {
        *self.inner.state_tx.borrow()
    }

    /// Configured debounce window
    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Observe debounced transitions
    ///
    /// Callbacks run on the driver task and must not block.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectivityState) + Send + Sync + 'static,
    {
        self.inner.listeners.add(callback)
    }

    /// Receiver following the debounced state
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.inner.state_tx.subscribe()
    }

    /// Stop the driver task; pending raw changes are discarded
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let driver = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!("[Connectivity] Driver task failed: {}", e);
            }
        }
    }
}

async fn drive(
    mut raw_rx: mpsc::UnboundedReceiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
    state_tx: Arc<watch::Sender<ConnectivityState>>,
    listeners: Listeners<ConnectivityState>,
    debounce: Duration,
    clock: Arc<dyn Clock>,
) {
    let mut emitted = state_tx.borrow().is_online;
    let mut latest = emitted;
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            raw = raw_rx.recv() => {
                let Some(online) = raw else { break };
                if online != latest {
                    latest = online;
                    deadline = Some(Instant::now() + debounce);
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if latest == emitted {
                    tracing::debug!("[Connectivity] Signal reverted within debounce window");
                    continue;
                }
                emitted = latest;
                let state = ConnectivityState {
                    is_online: emitted,
                    last_changed_at: clock.now(),
                };
                tracing::info!(
                    "[Connectivity] Now {}",
                    if emitted { "online" } else { "offline" }
                );
                state_tx.send_replace(state);
                listeners.emit(&state);
            }
        }
    }
}
