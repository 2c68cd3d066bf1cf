//! # Background Purge
//!
//! Periodically reclaims durable cache entries older than the store's
//! `max_age`, off the caller's path.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pattern_sync::offline::CacheStore;
//! use pattern_sync::sync::background::PurgeSweeper;
//! use std::time::Duration;
//!
//! # async fn example(store: CacheStore) {
//! let mut sweeper = PurgeSweeper::new(store, Duration::from_secs(600));
//! sweeper.start();
//! // ...
//! sweeper.stop().await;
//! # }
//! ```

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::offline::store::CacheStore;

/// Periodic sweeper of expired durable entries
#[derive(Debug)]
pub struct PurgeSweeper {
    /// Store being swept
    store: CacheStore,
    /// Time between sweeps
    every: Duration,
    /// Stop signal for the running task
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Running sweep task
    task: Option<JoinHandle<()>>,
}

impl PurgeSweeper {
    /// Create a stopped sweeper
    pub fn new(store: CacheStore, every: Duration) -> Self {
        Self {
            store,
            every: every.max(Duration::from_millis(1)),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Start sweeping; the first sweep runs immediately
    ///
    /// Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = self.store.clone();
        let every = self.every;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let removed = store.purge_expired(store.max_age()).await;
                        if removed > 0 {
                            tracing::info!("[Sweeper] Reclaimed {} expired cache entries", removed);
                        }
                    }
                }
            }
        }));
        self.shutdown_tx = Some(shutdown_tx);
        tracing::debug!("[Sweeper] Started, sweeping every {:?}", every);
        true
    }

    /// Stop sweeping and wait for the task to exit
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("[Sweeper] Sweep task failed: {}", e);
            }
            tracing::debug!("[Sweeper] Stopped");
        }
    }

    /// Whether the sweep task is running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}
