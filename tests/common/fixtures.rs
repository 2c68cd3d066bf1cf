//! Store and service fixtures
//!
//! Every fixture runs on a [`ManualClock`] so cache ages are set explicitly,
//! independent of the Tokio clock driving debounce timers.

use chrono::Utc;
use pattern_sync::local_db::LocalDatabase;
use pattern_sync::offline::{CacheStore, MemoryBackend, SqliteBackend};
use pattern_sync::shared::{ManualClock, SyncConfig};
use pattern_sync::sync::{ListenerPolicy, StatusListener, SyncService};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::fakes::{RecordingNotifier, ScriptedFetcher};

/// Default cache lifetime
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Default debounce window
pub const WINDOW: Duration = Duration::from_millis(250);

/// Store on an in-memory backend
pub fn memory_store(clock: &ManualClock) -> CacheStore {
    CacheStore::new(Arc::new(MemoryBackend::new()), DAY, Arc::new(clock.clone()))
}

/// Store on a SQLite file
pub async fn sqlite_store(path: &Path, clock: &ManualClock) -> CacheStore {
    let db = LocalDatabase::open(path)
        .await
        .expect("Failed to open test database");
    CacheStore::new(Arc::new(SqliteBackend::new(db)), DAY, Arc::new(clock.clone()))
}

/// Configuration used by test sessions: defaults without the sweeper
pub fn test_config() -> SyncConfig {
    SyncConfig {
        sweep_interval_ms: 0,
        ..SyncConfig::default()
    }
}

/// A running service with its fakes
pub struct Session {
    pub service: SyncService,
    pub fetcher: Arc<ScriptedFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: ManualClock,
}

impl Session {
    /// Start a session on `store`
    pub fn start(store: CacheStore, clock: ManualClock) -> Self {
        let fetcher = ScriptedFetcher::new();
        let service =
            SyncService::with_store(test_config(), store, fetcher.clone(), Arc::new(clock.clone()))
                .expect("Failed to start sync service");
        Self {
            service,
            fetcher,
            notifier: RecordingNotifier::new(),
            clock,
        }
    }

    /// Start a session on an in-memory store
    pub fn in_memory() -> Self {
        let clock = ManualClock::new(Utc::now());
        Self::start(memory_store(&clock), clock)
    }

    /// Mounted listener reporting to this session's notifier
    pub fn listener(&self, policy: ListenerPolicy) -> StatusListener {
        let listener = self.service.status_listener(self.notifier.clone(), policy);
        listener.mount();
        listener
    }

    /// Change connectivity on both the fake backend and the monitor
    pub fn set_online(&self, online: bool) {
        self.fetcher.set_online(online);
        self.service.signal_connectivity(online);
    }
}
