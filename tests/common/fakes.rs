//! Backend and presentation fakes

use async_trait::async_trait;
use pattern_sync::offline::remote::{retry_fn, QueryFetcher, RemoteError, RetryFn};
use pattern_sync::shared::CacheKey;
use pattern_sync::sync::{Notice, Notifier};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fetcher serving scripted values, switchable offline
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    offline: AtomicBool,
    calls: AtomicUsize,
    values: Mutex<HashMap<String, Value>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn set_value(&self, key: &CacheKey, value: Value) {
        self.values
            .lock()
            .unwrap()
            .insert(key.as_str().to_string(), value);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryFetcher for ScriptedFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<Value, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::new("network error"));
        }
        let values = self.values.lock().unwrap();
        Ok(values
            .get(key.as_str())
            .cloned()
            .unwrap_or_else(|| json!({ "key": key.as_str() })))
    }
}

/// Replayable mutation whose outcome can be changed between attempts
#[derive(Debug, Clone, Default)]
pub struct ScriptedMutation {
    failure: Arc<Mutex<Option<String>>>,
    attempts: Arc<AtomicUsize>,
}

impl ScriptedMutation {
    pub fn failing(message: &str) -> Self {
        let mutation = Self::default();
        mutation.fail_with(message);
        mutation
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn retry(&self) -> RetryFn {
        let mutation = self.clone();
        retry_fn(move || {
            let outcome = mutation.attempt();
            async move { outcome }
        })
    }

    pub fn attempt(&self) -> Result<Option<Value>, RemoteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(RemoteError::new(message)),
            None => Ok(Some(json!({ "saved": true }))),
        }
    }
}

/// Notifier keeping every notice it receives
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}
