//! # Remote Contracts
//!
//! Narrow interfaces to the hosted backend (auth, row storage, object
//! storage). The sync subsystem never talks to the backend directly; callers
//! hand it a [`QueryFetcher`] for reads and mutation closures for writes.
//!
//! A failure only carries a human-readable message. Causes are not
//! interpreted beyond that.

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::shared::cache_key::CacheKey;

/// Typed failure returned by the hosted backend
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    /// Human-readable message shown to the user
    pub message: String,
}

impl RemoteError {
    /// Create a new remote error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of a mutation attempt: the value to cache on success, if any
pub type MutationResult = Result<Option<Value>, RemoteError>;

/// Future produced by one mutation attempt
pub type MutationFuture = BoxFuture<'static, MutationResult>;

/// Replayable mutation attempt
pub type RetryFn = Arc<dyn Fn() -> MutationFuture + Send + Sync>;

/// Wrap a closure producing mutation futures into a [`RetryFn`]
pub fn retry_fn<F, Fut>(attempt: F) -> RetryFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MutationResult> + Send + 'static,
{
    Arc::new(move || attempt().boxed())
}

/// Read side of the hosted backend
///
/// Values are keyed by the same canonical keys used for caching.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    /// Fetch the current value for `key`
    async fn fetch(&self, key: &CacheKey) -> Result<Value, RemoteError>;
}
