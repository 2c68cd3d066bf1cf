//! Shared Error Types
//!
//! This module defines the crate-wide error type returned by construction,
//! configuration and cache-miss paths of the sync subsystem.
//!
//! # Error Categories
//!
//! - `Database` - SQLite failures while opening or migrating the local database
//! - `Serialization` - JSON encoding/decoding of cached payloads
//! - `Config` - invalid or unreadable configuration
//! - `Remote` - the hosted backend rejected a fetch on a cache miss
//! - `StoreUnavailable` - the durable store cannot be used at all
//!
//! Durable-store failures during normal operation never surface through this
//! type: `CacheStore` absorbs them and degrades to memory-only caching.
//!
//! # Usage
//!
//! ```rust
//! use pattern_sync::shared::error::SyncError;
//!
//! let error = SyncError::store_unavailable("quota exceeded");
//! assert!(error.to_string().contains("quota exceeded"));
//! ```
use crate::offline::remote::RemoteError;
use crate::shared::config::ConfigError;
use thiserror::Error;

/// Result alias used across the crate
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced by the sync subsystem
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failure reported by the hosted backend
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Durable storage cannot be used
    #[error("Durable store unavailable: {reason}")]
    StoreUnavailable {
        /// Why the store could not be used
        reason: String,
    },

    /// Filesystem error while preparing storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Create a new store-unavailable error
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Whether the error came from the hosted backend
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}
