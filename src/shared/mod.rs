//! Shared Module
//!
//! This module contains types used by every part of the sync subsystem:
//! the crate error, configuration, canonical cache keys, the injectable
//! clock and the callback registry behind every `subscribe`/`on_change`.

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Canonical cache keys
pub mod cache_key;

/// Injectable time source
pub mod clock;

/// Callback registry with drop-to-unsubscribe handles
pub mod listeners;

/// Re-export commonly used types for convenience
pub use cache_key::{CacheKey, CacheKeyBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{SyncError, SyncResult};
pub use listeners::{Listeners, Subscription};
