//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Scripted backend fakes (fetcher, replayable mutations)
//! - A notifier recording every notice
//! - Store and service fixtures
//! - Custom assertion macros

pub mod assertions;
pub mod fakes;
pub mod fixtures;

// Re-export commonly used utilities
pub use fakes::*;
pub use fixtures::*;
