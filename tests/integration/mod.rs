//! Integration tests across the sync subsystem

pub mod coordinator_test;
pub mod query_cache_test;
pub mod service_test;
