//! Property-based tests

pub mod cache_key_proptest;
pub mod debounce_proptest;
pub mod tracker_proptest;
