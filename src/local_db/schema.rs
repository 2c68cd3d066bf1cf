//! Database Schema Definitions
//!
//! Versioned DDL for the durable cache. Each migration is a list of
//! statements applied in order; `schema_migrations` records what ran.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1, 2];

/// Bookkeeping table, created before any migration runs
pub const CREATE_MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
)";

/// Statements making up one migration
pub fn migration_statements(version: i32) -> &'static [&'static str] {
    match version {
        1 => &[
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                stored_at INTEGER NOT NULL
            )",
        ],
        // Purge sweeps scan by age.
        2 => &["CREATE INDEX IF NOT EXISTS idx_cache_entries_stored_at ON cache_entries (stored_at)"],
        _ => &[],
    }
}

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}
