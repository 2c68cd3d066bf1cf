//! # Cache Entry Operations
//!
//! Row-level access to the `cache_entries` table: one row per canonical cache
//! key holding the serialized payload and the time it was stored.
//!
//! Writes are single-statement upserts, so a reader never observes a partial
//! entry and the last write for a key wins.

use crate::local_db::LocalDatabase;
use crate::offline::store::CacheEntry;
use crate::shared::cache_key::CacheKey;
use chrono::{DateTime, Utc};
use sqlx::{Result as SqlxResult, Row};

/// Result type alias for cache entry operations
pub type Result<T> = SqlxResult<T>;

impl LocalDatabase {
    /// Insert or replace the entry for its key
    pub async fn upsert_cache_entry(&self, entry: &CacheEntry) -> Result<()> {
        let value = serde_json::to_string(&entry.value)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query(
            "INSERT INTO cache_entries (key, value, stored_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, stored_at = excluded.stored_at",
        )
        .bind(entry.key.as_str())
        .bind(value)
        .bind(entry.stored_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch the entry for `key`, expired or not
    pub async fn get_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query("SELECT key, value, stored_at FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                let value = serde_json::from_str(&raw)
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                let stored_at: i64 = row.try_get("stored_at")?;
                Ok(Some(CacheEntry {
                    key: CacheKey::from_raw(row.try_get::<String, _>("key")?),
                    value,
                    stored_at: DateTime::from_timestamp_millis(stored_at).unwrap_or_default(),
                }))
            }
            None => Ok(None),
        }
    }

    /// Delete the entry for `key`, returning whether a row existed
    pub async fn delete_cache_entry(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the entry for `key` only if it still carries `stored_at`
    ///
    /// Returns `false` when the row is gone or was rewritten since it was read.
    pub async fn delete_cache_entry_stored_at(
        &self,
        key: &str,
        stored_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ? AND stored_at = ?")
            .bind(key)
            .bind(stored_at.timestamp_millis())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every entry stored before `cutoff`
    pub async fn delete_cache_entries_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE stored_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Number of stored entries
    pub async fn count_cache_entries(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(self.pool())
            .await?;
        Ok(count.0 as u64)
    }
}
