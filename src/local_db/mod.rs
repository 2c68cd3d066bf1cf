//! # Local Database Module
//!
//! SQLite persistence behind the durable cache store. The database survives
//! process restarts so the query cache can warm-start from the last session.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool and schema management
//! - `schema.rs`: versioned DDL and migration bookkeeping
//! - `cache_entries.rs`: key/value/timestamp rows of the durable cache
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pattern_sync::local_db::LocalDatabase;
//!
//! # async fn example() -> Result<(), sqlx::Error> {
//! let db = LocalDatabase::open("/tmp/pattern-sync/cache.db").await?;
//! let stats = db.get_stats().await?;
//! println!("{} cached entries", stats.entry_count);
//! # Ok(())
//! # }
//! ```

pub mod cache_entries;
pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Result as SqlxResult, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// Result type for local database operations
pub type Result<T> = SqlxResult<T>;

/// Local database connection manager
///
/// Manages the SQLite connection pool and applies schema migrations on open.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Creates missing parent directories. Uses WAL mode so sweeps and
    /// reads do not block each other.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Open a private in-memory database
    ///
    /// The pool is pinned to one connection that never idles out, since each
    /// SQLite memory connection is its own database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query("PRAGMA cache_size=1000").execute(&pool).await?;
        sqlx::query("PRAGMA temp_store=MEMORY").execute(&pool).await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations
    ///
    /// Checks the current schema version and applies any pending migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(schema::CREATE_MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await?;

        let current_version = self.schema_version().await?;
        if !schema::needs_migration(current_version) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version) {
            let mut tx = self.pool.begin().await?;
            for statement in schema::migration_statements(version) {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::debug!("[LocalDb] Applied schema migration {}", version);
        }

        Ok(())
    }

    /// Highest applied schema version, 0 for a fresh database
    pub async fn schema_version(&self) -> Result<i32> {
        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(current_version.0)
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let entry_count = self.count_cache_entries().await?;
        Ok(DatabaseStats {
            entry_count,
            schema_version: self.schema_version().await?,
        })
    }

    /// Close the pool, waiting for in-flight queries
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of rows in the durable cache
    pub entry_count: u64,
    /// Applied schema version
    pub schema_version: i32,
}
