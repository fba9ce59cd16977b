//! SQLite pool backing the durable job records.
//!
//! File databases run in WAL mode with a busy timeout so progress writes from
//! the download loop do not collide with snapshot reads. Migrations under
//! `migrations/` are embedded and applied on open.
//!
//! ```no_run
//! use bookfetch_core::{Database, SqliteJobStore};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("bookfetch.db")).await?;
//! let store = SqliteJobStore::new(db);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// SQLite locks the whole file on write, so a handful of connections is plenty.
const MAX_CONNECTIONS: u32 = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to open job database: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("failed to migrate job database: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Cheaply cloneable handle to the job database pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `db_path` and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the file cannot be opened and
    /// [`DbError::Migration`] if the schema cannot be brought up to date.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::migrated(pool).await
    }

    /// In-memory database for tests; gone once the pool closes.
    ///
    /// # Errors
    ///
    /// Same as [`Database::new`].
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        // Each connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        MIGRATOR.run(&pool).await?;
        debug!(migrations = MIGRATOR.iter().count(), "job database ready");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current journal mode as reported by SQLite, lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the pragma query fails.
    pub async fn journal_mode(&self) -> Result<String, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.to_lowercase())
    }

    /// Closes every pooled connection, checkpointing the WAL.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn insert(db: &Database, sql: &str) -> Result<(), sqlx::Error> {
        sqlx::query(sql).execute(db.pool()).await.map(|_| ())
    }

    #[tokio::test]
    async fn test_in_memory_database_has_jobs_table() {
        let db = Database::new_in_memory().await.unwrap();
        insert(
            &db,
            "INSERT INTO jobs (id, title, source, queued_at) VALUES ('abc', 'A Book', 'web', 0)",
        )
        .await
        .unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_jobs_table_rejects_unknown_status() {
        let db = Database::new_in_memory().await.unwrap();
        let result = insert(
            &db,
            "INSERT INTO jobs (id, title, source, status, queued_at) VALUES ('abc', 'A', 'web', 'paused', 0)",
        )
        .await;
        assert!(result.is_err(), "status CHECK constraint should reject 'paused'");
    }

    #[tokio::test]
    async fn test_jobs_table_rejects_unknown_source() {
        let db = Database::new_in_memory().await.unwrap();
        let result = insert(
            &db,
            "INSERT INTO jobs (id, title, source, queued_at) VALUES ('abc', 'A', 'torrent', 0)",
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_database_runs_in_wal_mode() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Database::new(&temp_dir.path().join("jobs.db")).await.unwrap();

        assert_eq!(db.journal_mode().await.unwrap(), "wal");
        db.close().await;
    }

    #[tokio::test]
    async fn test_reopening_keeps_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("jobs.db");

        let db = Database::new(&path).await.unwrap();
        insert(
            &db,
            "INSERT INTO jobs (id, title, source, queued_at) VALUES ('abc', 'A', 'api', 0)",
        )
        .await
        .unwrap();
        db.close().await;

        let db = Database::new(&path).await.unwrap();
        let (title,): (String,) = sqlx::query_as("SELECT title FROM jobs WHERE id = 'abc'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(title, "A");
    }
}
