//! Database connection and pool management.
//!
//! The SQLite file is the single durable medium shared by the object store
//! and the blob store. Both tables are created by the embedded migrations.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
/// Writes are serialized by SQLite anyway; a handful of readers is plenty.
pub const MAX_CONNECTIONS: u32 = 4;

#[derive(Debug, Clone)]
enum State {
    Open(SqlitePool),
    /// Opening failed once; the reason is replayed on every operation.
    Unavailable(String),
}

/// Handle to the durable medium.
///
/// This is the main entry point for interacting with the database. It manages
/// the SQLite connection pool and is cheap to clone; stores built on top of
/// it share the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    state: State,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply the query-based PRAGMAs to EVERY connection in the pool,
            // not only the first one handed out.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.max(1))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)
            .or_raise(|| ErrorKind::StorageUnavailable("could not open database".to_string()))?;
        let db = Self { state: State::Open(pool) };
        db.migrate()
            .await
            .or_raise(|| ErrorKind::StorageUnavailable("could not prepare database schema".to_string()))?;
        Ok(db)
    }

    /// Connect to the database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    /// Any failure is reported as [`ErrorKind::StorageUnavailable`].
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, MAX_CONNECTIONS).await
    }

    /// Same as [`connect`](Self::connect) with an explicit pool size.
    pub async fn connect_with(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, max_connections).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // In-memory database must be limited to one connection, otherwise
        // parallel connections see different databases.
        Self::new(options, 1).await
    }

    /// Connect, or fall back to a degraded handle if the medium can't be opened.
    ///
    /// The failure is logged exactly once here. Every operation on the
    /// returned handle then fails fast with the same
    /// [`StorageUnavailable`](ErrorKind::StorageUnavailable) reason without
    /// touching the filesystem again.
    pub async fn connect_or_degrade(path: impl AsRef<Path>, max_connections: u32) -> Self {
        let path = path.as_ref();
        match Self::connect_with(path, max_connections).await {
            Ok(db) => db,
            Err(err) => {
                tracing::error!(path = %path.display(), error = ?err, "Storage is unavailable for this session");
                Self::unavailable(format!("{}: {err}", path.display()))
            },
        }
    }

    /// A handle whose every operation fails with `StorageUnavailable(reason)`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: State::Unavailable(reason.into()),
        }
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            // A committed write must survive the app being killed, but
            // fsync-per-transaction is overkill for WAL mode.
            .synchronous(SqliteSynchronous::Normal)
            // UI saves, image uploads and a restore can all overlap.
            .busy_timeout(std::time::Duration::from_millis(1500))
            // Restores and resets free whole tables; see `reclaim_space`.
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Incremental)
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA locking_mode = NORMAL;
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Run database migrations.
    ///
    /// This is called automatically by `connect` and `connect_in_memory`.
    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(self.pool()?).await.or_raise(|| ErrorKind::Migration)
    }

    /// Return the pages freed by bulk deletes to the filesystem.
    ///
    /// Failing to do so loses nothing, so errors are only logged.
    pub async fn reclaim_space(&self) {
        let Ok(pool) = self.pool() else {
            return;
        };
        if let Err(err) = sqlx::query("PRAGMA incremental_vacuum").execute(pool).await {
            tracing::warn!(error = %err, "could not reclaim free pages");
        }
    }

    /// Whether the medium was opened successfully.
    pub fn is_available(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// Fails fast with [`StorageUnavailable`](ErrorKind::StorageUnavailable)
    /// on a degraded handle.
    pub fn pool(&self) -> Result<&SqlitePool> {
        match &self.state {
            State::Open(pool) => Ok(pool),
            State::Unavailable(reason) => exn::bail!(ErrorKind::StorageUnavailable(reason.clone())),
        }
    }

    /// Close the database connection pool.
    ///
    /// Waits for all connections to be returned to the pool and then closes
    /// them. A degraded handle has nothing to close.
    pub async fn close(&self) {
        if let State::Open(pool) = &self.state {
            // Let SQLite update query planner statistics
            _ = sqlx::query("PRAGMA optimize").execute(pool).await;
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(db.is_available());
        assert!(!db.pool().unwrap().is_closed());
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("hearth.sqlite3");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        // Running migrate again should succeed (already applied)
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool().unwrap()).await.unwrap();
        assert_eq!(row.0, 800, "WAL checkpoint should be 800");
        db.close().await;
    }

    #[tokio::test]
    async fn test_auto_vacuum_is_incremental() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Database::connect(temp_dir.path().join("hearth.sqlite3")).await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA auto_vacuum").fetch_one(db.pool().unwrap()).await.unwrap();
        // 2 = INCREMENTAL
        assert_eq!(row.0, 2);
        db.close().await;
    }

    #[tokio::test]
    async fn test_unopenable_path_degrades() {
        let temp_dir = tempfile::tempdir().unwrap();
        // A directory can't be opened as a database file.
        let db = Database::connect_or_degrade(temp_dir.path(), 1).await;
        assert!(!db.is_available());
        let err = db.pool().unwrap_err();
        assert!(matches!(&*err, ErrorKind::StorageUnavailable(_)));
        // Same kind on every call, no retry against the medium.
        let again = db.pool().unwrap_err();
        assert_eq!(*err, *again);
    }

    #[tokio::test]
    async fn test_connect_reports_unavailable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = Database::connect(temp_dir.path()).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
