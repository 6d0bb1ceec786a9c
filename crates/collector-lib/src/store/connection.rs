//! SQLite connection management
//!
//! A single connection behind `Arc<Mutex<..>>`; SQLite serializes writers
//! anyway and the engine writes one entity at a time.

use super::schema;
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration for the SQLite history store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file path, or `:memory:`
    pub path: PathBuf,
    /// Enable write-ahead logging (ignored for in-memory databases)
    pub wal_mode: bool,
    /// How long a statement waits on a locked database
    pub busy_timeout_ms: u32,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }

    pub fn memory() -> Self {
        Self::new(":memory:")
    }

    fn is_memory(&self) -> bool {
        self.path.to_str() == Some(":memory:")
    }
}

/// Thread-safe SQLite connection wrapper
#[derive(Clone)]
pub struct SqlitePool {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl SqlitePool {
    /// Open the database, configure pragmas and apply migrations
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        info!(path = ?config.path, "Opening history store");

        let conn = if config.is_memory() {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Connection(format!("Failed to create directory: {}", e))
                    })?;
                }
            }
            Connection::open(&config.path)?
        };

        let pool = Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        };
        pool.initialize()?;

        Ok(pool)
    }

    /// In-memory database, used by tests and dry runs
    pub fn memory() -> StoreResult<Self> {
        Self::open(StoreConfig::memory())
    }

    /// Execute a closure with the connection
    pub fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    fn initialize(&self) -> StoreResult<()> {
        self.with_connection(|conn| {
            debug!("Configuring SQLite pragmas");

            if self.config.wal_mode && !self.config.is_memory() {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(&format!(
                "PRAGMA busy_timeout = {};",
                self.config.busy_timeout_ms
            ))?;

            schema::apply_migrations(conn)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_pool_has_schema() {
        let pool = SqlitePool::memory().expect("Failed to create memory pool");

        pool.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
            let tables: Vec<String> = stmt
                .query_map([], |row| row.get(0))?
                .filter_map(Result::ok)
                .collect();

            for table in [
                "analyses",
                "recommendations",
                "resource_requests",
                "sub_units",
                "units",
                "usage_snapshots",
            ] {
                assert!(tables.contains(&table.to_string()), "missing {}", table);
            }
            Ok(())
        })
        .expect("Failed to verify schema");
    }

    #[test]
    fn test_file_pool_uses_wal_and_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let pool = SqlitePool::open(StoreConfig::new(dir.path().join("nested/history.db")))
            .expect("Failed to create pool");

        pool.with_connection(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode;", [], |row| row.get(0))?;
            assert_eq!(mode.to_lowercase(), "wal");

            let fk: i64 = conn.query_row("PRAGMA foreign_keys;", [], |row| row.get(0))?;
            assert_eq!(fk, 1);
            Ok(())
        })
        .expect("Query failed");
    }

    #[test]
    fn test_reopen_does_not_reapply_migrations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.db");

        drop(SqlitePool::open(StoreConfig::new(&path)).unwrap());
        let pool = SqlitePool::open(StoreConfig::new(&path)).unwrap();

        pool.with_connection(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))?;
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
    }
}
