//! Shared SQLite handle for the account and generation tables

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::quota::Dimension;
use crate::{Error, Result};

/// SQLite database shared by the quota and generation ledgers
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at the given path
    pub fn open(db_path: &str) -> Result<Self> {
        debug!("Opening database at: {}", db_path);
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_tables()?;
        info!("Database initialized at {}", db_path);
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_tables()?;
        Ok(db)
    }

    /// Run a closure with exclusive access to the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        f(&mut conn)
    }

    fn init_tables(&self) -> Result<()> {
        let counters = Dimension::ALL
            .iter()
            .map(|d| format!("{} REAL NOT NULL DEFAULT 0", d.column()))
            .collect::<Vec<_>>()
            .join(",\n                ");

        self.with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                plan TEXT NOT NULL DEFAULT 'free',
                period TEXT NOT NULL,
                {counters},
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS generations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                provider TEXT,
                input TEXT NOT NULL,
                artifact_path TEXT NOT NULL,
                artifact_file_id TEXT,
                content_type TEXT NOT NULL,
                duration_secs REAL,
                language TEXT,
                favorite INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_generations_user
                ON generations(user_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_generations_user_kind
                ON generations(user_id, kind, created_at DESC);"
            ))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_creates_tables() {
        let db = Database::in_memory().unwrap();
        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"generations".to_string()));
    }

    #[test]
    fn test_open_on_disk_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vox.db");
        let path = path.to_str().unwrap();

        Database::open(path).unwrap();
        // Second open must not fail on existing tables
        Database::open(path).unwrap();
    }
}
