//! Database connection and initialization

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::schema;
use crate::error::{EngineError, EngineResult};

/// Database wrapper with thread-safe connection
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Opens (or creates) the database file and applies the schema
    pub fn new(path: PathBuf) -> EngineResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EngineError::storage(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        db.initialize()?;

        Ok(db)
    }

    /// Creates an in-memory database (for testing)
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        };

        db.initialize()?;

        Ok(db)
    }

    fn initialize(&self) -> EngineResult<()> {
        let conn = self.lock()?;
        schema::create_tables(&conn)
    }

    /// Lock the connection; a poisoned lock is reported as a storage failure
    pub fn lock(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::storage("Database connection lock poisoned"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }

    /// Default database location for the platform
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "windows")]
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));

        #[cfg(not(target_os = "windows"))]
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

        base.join("netguard").join("netguard.db")
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            path: self.path.clone(),
        }
    }
}
