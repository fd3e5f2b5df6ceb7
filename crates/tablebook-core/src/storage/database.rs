//! SQLite storage for reservations, admin settings and the sync log.
//!
//! The connection sits behind a mutex so one `Database` can be shared
//! between the booking flow and the background sync task. Every repository
//! method takes the lock for the duration of one statement (or one
//! transaction) and releases it before returning, so no guard ever lives
//! across an `.await`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use super::{data_dir, migrations, Config};
use crate::error::{CoreError, DatabaseError};

/// SQLite database handle.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/tablebook/tablebook.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("tablebook.db");
        Ok(Self::open_at(path)?)
    }

    /// Open `restaurant.database_path` if configured, the default location
    /// otherwise.
    pub fn open_configured(config: &Config) -> Result<Self, CoreError> {
        match &config.restaurant.database_path {
            Some(path) => Ok(Self::open_at(path)?),
            None => Self::open(),
        }
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database. Used by tests and dry runs.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        tracing::debug!(
            version = migrations::get_schema_version(&conn),
            "database ready"
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the underlying SQLite connection.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }
}
