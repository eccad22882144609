use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use super::connection::SqliteConnection;
use crate::driver::{Driver, DriverConnection, DriverError};

static NEXT_MEMORY_DB: AtomicU64 = AtomicU64::new(1);

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Target {
    /// Shared-cache memory database URI
    Memory(String),
    File(PathBuf),
}

/// [`Driver`] over an embedded SQLite database.
pub struct SqliteDriver {
    target: Target,
    // A shared-cache memory database lives only while a connection to it is open.
    _anchor: Option<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

fn open_error(e: &rusqlite::Error) -> DriverError {
    DriverError::connection(format!("sqlite open failed: {e}"))
}

impl SqliteDriver {
    /// A private memory database, shared by every connection this driver opens.
    ///
    /// # Errors
    /// Returns [`DriverError`] if SQLite cannot create the database.
    pub fn in_memory() -> Result<Self, DriverError> {
        let n = NEXT_MEMORY_DB.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:remote-sql-mem-{}-{n}?mode=memory&cache=shared",
            std::process::id()
        );
        let anchor = Connection::open_with_flags(&uri, OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI)
            .map_err(|e| open_error(&e))?;
        tracing::debug!(%uri, "created in-memory database");
        Ok(Self {
            target: Target::Memory(uri),
            _anchor: Some(Mutex::new(anchor)),
        })
    }

    /// A database file at `path`, created if missing and switched to WAL mode.
    ///
    /// # Errors
    /// Returns [`DriverError`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| open_error(&e))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| open_error(&e))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened database file");
        Ok(Self {
            target: Target::File(path),
            _anchor: None,
        })
    }
}

impl Driver for SqliteDriver {
    fn connect(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        let conn = match &self.target {
            Target::Memory(uri) => {
                Connection::open_with_flags(uri, OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI)
            }
            Target::File(path) => Connection::open(path),
        }
        .map_err(|e| open_error(&e))?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(|e| open_error(&e))?;
        Ok(Box::new(SqliteConnection::new(conn)))
    }

    fn is_in_memory(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
