use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{debug, info};

use super::mimes;
use crate::error::CatalogError;
use crate::util::paths;

/// Whether the catalog currently holds an open database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

struct Connected {
    conn: Connection,
    path: PathBuf,
}

/// The Catalog owns the SQLite database holding stores, records and mime types.
///
/// It starts closed. `open` and `close` move it between states and each
/// transition is announced once to every `subscribe`r. All table access goes
/// through the single shared connection, serialized by a lock.
pub struct Catalog {
    inner: Mutex<Option<Connected>>,
    state: watch::Sender<ConnectionState>,
}

impl Catalog {
    /// Create a closed catalog handle.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Catalog {
            inner: Mutex::new(None),
            state,
        }
    }

    /// Create a new catalog file with the full schema, then close it again.
    pub fn create(&self, path: &Path) -> Result<(), CatalogError> {
        let path = absolute(path)?;
        if path.exists() {
            return Err(CatalogError::HasCatalogFile(path));
        }

        // Ensure the parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        debug!(path = %path.display(), "Creating catalog database");

        let mut conn = Connection::open(&path)?;
        init_schema(&mut conn)?;
        conn.close().map_err(|(_, e)| e)?;

        Ok(())
    }

    /// Open an existing catalog file.
    pub fn open(&self, path: &Path) -> Result<(), CatalogError> {
        {
            let mut inner = self.inner.lock();
            if inner.is_some() {
                return Err(CatalogError::AlreadyOpen);
            }

            let path = absolute(path)?;
            if !path.is_file() {
                return Err(CatalogError::NoCatalogFile(path));
            }

            let mut conn = Connection::open(&path)?;
            init_schema(&mut conn)?;

            info!(path = %path.display(), "Catalog opened");
            *inner = Some(Connected { conn, path });
        }

        self.state.send_replace(ConnectionState::Open);
        Ok(())
    }

    /// Close the catalog.
    pub fn close(&self) -> Result<(), CatalogError> {
        let connected = self.inner.lock().take().ok_or(CatalogError::AlreadyClosed)?;
        info!(path = %connected.path.display(), "Closing catalog");

        // The handle is closed even if SQLite reports an error while flushing
        let result = connected.conn.close().map_err(|(_, e)| CatalogError::from(e));
        self.state.send_replace(ConnectionState::Closed);
        result
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Absolute path of the open catalog file.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().as_ref().map(|c| c.path.clone())
    }

    /// Directory relative store paths are resolved against.
    pub fn directory(&self) -> Option<PathBuf> {
        self.path().and_then(|p| p.parent().map(Path::to_path_buf))
    }

    /// Watch open/close transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run `f` against the open connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, CatalogError> {
        let mut inner = self.inner.lock();
        let connected = inner.as_mut().ok_or(CatalogError::Closed)?;
        Ok(f(&mut connected.conn)?)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.path())
            .finish()
    }
}

fn absolute(path: &Path) -> Result<PathBuf, CatalogError> {
    if path.is_absolute() {
        return Ok(paths::normalize(path));
    }
    let cwd = std::env::current_dir()?;
    Ok(paths::resolve_path(&cwd, path))
}

/// Initialize the database schema.
/// Creates all tables and indexes if they don't exist. The mimes table is
/// seeded only when it is created for the first time.
fn init_schema(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;

    let has_mimes: bool = tx.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'mimes')",
        [],
        |row| row.get(0),
    )?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS mimes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            label       TEXT NOT NULL DEFAULT '',
            type        TEXT NOT NULL,
            extension   TEXT NOT NULL,
            viewer      INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_mimes_type ON mimes(type)", [])?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_mimes_extension ON mimes(extension)", [])?;

    if !has_mimes {
        debug!("Seeding default mime types");
        let mut stmt = tx.prepare("INSERT INTO mimes (label, type, extension, viewer) VALUES ('', ?1, ?2, 0)")?;
        for (extension, mime_type) in mimes::builtin_media_types() {
            stmt.execute(rusqlite::params![mime_type, extension])?;
        }
    }

    tx.execute(
        "CREATE TABLE IF NOT EXISTS stores (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            identity        TEXT NOT NULL,
            label           TEXT NOT NULL UNIQUE,
            path            TEXT NOT NULL,
            is_default      INTEGER NOT NULL DEFAULT 0,
            total_files     INTEGER NOT NULL DEFAULT 0,
            used_space      INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_stores_path ON stores(path)", [])?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS records (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            store_id        INTEGER NOT NULL REFERENCES stores(id),
            source_path     TEXT NOT NULL,
            hash            TEXT NOT NULL,
            extension       TEXT NOT NULL,
            mime_id         INTEGER NOT NULL REFERENCES mimes(id),
            size            INTEGER NOT NULL,
            imported_at     INTEGER NOT NULL
        )",
        [],
    )?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_records_hash ON records(hash)", [])?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_records_store ON records(store_id)", [])?;

    tx.commit()
}
