//! Error types for every operation family of the warehouse.
//!
//! Expected conditions (a label already taken, a store folder gone missing,
//! an unknown file type) are variants the caller can match on. Exceptional
//! I/O and SQLite failures are wrapped so they still surface through `?`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Lifecycle and access failures of the catalog database.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog database is closed")]
    Closed,

    #[error("catalog database is already open")]
    AlreadyOpen,

    #[error("catalog database is already closed")]
    AlreadyClosed,

    #[error("no catalog file at {0}")]
    NoCatalogFile(PathBuf),

    #[error("a catalog file already exists at {0}")]
    HasCatalogFile(PathBuf),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A store failed validation. Maps one-to-one onto the non-Ok store statuses.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("store directory does not exist")]
    Missing,

    #[error("store structure is invalid")]
    Invalid,

    #[error("store identity does not match the catalog")]
    Mismatch,
}

#[derive(Debug, Error)]
pub enum CreateStoreError {
    #[error("a store labelled {0:?} already exists")]
    LabelExists(String),

    #[error("a store at {0:?} is already registered")]
    PathExists(String),

    #[error("directory {0} already exists")]
    DirectoryExists(PathBuf),

    #[error("directory {0} is not writable")]
    DirectoryNotWritable(PathBuf),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DeleteStoreError {
    #[error("store still holds {total_files} files ({used_space} bytes)")]
    NotEmpty { total_files: u64, used_space: u64 },

    #[error("store {0} is not registered")]
    NotFound(i64),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("directory {0} is not writable")]
    DirectoryNotWritable(PathBuf),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum EditStoreError {
    #[error("store {0} is not registered")]
    NotFound(i64),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("a store labelled {0:?} already exists")]
    LabelExists(String),

    #[error("a store at {0:?} is already registered")]
    PathExists(String),

    #[error("directory {0} already exists")]
    DirectoryExists(PathBuf),

    #[error("directory {0} is not writable")]
    DirectoryNotWritable(PathBuf),

    #[error("cannot move a store into its own folder ({0})")]
    InsideStore(PathBuf),

    #[error("failed to relocate store to {target}: {source}")]
    Relocation {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("store {0} is not registered")]
    NotFound(i64),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("file {0} does not exist")]
    FileNotFound(PathBuf),

    #[error("unknown mime type for {0}")]
    UnknownMime(PathBuf),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("file {0} does not exist")]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("import cancelled")]
    Cancelled,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hashing cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<HashError> for CommitError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::Cancelled => CommitError::Cancelled,
            HashError::Io(e) => CommitError::Io(e),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    #[error("another batch is already running")]
    Busy,
}
