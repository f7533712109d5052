//! Shared data structures for the catalog state
//!
//! These structs represent the data model that flows between
//! the database layer and the warehouse.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IntegrityError;
use crate::util::hash::Digest;

/// Result of validating a store against the filesystem. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreStatus {
    /// Everything is fine.
    #[default]
    Ok,
    /// The store directory doesn't exist at its path.
    Missing,
    /// The identity marker is missing or the partition folders are incomplete.
    Invalid,
    /// The identity marker doesn't match the catalog's identity token.
    Mismatch,
}

impl StoreStatus {
    /// Turn a non-Ok status into the matching failure reason.
    pub fn ensure_ok(self) -> Result<(), IntegrityError> {
        match self {
            StoreStatus::Ok => Ok(()),
            StoreStatus::Missing => Err(IntegrityError::Missing),
            StoreStatus::Invalid => Err(IntegrityError::Invalid),
            StoreStatus::Mismatch => Err(IntegrityError::Mismatch),
        }
    }
}

/// A managed root directory holding imported content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Unique database ID (0 until persisted)
    pub id: i64,
    /// Identity token, also written to the marker file at the store root
    pub identity: String,
    /// Cosmetic label, unique across the catalog
    pub label: String,
    /// Absolute path, or a path relative to the catalog file's directory
    pub path: String,
    /// Used when importing without an explicit store
    pub is_default: bool,
    /// Number of files committed into this store
    pub total_files: u64,
    /// Bytes committed into this store
    pub used_space: u64,
    /// Last validation result
    #[serde(skip)]
    pub status: StoreStatus,
}

impl Store {
    pub fn is_empty(&self) -> bool {
        self.total_files == 0 && self.used_space == 0
    }
}

/// Metadata of one imported file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    /// Owning store's database ID
    pub store_id: i64,
    /// Owning store, only populated by an explicit join
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<Store>,
    /// Where the file was imported from
    pub source_path: String,
    pub hash: Digest,
    /// Original extension with separator (e.g. ".png")
    pub extension: String,
    pub mime_id: i64,
    /// File size in bytes
    pub size: u64,
    pub imported_at: DateTime<Utc>,
}

impl Record {
    /// The name this file is stored under: `<hash><extension>`.
    pub fn filename(&self) -> String {
        format!("{}{}", self.hash, self.extension)
    }
}

/// A known media type, keyed by file extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mime {
    pub id: i64,
    /// Cosmetic name
    pub label: String,
    /// Type string, e.g. "image/png"
    pub mime_type: String,
    /// Extension with separator, lowercase (e.g. ".png")
    pub extension: String,
    /// Viewer implementation for this type
    pub viewer: i64,
}

/// A file that passed parsing and is waiting to be committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportItem {
    pub path: PathBuf,
    pub mime: Mime,
    /// Size in bytes at parse time
    pub size: u64,
}
