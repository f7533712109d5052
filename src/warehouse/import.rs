//! Two-phase import: a cheap `parse` to filter candidates by type, and an
//! expensive `commit` that hashes, records and copies one file into a store.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read};
use std::path::Path;

use chrono::{SubsecRound, Utc};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{layout, Warehouse};
use crate::error::{CatalogError, CommitError, ParseError};
use crate::state::{ImportItem, Record, Store};
use crate::util::hash;

impl Warehouse {
    /// Check that `path` is an importable file and resolve its mime type.
    ///
    /// Nothing is hashed or copied here.
    pub fn parse(&self, path: &Path) -> Result<ImportItem, ParseError> {
        if !self.catalog.is_open() {
            return Err(CatalogError::Closed.into());
        }

        // Check if the file still exists
        if !path.is_file() {
            return Err(ParseError::FileNotFound(path.to_path_buf()));
        }

        let extension = extension_of(path).ok_or_else(|| ParseError::UnknownMime(path.to_path_buf()))?;
        let mime = self
            .catalog
            .mime_by_extension(&extension)?
            .ok_or_else(|| ParseError::UnknownMime(path.to_path_buf()))?;

        let size = fs::metadata(path)?.len();

        Ok(ImportItem {
            path: path.to_path_buf(),
            mime,
            size,
        })
    }

    /// Import a parsed file into `store`.
    ///
    /// The record row is always written. The bytes are copied only if the
    /// store doesn't already hold a file with the same hash and extension.
    /// On success `store` carries the updated counters.
    pub fn commit(
        &self,
        store: &mut Store,
        item: &ImportItem,
        cancel: &CancellationToken,
    ) -> Result<Record, CommitError> {
        self.commit_reading(store, item, cancel, |p: &Path| File::open(p))
    }

    /// `commit`, hashing whatever `open` yields for the item's path.
    fn commit_reading<R: Read>(
        &self,
        store: &mut Store,
        item: &ImportItem,
        cancel: &CancellationToken,
        open: impl FnOnce(&Path) -> io::Result<R>,
    ) -> Result<Record, CommitError> {
        if !self.catalog.is_open() {
            return Err(CatalogError::Closed.into());
        }

        // Check if the file still exists
        if !item.path.is_file() {
            return Err(CommitError::FileNotFound(item.path.clone()));
        }

        self.validate_store(store)?.ensure_ok()?;

        if cancel.is_cancelled() {
            return Err(CommitError::Cancelled);
        }

        debug!(path = %item.path.display(), "Hashing file");
        let digest = hash::hash_reader(open(&item.path)?, self.hash_block_size, cancel)?;
        let size = fs::metadata(&item.path)?.len();

        let mut record = Record {
            id: 0,
            store_id: store.id,
            store: None,
            source_path: item.path.to_string_lossy().into_owned(),
            hash: digest,
            extension: extension_of(&item.path).unwrap_or_default(),
            mime_id: item.mime.id,
            size,
            imported_at: Utc::now().trunc_subsecs(0),
        };

        debug!(hash = %record.hash, "Updating catalog");
        self.catalog.insert_record(&mut record)?;

        let root = self.resolve_store_path(&store.path)?;
        let target = layout::content_path(&root, &record.hash, &record.extension);
        if target.exists() {
            debug!(target = %target.display(), "Content already stored, skipping copy");
        } else {
            debug!(target = %target.display(), "Copying file");
            store_content(File::open(&item.path)?, &target)?;
        }

        let (total_files, used_space) = self.catalog.increment_store_counters(store.id, 1, size)?;
        store.total_files = total_files;
        store.used_space = used_space;

        info!(
            source = %item.path.display(),
            store = %store.label,
            hash = %record.hash,
            size,
            "Imported file"
        );

        Ok(record)
    }
}

/// Write `source` to `target` through a temp file in the same partition,
/// so `target` either holds the complete content or doesn't exist.
fn store_content(mut source: impl Read, target: &Path) -> io::Result<()> {
    let partition = target
        .parent()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "content path has no partition"))?;

    let mut staged = NamedTempFile::new_in(partition)?;
    io::copy(&mut source, &mut staged)?;
    staged.as_file().sync_all()?;

    match staged.persist_noclobber(target) {
        Ok(_) => Ok(()),
        // Same content landed first
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.error),
    }
}

/// `".ext"` exactly as it appears on the file: everything from the last dot
/// of the file name, including for dotfiles like `.png`.
fn extension_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let dot = name.rfind('.')?;
    (dot + 1 < name.len()).then(|| name[dot..].to_string())
}
