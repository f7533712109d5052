/// Warehouse module
///
/// The warehouse manages the physical stores of a catalog:
/// - Store creation, editing, deletion and default selection (registry.rs)
/// - Filesystem validation of a store against its identity (validator.rs)
/// - The sharded partition layout inside a store (layout.rs)
/// - Two-phase parse/commit import of files into a store (import.rs)
pub mod import;
pub mod layout;
pub mod registry;
pub mod validator;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CatalogError;
use crate::state::{Catalog, Record, Store, StoreStatus};
use crate::util::hash::DEFAULT_BLOCK_SIZE;
use crate::util::paths;

/// Content-addressed file storage over the stores of one catalog.
///
/// Cheap to clone; clones share the same catalog handle.
#[derive(Debug, Clone)]
pub struct Warehouse {
    catalog: Arc<Catalog>,
    hash_block_size: usize,
}

impl Warehouse {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Warehouse {
            catalog,
            hash_block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Bytes hashed between cancellation checks during commit.
    pub fn with_hash_block_size(mut self, block_size: usize) -> Self {
        self.hash_block_size = block_size.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Absolute folder path of a store path, resolving relative paths
    /// against the catalog file's directory.
    pub fn resolve_store_path(&self, path: &str) -> Result<PathBuf, CatalogError> {
        let base = self.catalog.directory().ok_or(CatalogError::Closed)?;
        Ok(paths::resolve_path(&base, Path::new(path)))
    }

    /// Re-check a store on disk and record the result in `store.status`.
    pub fn validate_store(&self, store: &mut Store) -> Result<StoreStatus, CatalogError> {
        let root = self.resolve_store_path(&store.path)?;
        store.status = validator::validate(&root, &store.identity);
        Ok(store.status)
    }

    /// Absolute path of a record's content inside `store`.
    pub fn record_path(&self, store: &Store, record: &Record) -> Result<PathBuf, CatalogError> {
        let root = self.resolve_store_path(&store.path)?;
        Ok(layout::content_path(&root, &record.hash, &record.extension))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    /// A warehouse over a fresh catalog inside a temp directory.
    pub(crate) fn warehouse() -> (TempDir, Warehouse) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let catalog = Catalog::new();
        catalog.create(&path).unwrap();
        catalog.open(&path).unwrap();
        (dir, Warehouse::new(Arc::new(catalog)))
    }
}
