//! Store registry: create, edit, delete and list stores.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::{layout, validator, Warehouse};
use crate::error::{CatalogError, CreateStoreError, DeleteStoreError, EditStoreError, StatisticsError};
use crate::state::{Store, StoreStatus};
use crate::util::paths;

impl Warehouse {
    /// Create a new store at `path`.
    ///
    /// A blank label defaults to the path. The new store becomes the default
    /// if `is_default` is set or if no other store is the default yet.
    /// Creates the root folder, all partitions and the read-only identity marker.
    pub fn create_store(&self, label: &str, path: &str, is_default: bool) -> Result<Store, CreateStoreError> {
        if !self.catalog.is_open() {
            return Err(CatalogError::Closed.into());
        }

        let label = if label.trim().is_empty() { path } else { label };

        // Check if the label or path is already registered
        if self.catalog.count_stores_with_label(label, None)? != 0 {
            return Err(CreateStoreError::LabelExists(label.to_string()));
        }
        if self.catalog.count_stores_with_path(path, None)? != 0 {
            return Err(CreateStoreError::PathExists(path.to_string()));
        }

        let root = self.resolve_store_path(path)?;
        if root.exists() {
            return Err(CreateStoreError::DirectoryExists(root));
        }
        ensure_parent_writable(&root).map_err(CreateStoreError::DirectoryNotWritable)?;

        let mut store = Store {
            id: 0,
            identity: Uuid::new_v4().to_string(),
            label: label.to_string(),
            path: path.to_string(),
            is_default,
            total_files: 0,
            used_space: 0,
            status: StoreStatus::Ok,
        };

        info!(
            label = %store.label,
            path = %store.path,
            identity = %store.identity,
            root = %root.display(),
            "Creating store"
        );

        // Make this store the default if no default store exists
        if !store.is_default {
            store.is_default = self.catalog.count_default_stores()? == 0;
        }

        debug!("Updating catalog");
        self.catalog.insert_store(&mut store)?;

        debug!("Creating directory structure");
        layout::create(&root)?;

        debug!("Writing identity marker");
        let marker = layout::marker_path(&root);
        fs::write(&marker, &store.identity)?;
        paths::set_readonly(&marker, true);

        Ok(store)
    }

    /// Delete an empty store, its folder and its catalog row.
    pub fn delete_store(&self, store: &Store) -> Result<(), DeleteStoreError> {
        if !self.catalog.is_open() {
            return Err(CatalogError::Closed.into());
        }

        // Never delete stores with files in them
        ensure_empty(store)?;
        let mut persisted = self
            .catalog
            .store(store.id)?
            .ok_or(DeleteStoreError::NotFound(store.id))?;
        ensure_empty(&persisted)?;

        self.validate_store(&mut persisted)?.ensure_ok()?;

        let root = self.resolve_store_path(&persisted.path)?;
        ensure_parent_writable(&root).map_err(DeleteStoreError::DirectoryNotWritable)?;

        info!(
            label = %persisted.label,
            path = %persisted.path,
            identity = %persisted.identity,
            root = %root.display(),
            "Deleting store"
        );

        paths::set_readonly(&layout::marker_path(&root), false);

        debug!("Deleting folders");
        fs::remove_dir_all(&root)?;

        debug!("Updating catalog");
        self.catalog.delete_store_row(persisted.id)?;

        Ok(())
    }

    /// Apply label, path and default changes from `store` to its persisted row.
    ///
    /// A changed path moves the whole store. The catalog row is updated only
    /// after the content has fully arrived at the new location.
    pub fn edit_store(&self, store: &mut Store) -> Result<(), EditStoreError> {
        if !self.catalog.is_open() {
            return Err(CatalogError::Closed.into());
        }

        let mut current = self
            .catalog
            .store(store.id)?
            .ok_or(EditStoreError::NotFound(store.id))?;

        let new_root = self.resolve_store_path(&store.path)?;
        info!(
            id = store.id,
            label = %store.label,
            path = %store.path,
            root = %new_root.display(),
            "Editing store"
        );

        self.validate_store(&mut current)?.ensure_ok()?;

        let label = if store.label.trim().is_empty() {
            store.path.clone()
        } else {
            store.label.clone()
        };
        if label != current.label && self.catalog.count_stores_with_label(&label, Some(current.id))? != 0 {
            return Err(EditStoreError::LabelExists(label));
        }

        let old_root = self.resolve_store_path(&current.path)?;
        let relocating = old_root != new_root;
        if store.path != current.path && self.catalog.count_stores_with_path(&store.path, Some(current.id))? != 0 {
            return Err(EditStoreError::PathExists(store.path.clone()));
        }

        if relocating {
            if new_root.starts_with(&old_root) {
                return Err(EditStoreError::InsideStore(new_root));
            }
            if new_root.exists() {
                return Err(EditStoreError::DirectoryExists(new_root));
            }
            ensure_parent_writable(&new_root).map_err(EditStoreError::DirectoryNotWritable)?;
            relocate(&old_root, &new_root, &current.identity)?;
        }

        if let Err(e) = self.catalog.update_store_location(current.id, &label, &store.path) {
            if relocating {
                // Put the content back where the catalog still expects it
                warn!(error = %e, "Catalog update failed after relocation, moving store back");
                if let Err(undo) = relocate(&new_root, &old_root, &current.identity) {
                    warn!(error = %undo, root = %new_root.display(), "Failed to move store back");
                }
            }
            return Err(e.into());
        }

        if store.is_default {
            self.ensure_default_store(store)?;
        } else {
            store.is_default = current.is_default;
        }

        store.label = label;
        store.identity = current.identity;
        store.total_files = current.total_files;
        store.used_space = current.used_space;
        store.status = StoreStatus::Ok;
        Ok(())
    }

    /// All stores, each freshly validated. Empty when the catalog is closed.
    pub fn stores(&self) -> Result<Vec<Store>, CatalogError> {
        if !self.catalog.is_open() {
            return Ok(Vec::new());
        }

        let mut stores = self.catalog.stores()?;
        for store in &mut stores {
            self.validate_store(store)?;
        }
        Ok(stores)
    }

    /// Make `target` the only default store.
    pub fn ensure_default_store(&self, target: &mut Store) -> Result<(), CatalogError> {
        self.catalog.set_default_store(target.id)?;
        target.is_default = true;
        Ok(())
    }

    /// Recompute a store's counters from its records and persist them.
    pub fn update_store_statistics(&self, store: &mut Store) -> Result<(), StatisticsError> {
        if self.catalog.store(store.id)?.is_none() {
            return Err(StatisticsError::NotFound(store.id));
        }

        let (files, bytes) = self.catalog.record_totals(store.id)?;
        self.catalog.set_store_counters(store.id, files, bytes)?;
        debug!(id = store.id, files, bytes, "Updated store statistics");

        store.total_files = files;
        store.used_space = bytes;
        Ok(())
    }
}

fn ensure_empty(store: &Store) -> Result<(), DeleteStoreError> {
    if store.is_empty() {
        Ok(())
    } else {
        Err(DeleteStoreError::NotEmpty {
            total_files: store.total_files,
            used_space: store.used_space,
        })
    }
}

/// Err with the parent folder if it isn't writable.
fn ensure_parent_writable(root: &Path) -> Result<(), PathBuf> {
    match root.parent() {
        Some(parent) if paths::is_directory_writable(parent) => Ok(()),
        Some(parent) => Err(parent.to_path_buf()),
        None => Err(root.to_path_buf()),
    }
}

/// Move a store root to `to`, all or nothing.
///
/// Tries a rename first. When that fails (e.g. across devices) the tree is
/// copied, the copy is validated against `identity`, and only then is the
/// original removed. A failed copy is cleaned up and leaves `from` untouched.
fn relocate(from: &Path, to: &Path, identity: &str) -> Result<(), EditStoreError> {
    if fs::rename(from, to).is_ok() {
        info!(from = %from.display(), to = %to.display(), "Relocated store");
        return Ok(());
    }

    debug!(from = %from.display(), to = %to.display(), "Rename failed, copying store");
    let copied = copy_tree(from, to).and_then(|()| {
        if validator::validate(to, identity) == StoreStatus::Ok {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::InvalidData, "copied store failed validation"))
        }
    });

    if let Err(source) = copied {
        if to.exists() {
            if let Err(e) = fs::remove_dir_all(to) {
                warn!(root = %to.display(), error = %e, "Failed to clean up partial store copy");
            }
        }
        return Err(EditStoreError::Relocation {
            target: to.to_path_buf(),
            source,
        });
    }

    paths::set_readonly(&layout::marker_path(from), false);
    fs::remove_dir_all(from)?;
    info!(from = %from.display(), to = %to.display(), "Relocated store by copy");
    Ok(())
}

/// Copy a directory tree, keeping every file name (and so every hash address).
fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
