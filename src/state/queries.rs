//! Table-scoped queries over stores, records and mimes.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::catalog::Catalog;
use super::data::{Mime, Record, Store, StoreStatus};
use crate::error::CatalogError;
use crate::util::hash::Digest;

const STORE_COLUMNS: &str = "id, identity, label, path, is_default, total_files, used_space";
const RECORD_COLUMNS: &str = "id, store_id, source_path, hash, extension, mime_id, size, imported_at";
const MIME_COLUMNS: &str = "id, label, type, extension, viewer";

fn store_from_row(row: &Row<'_>) -> rusqlite::Result<Store> {
    Ok(Store {
        id: row.get(0)?,
        identity: row.get(1)?,
        label: row.get(2)?,
        path: row.get(3)?,
        is_default: row.get(4)?,
        total_files: row.get(5)?,
        used_space: row.get(6)?,
        status: StoreStatus::default(),
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let imported_at: i64 = row.get(7)?;
    Ok(Record {
        id: row.get(0)?,
        store_id: row.get(1)?,
        store: None,
        source_path: row.get(2)?,
        hash: row.get(3)?,
        extension: row.get(4)?,
        mime_id: row.get(5)?,
        size: row.get(6)?,
        imported_at: DateTime::<Utc>::from_timestamp(imported_at, 0).unwrap_or_default(),
    })
}

fn mime_from_row(row: &Row<'_>) -> rusqlite::Result<Mime> {
    Ok(Mime {
        id: row.get(0)?,
        label: row.get(1)?,
        mime_type: row.get(2)?,
        extension: row.get(3)?,
        viewer: row.get(4)?,
    })
}

impl Catalog {
    // ========== Stores ==========

    /// All stores ordered by id.
    pub fn stores(&self) -> Result<Vec<Store>, CatalogError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {STORE_COLUMNS} FROM stores ORDER BY id"))?;
            let rows = stmt.query_map([], store_from_row)?;
            rows.collect()
        })
    }

    pub fn store(&self, id: i64) -> Result<Option<Store>, CatalogError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = ?1"),
                [id],
                store_from_row,
            )
            .optional()
        })
    }

    /// Count stores with this label, ignoring the store `except`.
    pub fn count_stores_with_label(&self, label: &str, except: Option<i64>) -> Result<u64, CatalogError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM stores WHERE label = ?1 AND id != ?2",
                params![label, except.unwrap_or(0)],
                |row| row.get(0),
            )
        })
    }

    /// Count stores registered under this exact path, ignoring the store `except`.
    pub fn count_stores_with_path(&self, path: &str, except: Option<i64>) -> Result<u64, CatalogError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM stores WHERE path = ?1 AND id != ?2",
                params![path, except.unwrap_or(0)],
                |row| row.get(0),
            )
        })
    }

    pub fn count_default_stores(&self) -> Result<u64, CatalogError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM stores WHERE is_default = 1", [], |row| row.get(0))
        })
    }

    /// Insert a new store and assign its id.
    ///
    /// When `store.is_default` is set, the default flag is cleared on every
    /// other store in the same write batch.
    pub fn insert_store(&self, store: &mut Store) -> Result<(), CatalogError> {
        let id = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            if store.is_default {
                tx.execute("UPDATE stores SET is_default = 0 WHERE is_default = 1", [])?;
            }
            tx.execute(
                "INSERT INTO stores (identity, label, path, is_default, total_files, used_space)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    store.identity,
                    store.label,
                    store.path,
                    store.is_default,
                    store.total_files,
                    store.used_space,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })?;
        store.id = id;
        Ok(())
    }

    /// Persist a store's label and path.
    pub fn update_store_location(&self, id: i64, label: &str, path: &str) -> Result<(), CatalogError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE stores SET label = ?1, path = ?2 WHERE id = ?3",
                params![label, path, id],
            )
            .map(|_| ())
        })
    }

    /// Make `id` the only default store, as a single multi-row write.
    pub fn set_default_store(&self, id: i64) -> Result<(), CatalogError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE stores SET is_default = CASE WHEN id = ?1 THEN 1 ELSE 0 END
                 WHERE is_default = 1 OR id = ?1",
                [id],
            )
            .map(|_| ())
        })
    }

    /// Add to a store's counters and return the new `(total_files, used_space)`.
    pub fn increment_store_counters(&self, id: i64, files: u64, bytes: u64) -> Result<(u64, u64), CatalogError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE stores SET total_files = total_files + ?1, used_space = used_space + ?2 WHERE id = ?3",
                params![files, bytes, id],
            )?;
            conn.query_row(
                "SELECT total_files, used_space FROM stores WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
        })
    }

    pub fn set_store_counters(&self, id: i64, files: u64, bytes: u64) -> Result<(), CatalogError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE stores SET total_files = ?1, used_space = ?2 WHERE id = ?3",
                params![files, bytes, id],
            )
            .map(|_| ())
        })
    }

    pub fn delete_store_row(&self, id: i64) -> Result<(), CatalogError> {
        self.with_conn(|conn| conn.execute("DELETE FROM stores WHERE id = ?1", [id]).map(|_| ()))
    }

    // ========== Records ==========

    /// Insert a record and assign its id.
    pub fn insert_record(&self, record: &mut Record) -> Result<(), CatalogError> {
        record.id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (store_id, source_path, hash, extension, mime_id, size, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.store_id,
                    record.source_path,
                    record.hash,
                    record.extension,
                    record.mime_id,
                    record.size,
                    record.imported_at.timestamp(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(())
    }

    pub fn records_for_store(&self, store_id: i64) -> Result<Vec<Record>, CatalogError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM records WHERE store_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map([store_id], record_from_row)?;
            rows.collect()
        })
    }

    pub fn records_with_hash(&self, hash: &Digest) -> Result<Vec<Record>, CatalogError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM records WHERE hash = ?1 ORDER BY id"))?;
            let rows = stmt.query_map([hash], record_from_row)?;
            rows.collect()
        })
    }

    /// Load a record together with its owning store.
    pub fn record_with_store(&self, id: i64) -> Result<Option<Record>, CatalogError> {
        let Some(mut record) = self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                [id],
                record_from_row,
            )
            .optional()
        })?
        else {
            return Ok(None);
        };

        record.store = self.store(record.store_id)?;
        Ok(Some(record))
    }

    /// `(count, total bytes)` of the records owned by a store.
    pub fn record_totals(&self, store_id: i64) -> Result<(u64, u64), CatalogError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM records WHERE store_id = ?1",
                [store_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
        })
    }

    // ========== Mimes ==========

    /// Look up a mime by extension (with separator), ignoring case.
    pub fn mime_by_extension(&self, extension: &str) -> Result<Option<Mime>, CatalogError> {
        let extension = extension.to_lowercase();
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {MIME_COLUMNS} FROM mimes WHERE extension = ?1 ORDER BY id LIMIT 1"),
                [extension],
                mime_from_row,
            )
            .optional()
        })
    }

    pub fn count_mimes(&self) -> Result<u64, CatalogError> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM mimes", [], |row| row.get(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let catalog = Catalog::new();
        catalog.create(&path).unwrap();
        catalog.open(&path).unwrap();
        (dir, catalog)
    }

    fn store(label: &str, is_default: bool) -> Store {
        Store {
            id: 0,
            identity: format!("id-{label}"),
            label: label.to_string(),
            path: format!("/stores/{label}"),
            is_default,
            total_files: 0,
            used_space: 0,
            status: StoreStatus::Ok,
        }
    }

    #[test]
    fn default_flag_moves_in_one_write() {
        let (_dir, catalog) = open_catalog();
        let mut a = store("a", true);
        let mut b = store("b", false);
        catalog.insert_store(&mut a).unwrap();
        catalog.insert_store(&mut b).unwrap();
        assert_eq!(catalog.count_default_stores().unwrap(), 1);

        catalog.set_default_store(b.id).unwrap();
        let stores = catalog.stores().unwrap();
        assert!(!stores[0].is_default);
        assert!(stores[1].is_default);

        // Inserting a new default clears the old one
        let mut c = store("c", true);
        catalog.insert_store(&mut c).unwrap();
        assert_eq!(catalog.count_default_stores().unwrap(), 1);
        assert!(catalog.store(c.id).unwrap().unwrap().is_default);
    }

    #[test]
    fn uniqueness_counts_skip_excluded_store() {
        let (_dir, catalog) = open_catalog();
        let mut a = store("a", false);
        catalog.insert_store(&mut a).unwrap();

        assert_eq!(catalog.count_stores_with_label("a", None).unwrap(), 1);
        assert_eq!(catalog.count_stores_with_label("a", Some(a.id)).unwrap(), 0);
        assert_eq!(catalog.count_stores_with_path("/stores/a", None).unwrap(), 1);
        assert_eq!(catalog.count_stores_with_path("/stores/b", None).unwrap(), 0);
    }

    #[test]
    fn counters_and_record_join() {
        let (_dir, catalog) = open_catalog();
        let mut a = store("a", false);
        catalog.insert_store(&mut a).unwrap();
        let mime = catalog.mime_by_extension(".PNG").unwrap().unwrap();
        assert_eq!(mime.mime_type, "image/png");

        let hash = Digest::from_hex(&"ab".repeat(32)).unwrap();
        let mut record = Record {
            id: 0,
            store_id: a.id,
            store: None,
            source_path: "/tmp/a.png".into(),
            hash: hash.clone(),
            extension: ".png".into(),
            mime_id: mime.id,
            size: 10,
            imported_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        catalog.insert_record(&mut record).unwrap();
        assert!(record.id > 0);

        assert_eq!(catalog.increment_store_counters(a.id, 1, 10).unwrap(), (1, 10));
        assert_eq!(catalog.record_totals(a.id).unwrap(), (1, 10));
        assert_eq!(catalog.records_with_hash(&hash).unwrap().len(), 1);

        let loaded = catalog.record_with_store(record.id).unwrap().unwrap();
        assert_eq!(loaded.store.as_ref().map(|s| s.id), Some(a.id));
        assert_eq!(loaded.imported_at, record.imported_at);
        assert!(catalog.record_with_store(record.id + 1).unwrap().is_none());
    }

    #[test]
    fn unknown_extension_has_no_mime() {
        let (_dir, catalog) = open_catalog();
        assert!(catalog.mime_by_extension(".txt").unwrap().is_none());
        assert!(catalog.mime_by_extension("").unwrap().is_none());
    }
}
