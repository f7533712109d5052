//! Bulk parse and bulk commit on top of a batch.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::controller::{Batch, BatchOutcome, Progress};
use crate::error::{CommitError, ParseError};
use crate::state::{ImportItem, Record, Store};
use crate::warehouse::Warehouse;

/// Files that parsed, and the ones that were skipped with the reason.
#[derive(Debug)]
pub struct Staged {
    pub items: Vec<ImportItem>,
    pub skipped: Vec<(PathBuf, ParseError)>,
    pub cancelled: bool,
}

/// Discover every file under `roots` and parse each one once.
pub async fn stage(
    warehouse: &Warehouse,
    batch: &Batch,
    roots: &[PathBuf],
    mut progress: impl FnMut(Progress),
) -> Staged {
    let discovered = batch.discover(roots, &mut progress).await;

    // Same path twice is staged once
    let mut seen = HashSet::new();
    let paths: Vec<PathBuf> = discovered
        .into_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect();

    let outcome = batch
        .run(
            paths,
            |path| {
                let warehouse = warehouse.clone();
                async move {
                    let result = {
                        let path = path.clone();
                        tokio::task::spawn_blocking(move || warehouse.parse(&path))
                            .await
                            .unwrap_or_else(|e| Err(join_failure(e).into()))
                    };
                    (path, result)
                }
            },
            &mut progress,
        )
        .await;

    let mut staged = Staged {
        items: Vec::new(),
        skipped: Vec::new(),
        cancelled: outcome.cancelled,
    };
    for (path, result) in outcome.results {
        match result {
            Ok(item) => staged.items.push(item),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping file");
                staged.skipped.push((path, e));
            }
        }
    }

    debug!(
        staged = staged.items.len(),
        skipped = staged.skipped.len(),
        cancelled = staged.cancelled,
        "Staging finished"
    );
    staged
}

/// Commit `items` into `store` in order. `store` ends with fresh counters.
pub async fn commit_all(
    warehouse: &Warehouse,
    batch: &Batch,
    store: &mut Store,
    items: Vec<ImportItem>,
    progress: impl FnMut(Progress),
) -> BatchOutcome<Result<Record, CommitError>> {
    let outcome = batch
        .run(
            items,
            |item| {
                let warehouse = warehouse.clone();
                let mut target = store.clone();
                let token = batch.token().clone();
                async move {
                    tokio::task::spawn_blocking(move || warehouse.commit(&mut target, &item, &token))
                        .await
                        .unwrap_or_else(|e| Err(join_failure(e).into()))
                }
            },
            progress,
        )
        .await;

    match warehouse.catalog().store(store.id) {
        Ok(Some(fresh)) => {
            store.total_files = fresh.total_files;
            store.used_space = fresh.used_space;
        }
        Ok(None) => warn!(id = store.id, "Store vanished during import"),
        Err(e) => warn!(id = store.id, error = %e, "Failed to refresh store counters"),
    }

    let imported = outcome.results.iter().filter(|r| r.is_ok()).count();
    info!(
        store = %store.label,
        imported,
        failed = outcome.completed() - imported,
        cancelled = outcome.cancelled,
        "Import finished"
    );
    outcome
}

fn join_failure(e: JoinError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchController;
    use crate::warehouse::testing::warehouse;
    use std::fs;

    #[tokio::test]
    async fn stages_supported_files_once() {
        let (dir, warehouse) = warehouse();
        let folder = dir.path().join("incoming");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("a.png"), b"a").unwrap();
        fs::write(folder.join("b.mp3"), b"b").unwrap();
        fs::write(folder.join("notes.txt"), b"n").unwrap();

        let controller = BatchController::new();
        let batch = controller.begin().unwrap();
        let roots = vec![folder.clone(), folder.join("a.png")];
        let staged = stage(&warehouse, &batch, &roots, |_| {}).await;

        let paths: Vec<_> = staged.items.iter().map(|i| i.path.clone()).collect();
        assert_eq!(paths, vec![folder.join("a.png"), folder.join("b.mp3")]);
        assert_eq!(staged.skipped.len(), 1);
        assert!(matches!(staged.skipped[0].1, ParseError::UnknownMime(_)));
        assert!(!staged.cancelled);
    }

    #[tokio::test]
    async fn commits_everything_and_refreshes_counters() {
        let (dir, warehouse) = warehouse();
        let mut store = warehouse.create_store("pics", "pics", true).unwrap();
        let folder = dir.path().join("incoming");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("a.png"), b"aaaa").unwrap();
        fs::write(folder.join("b.jpg"), b"bb").unwrap();

        let controller = BatchController::new();
        let batch = controller.begin().unwrap();
        let staged = stage(&warehouse, &batch, &[folder], |_| {}).await;
        let mut reports = Vec::new();
        let outcome = commit_all(&warehouse, &batch, &mut store, staged.items, |p| reports.push(p)).await;

        assert_eq!(outcome.completed(), 2);
        assert!(outcome.results.iter().all(|r| r.is_ok()));
        assert_eq!((store.total_files, store.used_space), (2, 6));
        assert_eq!(reports.last(), Some(&Progress::Unit { completed: 2, total: 2 }));
        assert_eq!(warehouse.catalog().records_for_store(store.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_import_commits_nothing() {
        let (dir, warehouse) = warehouse();
        let mut store = warehouse.create_store("pics", "pics", true).unwrap();
        let file = dir.path().join("a.png");
        fs::write(&file, b"aaaa").unwrap();
        let item = warehouse.parse(&file).unwrap();

        let controller = BatchController::new();
        let batch = controller.begin().unwrap();
        controller.cancel();
        let outcome = commit_all(&warehouse, &batch, &mut store, vec![item], |_| {}).await;

        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
        assert!(store.is_empty());
    }
}
