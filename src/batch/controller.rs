//! Batch controller: one cancellable, pausable batch at a time.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::pause::PauseGate;
use crate::error::BatchError;

/// Progress of the running batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still enumerating folders; the total isn't known yet.
    Discovering { found: usize },
    /// `completed` of `total` units are done.
    Unit { completed: usize, total: usize },
}

/// What a batch run got through.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// One result per unit that ran, in submission order
    pub results: Vec<R>,
    pub total: usize,
    /// The batch was cancelled before every unit ran
    pub cancelled: bool,
}

impl<R> BatchOutcome<R> {
    pub fn completed(&self) -> usize {
        self.results.len()
    }
}

/// Hands out batches and lets another task pause, resume or cancel them.
#[derive(Debug, Default)]
pub struct BatchController {
    gate: PauseGate,
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl BatchController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new batch with a fresh cancellation token.
    pub fn begin(&self) -> Result<Batch, BatchError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(BatchError::Busy);
        }

        let token = CancellationToken::new();
        *active = Some(token.clone());
        debug!("Batch started");

        Ok(Batch {
            token,
            gate: self.gate.clone(),
            slot: Arc::clone(&self.active),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn pause(&self) {
        debug!("Batch paused");
        self.gate.pause();
    }

    pub fn resume(&self) {
        debug!("Batch resumed");
        self.gate.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Cancel the active batch. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(token) => {
                debug!("Batch cancelled");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// A running batch. Dropping it frees the controller and unpauses the gate.
#[derive(Debug)]
pub struct Batch {
    token: CancellationToken,
    gate: PauseGate,
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl Batch {
    /// The token handed to long-running units, e.g. hashing.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait out a pause, then report whether the batch may go on.
    async fn checkpoint(&self) -> bool {
        self.gate.wait_while_paused(&self.token).await;
        !self.token.is_cancelled()
    }

    /// Expand `roots` into the files to process.
    ///
    /// Files pass through as given; folders are walked recursively in file
    /// name order. Stops early when cancelled.
    pub async fn discover(&self, roots: &[PathBuf], mut progress: impl FnMut(Progress)) -> Vec<PathBuf> {
        let mut found = Vec::new();

        for root in roots {
            if !self.checkpoint().await {
                break;
            }

            if root.is_dir() {
                let folder = root.clone();
                let token = self.token.clone();
                match tokio::task::spawn_blocking(move || walk_folder(&folder, &token)).await {
                    Ok(files) => found.extend(files),
                    Err(e) => warn!(root = %root.display(), error = %e, "Folder enumeration failed"),
                }
            } else {
                found.push(root.clone());
            }

            progress(Progress::Discovering { found: found.len() });
        }

        debug!(found = found.len(), "Discovery finished");
        found
    }

    /// Run `unit` over `items` one at a time, in order.
    ///
    /// Before each unit the pause gate is honoured and cancellation is
    /// checked. A unit already running is never interrupted here.
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        mut unit: F,
        mut progress: impl FnMut(Progress),
    ) -> BatchOutcome<R>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let total = items.len();
        let mut results = Vec::with_capacity(total);

        for item in items {
            if !self.checkpoint().await {
                debug!(completed = results.len(), total, "Batch stopped by cancellation");
                return BatchOutcome {
                    results,
                    total,
                    cancelled: true,
                };
            }

            results.push(unit(item).await);
            progress(Progress::Unit {
                completed: results.len(),
                total,
            });
        }

        BatchOutcome {
            results,
            total,
            cancelled: false,
        }
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.slot.lock().take();
        self.gate.resume();
        debug!("Batch finished");
    }
}

fn walk_folder(root: &Path, cancel: &CancellationToken) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        if cancel.is_cancelled() {
            break;
        }

        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Skipping unreadable entry"),
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    #[test]
    fn only_one_batch_at_a_time() {
        let controller = BatchController::new();
        let first = controller.begin().unwrap();
        assert!(controller.is_busy());
        assert_eq!(controller.begin().unwrap_err(), BatchError::Busy);

        drop(first);
        assert!(!controller.is_busy());
        assert!(!controller.cancel());
        let second = controller.begin().unwrap();
        assert!(!second.is_cancelled());
    }

    #[test]
    fn ending_a_batch_unpauses() {
        let controller = BatchController::new();
        let batch = controller.begin().unwrap();
        controller.pause();
        drop(batch);
        assert!(!controller.is_paused());
    }

    #[test]
    fn cancellation_does_not_leak_into_the_next_batch() {
        let controller = BatchController::new();
        let first = controller.begin().unwrap();
        assert!(controller.cancel());
        assert!(first.is_cancelled());
        drop(first);

        let second = controller.begin().unwrap();
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn runs_units_in_order_with_progress() {
        let controller = BatchController::new();
        let batch = controller.begin().unwrap();
        let mut reports = Vec::new();

        let outcome = batch
            .run(vec![3, 1, 2], |n| async move { n * 10 }, |p| reports.push(p))
            .await;

        assert_eq!(outcome.results, vec![30, 10, 20]);
        assert_eq!(outcome.completed(), 3);
        assert!(!outcome.cancelled);
        assert_eq!(
            reports,
            vec![
                Progress::Unit { completed: 1, total: 3 },
                Progress::Unit { completed: 2, total: 3 },
                Progress::Unit { completed: 3, total: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn pause_then_cancel_stops_between_units() {
        let controller = Arc::new(BatchController::new());
        let batch = controller.begin().unwrap();
        let started = Arc::new(Mutex::new(Vec::new()));
        let release = Arc::new(Notify::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = {
            let controller = Arc::clone(&controller);
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                let unit = move |n: u32| {
                    let controller = Arc::clone(&controller);
                    let started = Arc::clone(&started);
                    let release = Arc::clone(&release);
                    async move {
                        started.lock().push(n);
                        if n == 2 {
                            controller.pause();
                        }
                        if n == 3 {
                            release.notified().await;
                        }
                        n
                    }
                };
                batch
                    .run(vec![1, 2, 3, 4, 5], unit, move |p| {
                        let _ = tx.send(p);
                    })
                    .await
            })
        };

        // Unit 2 pauses the batch as it finishes
        loop {
            match rx.recv().await {
                Some(Progress::Unit { completed: 2, .. }) => break,
                Some(_) => {}
                None => panic!("batch ended early"),
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*started.lock(), vec![1, 2]);
        assert!(controller.is_paused());

        controller.resume();
        while !started.lock().contains(&3) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        controller.cancel();
        release.notify_one();

        let outcome = handle.await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.results, vec![1, 2, 3]);
        assert_eq!(outcome.total, 5);
        assert_eq!(*started.lock(), vec![1, 2, 3]);
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn cancelled_batch_runs_nothing() {
        let controller = BatchController::new();
        let batch = controller.begin().unwrap();
        controller.cancel();

        let outcome = batch.run(vec![1, 2], |n| async move { n }, |_| {}).await;
        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn discovers_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("album").join("2024");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("album").join("b.jpg"), b"b").unwrap();
        fs::write(nested.join("a.jpg"), b"a").unwrap();
        let loose = dir.path().join("loose.png");
        fs::write(&loose, b"l").unwrap();

        let controller = BatchController::new();
        let batch = controller.begin().unwrap();
        let mut reports = Vec::new();
        let found = batch
            .discover(&[dir.path().join("album"), loose.clone()], |p| reports.push(p))
            .await;

        assert_eq!(found, vec![nested.join("a.jpg"), dir.path().join("album").join("b.jpg"), loose]);
        assert_eq!(
            reports,
            vec![Progress::Discovering { found: 2 }, Progress::Discovering { found: 3 }]
        );
    }
}
