/// Batch module
///
/// Runs multi-file work off the caller's task while it stays free to
/// pause, resume or cancel:
/// - The pause gate shared by a controller and its batches (pause.rs)
/// - One-batch-at-a-time controller, discovery and ordered runs (controller.rs)
/// - Bulk staging (parse) and bulk commit into a store (jobs.rs)
pub mod controller;
pub mod jobs;
pub mod pause;

pub use controller::{Batch, BatchController, BatchOutcome, Progress};
pub use jobs::{commit_all, stage, Staged};
pub use pause::PauseGate;
