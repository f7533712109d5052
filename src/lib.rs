//! Media warehouse
//!
//! Imports media files into content-addressed stores. Every file is named by
//! the SHA-256 of its bytes, so identical content is kept once per store,
//! while a SQLite catalog tracks stores, records and known mime types.

pub mod batch;
pub mod config;
pub mod error;
pub mod state;
pub mod util;
pub mod warehouse;

pub use batch::{Batch, BatchController, Progress};
pub use config::Config;
pub use state::{Catalog, ConnectionState, ImportItem, Mime, Record, Store, StoreStatus};
pub use util::hash::Digest;
pub use warehouse::Warehouse;
