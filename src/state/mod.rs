/// State management module
///
/// This module handles all catalog state, including:
/// - Database lifecycle and schema (catalog.rs)
/// - Table-scoped queries over stores, records and mimes (queries.rs)
/// - Shared data structures (data.rs)
/// - The built-in mime table used to seed new catalogs (mimes.rs)
pub mod catalog;
pub mod data;
pub mod mimes;
pub mod queries;

pub use catalog::{Catalog, ConnectionState};
pub use data::{ImportItem, Mime, Record, Store, StoreStatus};
