//! Flat-file backend for epiharvest.
//!
//! Persists one CSV file per (table, source) pair at
//! `<dir>/<table>/<source>.csv`. Rows for the current pair are buffered in
//! memory and the file is rewritten in full on flush.

mod encode;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::CsvStore;
