//! SQLite backends for epiharvest.
//!
//! Two backends share one schema and differ in conflict handling:
//!
//! - [`RelationalStore`] merges the fields present in a new record into the
//!   existing row, and retries transient failures with a fresh connection.
//! - [`EmbeddedStore`] replaces the existing row wholesale.
//!
//! Both wrap [`tokio_rusqlite`] so database access runs on a dedicated thread
//! without blocking the async runtime.

mod embedded;
mod encode;
mod relational;
mod schema;
mod statement;

pub mod error;
pub mod retry;

pub use embedded::EmbeddedStore;
pub use error::{Error, Result};
pub use relational::RelationalStore;
pub use retry::RetryPolicy;

#[cfg(test)]
mod tests;
