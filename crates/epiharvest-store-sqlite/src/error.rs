//! Error type for `epiharvest-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] epiharvest_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A stored value could not be mapped back onto the column whitelist.
  #[error("cannot decode {table}.{column}: {reason}")]
  Decode {
    table:  &'static str,
    column: String,
    reason: String,
  },

  #[error("{operation} failed after {attempts} attempts: {source}")]
  RetriesExhausted {
    operation: &'static str,
    attempts:  u32,
    #[source]
    source:    tokio_rusqlite::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
