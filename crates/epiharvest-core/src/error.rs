//! Error types for `epiharvest-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A column needed to form the natural key was absent or blank.
  #[error("{table}: missing natural-key field {field:?}")]
  MissingKeyField {
    table: &'static str,
    field: &'static str,
  },

  #[error("invalid date {0:?}; expected YYYY-MM-DD")]
  InvalidDate(String),

  #[error("{table}.{column}: expected {expected}")]
  InvalidField {
    table:    &'static str,
    column:   String,
    expected: &'static str,
  },

  #[error("unknown table: {0:?}")]
  UnknownTable(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
