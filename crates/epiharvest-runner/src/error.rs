//! Error type for `epiharvest-runner`.
//!
//! Producers report failures as [`anyhow::Error`]; this enum covers the
//! fallible pieces the binary needs before any producer runs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error(transparent)]
  Core(#[from] epiharvest_core::Error),

  #[error(transparent)]
  Sqlite(#[from] epiharvest_store_sqlite::Error),

  #[error(transparent)]
  Csv(#[from] epiharvest_store_csv::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
