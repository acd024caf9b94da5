//! Error type for `epiharvest-store-csv`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] epiharvest_core::Error),

  #[error("i/o error on {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("csv error in {path:?}: {source}")]
  Csv {
    path:   PathBuf,
    #[source]
    source: csv::Error,
  },

  #[error("{path:?} line {line}: cannot parse {column} from {value:?}")]
  Decode {
    path:   PathBuf,
    line:   u64,
    column: String,
    value:  String,
  },

  #[error("source tag {0:?} is not usable as a file name")]
  InvalidSource(String),

  #[error("store state lock poisoned")]
  Poisoned,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
