//! Error type for `epiharvest-resolve`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to read mapping file {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed mapping file {origin}: {source}")]
  Csv {
    origin: String,
    #[source]
    source: csv::Error,
  },

  #[error("mapping file {origin} has no {column:?} column")]
  MissingColumn { origin: String, column: &'static str },

  /// A mapping row matched but carries no geocode: an authoring gap in the
  /// mapping file rather than an ordinary miss.
  #[error("mapping for {country_code}/{region} has no geocode")]
  MissingGeocode { country_code: String, region: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
