//! Runtime configuration, read from an optional TOML file and `EPIHARVEST_*`
//! environment variables.
//!
//! ```toml
//! mapping_dir = "mappings"
//! sliding_window_days = 14
//!
//! [backend]
//! kind = "relational"
//! path = "epiharvest.db"
//!
//! [[feeds]]
//! source = "GBR_PHE"
//! table = "epidemiology"
//! location = "https://example.org/phe.csv"
//! mapping = "GBR_PHE.csv"
//! ```

use std::{path::PathBuf, time::Duration};

use epiharvest_core::fact::Table;
use epiharvest_store_sqlite::RetryPolicy;
use serde::Deserialize;

use crate::{Result, runner::RunSettings};

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
  #[serde(default = "default_mapping_dir")]
  pub mapping_dir:         PathBuf,
  #[serde(default)]
  pub sliding_window_days: Option<u32>,
  #[serde(default)]
  pub validate:            bool,
  #[serde(default)]
  pub backend:             BackendConfig,
  #[serde(default)]
  pub feeds:               Vec<FeedConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
  /// SQLite with merge-on-conflict and reconnecting retries.
  Relational {
    #[serde(default = "default_db_path")]
    path:             PathBuf,
    #[serde(default = "default_retry_attempts")]
    retry_attempts:   u32,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
  },
  /// SQLite with replace-on-conflict.
  Embedded {
    #[serde(default = "default_db_path")]
    path: PathBuf,
  },
  /// One CSV file per table and source.
  File {
    #[serde(default = "default_data_dir")]
    dir: PathBuf,
  },
}

impl Default for BackendConfig {
  fn default() -> Self {
    BackendConfig::Relational {
      path:             default_db_path(),
      retry_attempts:   default_retry_attempts(),
      retry_delay_secs: default_retry_delay_secs(),
    }
  }
}

impl BackendConfig {
  pub fn retry_policy(&self) -> Option<RetryPolicy> {
    match self {
      BackendConfig::Relational { retry_attempts, retry_delay_secs, .. } => Some(RetryPolicy {
        attempts: *retry_attempts,
        delay:    Duration::from_secs(*retry_delay_secs),
      }),
      _ => None,
    }
  }
}

/// One generic CSV feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedConfig {
  pub source:   String,
  pub table:    Table,
  /// Local path or `http(s)://` URL.
  pub location: String,
  #[serde(default)]
  pub mapping:  Option<PathBuf>,
  #[serde(default = "default_enabled")]
  pub enabled:  bool,
}

fn default_mapping_dir() -> PathBuf { PathBuf::from("mappings") }
fn default_db_path() -> PathBuf { PathBuf::from("epiharvest.db") }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_retry_attempts() -> u32 { RetryPolicy::default().attempts }
fn default_retry_delay_secs() -> u64 { RetryPolicy::default().delay.as_secs() }
fn default_enabled() -> bool { true }

impl HarvestConfig {
  /// Read `path` (if it exists) layered under `EPIHARVEST_*` variables.
  /// Nested keys use `__`, e.g. `EPIHARVEST_BACKEND__KIND=file`.
  pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.into()).required(false))
      .add_source(environment())
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  /// Parse a TOML document, without consulting the environment.
  pub fn from_toml(text: &str) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(text, config::FileFormat::Toml))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn run_settings(&self) -> RunSettings {
    RunSettings {
      mapping_dir: self.mapping_dir.clone(),
      window_days: self.sliding_window_days,
      validate:    self.validate,
      today:       None,
    }
  }
}

fn environment() -> config::Environment {
  config::Environment::with_prefix("EPIHARVEST")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
}
