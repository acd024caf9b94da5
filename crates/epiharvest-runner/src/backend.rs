//! [`AnyStore`] — the backend chosen by configuration.

use epiharvest_core::{
  fact::{Destination, FactRecord},
  region::{AdmDivision, RegionQuery},
  store::{ConflictPolicy, FactStore},
};
use epiharvest_store_csv::CsvStore;
use epiharvest_store_sqlite::{EmbeddedStore, RelationalStore};

use crate::{BackendConfig, Error, Result};

pub enum AnyStore {
  Relational(RelationalStore),
  Embedded(EmbeddedStore),
  File(CsvStore),
}

impl AnyStore {
  pub async fn open(config: &BackendConfig) -> Result<Self> {
    let store = match config {
      BackendConfig::Relational { path, .. } => {
        let retry = config.retry_policy().unwrap_or_default();
        AnyStore::Relational(RelationalStore::open(path, retry).await?)
      }
      BackendConfig::Embedded { path } => AnyStore::Embedded(EmbeddedStore::open(path).await?),
      BackendConfig::File { dir } => AnyStore::File(CsvStore::open(dir)?),
    };
    tracing::info!(backend = store.kind(), policy = ?store.conflict_policy(), "opened store");
    Ok(store)
  }

  pub fn kind(&self) -> &'static str {
    match self {
      AnyStore::Relational(_) => "relational",
      AnyStore::Embedded(_) => "embedded",
      AnyStore::File(_) => "file",
    }
  }
}

impl FactStore for AnyStore {
  type Error = Error;

  fn conflict_policy(&self) -> ConflictPolicy {
    match self {
      AnyStore::Relational(s) => s.conflict_policy(),
      AnyStore::Embedded(s) => s.conflict_policy(),
      AnyStore::File(s) => s.conflict_policy(),
    }
  }

  async fn upsert(&self, destination: Destination, record: &FactRecord) -> Result<()> {
    match self {
      AnyStore::Relational(s) => Ok(s.upsert(destination, record).await?),
      AnyStore::Embedded(s) => Ok(s.upsert(destination, record).await?),
      AnyStore::File(s) => Ok(s.upsert(destination, record).await?),
    }
  }

  async fn flush(&self) -> Result<()> {
    match self {
      AnyStore::Relational(s) => Ok(s.flush().await?),
      AnyStore::Embedded(s) => Ok(s.flush().await?),
      AnyStore::File(s) => Ok(s.flush().await?),
    }
  }

  async fn lookup_adm_division(&self, query: &RegionQuery) -> Result<Option<AdmDivision>> {
    match self {
      AnyStore::Relational(s) => Ok(s.lookup_adm_division(query).await?),
      AnyStore::Embedded(s) => Ok(s.lookup_adm_division(query).await?),
      AnyStore::File(s) => Ok(s.lookup_adm_division(query).await?),
    }
  }

  async fn load_adm_divisions(&self, divisions: Vec<AdmDivision>) -> Result<()> {
    match self {
      AnyStore::Relational(s) => Ok(s.load_adm_divisions(divisions).await?),
      AnyStore::Embedded(s) => Ok(s.load_adm_divisions(divisions).await?),
      AnyStore::File(s) => Ok(s.load_adm_divisions(divisions).await?),
    }
  }

  async fn rows(&self, destination: Destination, source: &str) -> Result<Vec<FactRecord>> {
    match self {
      AnyStore::Relational(s) => Ok(s.rows(destination, source).await?),
      AnyStore::Embedded(s) => Ok(s.rows(destination, source).await?),
      AnyStore::File(s) => Ok(s.rows(destination, source).await?),
    }
  }
}
