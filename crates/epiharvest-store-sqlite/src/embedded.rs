//! [`EmbeddedStore`] — the replace-on-conflict SQLite backend.

use std::path::Path;

use epiharvest_core::{
  fact::{Destination, FactRecord},
  region::{AdmDivision, RegionQuery, non_blank, unique_match},
  store::{ConflictPolicy, FactStore},
};

use crate::{
  Result,
  encode::{RawDivision, RawRow},
  schema::schema,
  statement::{self, Statement},
};

/// A fact store backed by a single local SQLite file.
///
/// A conflicting upsert replaces the stored row wholesale. Cloning is cheap —
/// the inner connection is reference-counted.
#[derive(Clone)]
pub struct EmbeddedStore {
  conn: tokio_rusqlite::Connection,
}

impl EmbeddedStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let sql = schema();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl FactStore for EmbeddedStore {
  type Error = crate::Error;

  fn conflict_policy(&self) -> ConflictPolicy { ConflictPolicy::Replace }

  async fn upsert(&self, destination: Destination, record: &FactRecord) -> Result<()> {
    let statement = Statement::upsert(destination, record, ConflictPolicy::Replace)?;
    self
      .conn
      .call(move |conn| {
        statement.execute(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn flush(&self) -> Result<()> { Ok(()) }

  async fn lookup_adm_division(&self, query: &RegionQuery) -> Result<Option<AdmDivision>> {
    let Some(code) = non_blank(query.country_code.as_deref()) else {
      return Ok(None);
    };
    let raws = self
      .conn
      .call(move |conn| Ok(statement::select_divisions(conn, &code)?))
      .await?;

    let divisions = raws
      .into_iter()
      .map(RawDivision::into_division)
      .collect::<Result<Vec<_>>>()?;
    Ok(unique_match(&divisions, query).cloned())
  }

  async fn load_adm_divisions(&self, divisions: Vec<AdmDivision>) -> Result<()> {
    let raws = divisions
      .iter()
      .map(RawDivision::from_division)
      .collect::<Result<Vec<_>>>()?;
    self
      .conn
      .call(move |conn| Ok(statement::insert_divisions(conn, &raws)?))
      .await?;
    Ok(())
  }

  async fn rows(&self, destination: Destination, source: &str) -> Result<Vec<FactRecord>> {
    let source = source.to_owned();
    let raws = self
      .conn
      .call(move |conn| Ok(statement::select_rows(conn, destination, &source)?))
      .await?;

    raws.into_iter().map(|r: RawRow| r.into_record(destination)).collect()
  }
}
