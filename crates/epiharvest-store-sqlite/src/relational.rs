//! [`RelationalStore`] — the merge-on-conflict backend with reconnecting
//! retries.

use std::path::{Path, PathBuf};

use epiharvest_core::{
  fact::{Destination, FactRecord},
  region::{AdmDivision, RegionQuery, non_blank, unique_match},
  store::{ConflictPolicy, FactStore},
};
use tokio::sync::Mutex;

use crate::{
  Error, Result,
  encode::{RawDivision, RawRow},
  retry::{RetryPolicy, is_transient},
  schema::schema,
  statement::{self, Statement},
};

/// A fact store that merges new fields into existing rows.
///
/// Owns exactly one live connection. A transient failure replaces it with a
/// freshly opened one before the next attempt, since the failed connection
/// may be left unusable.
pub struct RelationalStore {
  path:  PathBuf,
  retry: RetryPolicy,
  pub(crate) conn: Mutex<tokio_rusqlite::Connection>,
}

impl RelationalStore {
  /// Open (or create) the database at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, retry: RetryPolicy) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let conn = connect(&path).await?;
    Ok(Self { path, retry, conn: Mutex::new(conn) })
  }

  /// Run `function` on the connection thread, retrying transient failures.
  async fn call<F, R>(&self, operation: &'static str, function: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Clone + Send + 'static,
    R: Send + 'static,
  {
    let attempts = self.retry.max_attempts();
    let mut last = tokio_rusqlite::Error::ConnectionClosed;

    for attempt in 1..=attempts {
      if attempt > 1 {
        tokio::time::sleep(self.retry.delay).await;
        match connect(&self.path).await {
          Ok(fresh) => *self.conn.lock().await = fresh,
          Err(e) => {
            tracing::warn!(operation, attempt, error = %e, "reconnect failed");
            last = e;
            continue;
          }
        }
      }

      let conn = self.conn.lock().await.clone();
      match conn.call(function.clone()).await {
        Ok(value) => return Ok(value),
        Err(e) if is_transient(&e) => {
          tracing::warn!(operation, attempt, attempts, error = %e, "transient database failure");
          last = e;
        }
        Err(e) => return Err(Error::Database(e)),
      }
    }

    Err(Error::RetriesExhausted { operation, attempts, source: last })
  }
}

async fn connect(path: &Path) -> tokio_rusqlite::Result<tokio_rusqlite::Connection> {
  let conn = tokio_rusqlite::Connection::open(path).await?;
  let sql = schema();
  conn
    .call(move |conn| {
      conn.execute_batch(&sql)?;
      Ok(())
    })
    .await?;
  Ok(conn)
}

impl FactStore for RelationalStore {
  type Error = Error;

  fn conflict_policy(&self) -> ConflictPolicy { ConflictPolicy::Merge }

  async fn upsert(&self, destination: Destination, record: &FactRecord) -> Result<()> {
    let statement = Statement::upsert(destination, record, ConflictPolicy::Merge)?;
    self
      .call("upsert", move |conn| {
        statement.execute(conn)?;
        Ok(())
      })
      .await
  }

  async fn flush(&self) -> Result<()> { Ok(()) }

  async fn lookup_adm_division(&self, query: &RegionQuery) -> Result<Option<AdmDivision>> {
    let Some(code) = non_blank(query.country_code.as_deref()) else {
      return Ok(None);
    };
    let raws = self
      .call("lookup_adm_division", move |conn| {
        Ok(statement::select_divisions(conn, &code)?)
      })
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
      .call("load_adm_divisions", move |conn| {
        Ok(statement::insert_divisions(conn, &raws)?)
      })
      .await
  }

  async fn rows(&self, destination: Destination, source: &str) -> Result<Vec<FactRecord>> {
    let source = source.to_owned();
    let raws = self
      .call("rows", move |conn| {
        Ok(statement::select_rows(conn, destination, &source)?)
      })
      .await?;

    raws.into_iter().map(|r: RawRow| r.into_record(destination)).collect()
  }
}
