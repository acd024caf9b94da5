//! The `FactStore` trait — the storage-adapter contract every backend meets.
//!
//! The trait is implemented by storage backends (`epiharvest-store-sqlite`,
//! `epiharvest-store-csv`). The runner and producers depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  fact::{Destination, FactRecord, Fields, Table},
  region::{AdmDivision, RegionQuery},
};

/// What happens when an upsert hits an existing natural key.
///
/// This is a real behavioural difference between backends: a later write that
/// omits a field keeps the earlier value under `Merge` and clears it under
/// `Replace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
  /// Overwrite the fields present in the new record; keep the rest.
  Merge,
  /// Replace the stored row wholesale.
  Replace,
}

/// Abstraction over an epiharvest storage backend.
///
/// Writes are idempotent upserts keyed by the natural key; no method ever
/// deletes a fact row.
///
/// All methods return `Send` futures so a store can be shared with producers
/// driven on tokio tasks.
pub trait FactStore: Send + Sync {
  type Error: std::error::Error + From<crate::Error> + Send + Sync + 'static;

  /// How this backend resolves a natural-key conflict.
  fn conflict_policy(&self) -> ConflictPolicy;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert `record` into `destination`, or resolve the conflict with the
  /// existing row per [`FactStore::conflict_policy`].
  fn upsert<'a>(
    &'a self,
    destination: Destination,
    record: &'a FactRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Build a record for `table` from `fields` and upsert it into the
  /// production table.
  fn upsert_fields(
    &self,
    table: Table,
    fields: Fields,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    async move {
      let record = FactRecord::new(table, fields)?;
      self.upsert(Destination::Table(table), &record).await
    }
  }

  fn upsert_epidemiology(
    &self,
    fields: Fields,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    self.upsert_fields(Table::Epidemiology, fields)
  }

  fn upsert_government_response(
    &self,
    fields: Fields,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    self.upsert_fields(Table::GovernmentResponse, fields)
  }

  fn upsert_mobility(
    &self,
    fields: Fields,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    self.upsert_fields(Table::Mobility, fields)
  }

  fn upsert_weather(
    &self,
    fields: Fields,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
    self.upsert_fields(Table::Weather, fields)
  }

  /// Persist any buffered rows. A no-op for pass-through backends.
  fn flush(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Administrative division reference ────────────────────────────────

  /// Look `query` up in the canonical register. Returns `None` unless
  /// exactly one division matches.
  fn lookup_adm_division<'a>(
    &'a self,
    query: &'a RegionQuery,
  ) -> impl Future<Output = Result<Option<AdmDivision>, Self::Error>> + Send + 'a;

  /// Add divisions to the register, replacing any with the same names.
  fn load_adm_divisions(
    &self,
    divisions: Vec<AdmDivision>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// All rows stored in `destination` for `source`, ordered by natural key.
  fn rows<'a>(
    &'a self,
    destination: Destination,
    source: &'a str,
  ) -> impl Future<Output = Result<Vec<FactRecord>, Self::Error>> + Send + 'a;
}
