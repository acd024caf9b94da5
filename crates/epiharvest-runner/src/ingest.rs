//! [`Ingest`] — the per-producer ingestion context.
//!
//! Everything a producer touches between raw data and the store goes through
//! here: region resolution (reference register first, then the producer's
//! mapping table), record validation, the gate, and diagnostics.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context as _;
use epiharvest_core::{
  diagnostics::{Diagnostics, RegionKey},
  fact::{Destination, FactRecord, Fields, Table},
  gate::Gate,
  region::{AdmDivision, RegionQuery},
  store::FactStore,
};
use epiharvest_resolve::{FailurePolicy, Lookup, Resolution, Resolver};
use serde::Serialize;

/// What happened to one upsert request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  Stored(Destination),
  /// Older than the sliding window; dropped without touching the store.
  Stale,
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
  pub stored: u64,
  pub stale:  u64,
}

pub struct Ingest<S: FactStore> {
  source:      String,
  store:       Arc<S>,
  resolver:    Resolver,
  gate:        Gate,
  references:  HashMap<RegionQuery, Option<AdmDivision>>,
  diagnostics: Diagnostics,
  stats:       IngestStats,
}

impl<S: FactStore> Ingest<S> {
  pub fn new(source: impl Into<String>, store: Arc<S>, resolver: Resolver, gate: Gate) -> Self {
    Self {
      source: source.into(),
      store,
      resolver,
      gate,
      references: HashMap::new(),
      diagnostics: Diagnostics::new(),
      stats: IngestStats::default(),
    }
  }

  pub fn into_parts(self) -> (IngestStats, Diagnostics) {
    tracing::debug!(source = %self.source, regions = self.resolver.cached(), "resolver cache");
    (self.stats, self.diagnostics)
  }

  // ── Regions ────────────────────────────────────────────────────────────

  /// Resolve a free-text region.
  ///
  /// A unique hit in the reference register wins. Otherwise the mapping
  /// table is consulted; a miss echoes the original names back and a
  /// mapping row without a geocode is accepted with no geocode.
  pub async fn resolve_region(&mut self, query: &RegionQuery) -> anyhow::Result<Lookup> {
    if let Some(division) = self.reference(query).await? {
      return Ok(Lookup {
        resolved:   true,
        adm_area_1: division.adm_area_1,
        adm_area_2: division.adm_area_2,
        adm_area_3: division.adm_area_3,
        geocodes:   (!division.gid.is_empty()).then_some(division.gid),
      });
    }

    let resolution = self.resolver.resolve(query);
    if let Resolution::Unresolved { .. } = resolution {
      self.diagnostics.record_unresolved(RegionKey::from_query(&self.source, query));
    }
    Ok(resolution.project(FailurePolicy::LENIENT)?)
  }

  async fn reference(&mut self, query: &RegionQuery) -> anyhow::Result<Option<AdmDivision>> {
    if let Some(hit) = self.references.get(query) {
      return Ok(hit.clone());
    }
    let hit = self
      .store
      .lookup_adm_division(query)
      .await
      .context("reference lookup failed")?;
    self.references.insert(query.clone(), hit.clone());
    Ok(hit)
  }

  // ── Writes ─────────────────────────────────────────────────────────────

  /// Validate `fields` for `table`, pass the record through the gate and
  /// upsert it. A missing `source` field is filled with this context's tag.
  pub async fn upsert(&mut self, table: Table, mut fields: Fields) -> anyhow::Result<Admission> {
    if fields.get("source").is_none() {
      fields.insert("source", self.source.as_str());
    }
    let record = FactRecord::new(table, fields)?;

    let Some(destination) = self.gate.check(&record) else {
      self.stats.stale += 1;
      return Ok(Admission::Stale);
    };

    if !record.has_geocode() {
      self.diagnostics.record_missing_geocode(RegionKey::from_record(&record));
    }

    self
      .store
      .upsert(destination, &record)
      .await
      .with_context(|| format!("upsert into {destination} failed"))?;
    self.stats.stored += 1;
    Ok(Admission::Stored(destination))
  }

  pub async fn upsert_epidemiology(&mut self, fields: Fields) -> anyhow::Result<Admission> {
    self.upsert(Table::Epidemiology, fields).await
  }

  pub async fn upsert_government_response(&mut self, fields: Fields) -> anyhow::Result<Admission> {
    self.upsert(Table::GovernmentResponse, fields).await
  }

  pub async fn upsert_mobility(&mut self, fields: Fields) -> anyhow::Result<Admission> {
    self.upsert(Table::Mobility, fields).await
  }

  pub async fn upsert_weather(&mut self, fields: Fields) -> anyhow::Result<Admission> {
    self.upsert(Table::Weather, fields).await
  }
}

/// Write a resolved region into `fields`: canonical admin names replace the
/// producer's, and resolved geocodes replace any it supplied.
pub fn apply_lookup(mut fields: Fields, lookup: Lookup) -> Fields {
  for (name, value) in [
    ("adm_area_1", lookup.adm_area_1),
    ("adm_area_2", lookup.adm_area_2),
    ("adm_area_3", lookup.adm_area_3),
  ] {
    fields.remove(name);
    if let Some(value) = value {
      fields.insert(name, value);
    }
  }
  if let Some(geocodes) = lookup.geocodes {
    fields.insert("gid", geocodes);
  }
  fields
}
