//! Per-run diagnostics: region combinations that could not be fully
//! resolved. Each distinct combination is logged once per run.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{fact::FactRecord, region::RegionQuery};

/// (source, country-code, admin-1..3) — the granularity at which gaps are
/// reported.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RegionKey {
  pub source:       String,
  pub country_code: String,
  pub adm_area_1:   String,
  pub adm_area_2:   String,
  pub adm_area_3:   String,
}

impl RegionKey {
  pub fn from_record(record: &FactRecord) -> Self {
    Self {
      source:       record.key.source.clone(),
      country_code: record.key.country_code.clone(),
      adm_area_1:   record.key.adm_area_1.clone(),
      adm_area_2:   record.key.adm_area_2.clone(),
      adm_area_3:   record.key.adm_area_3.clone(),
    }
  }

  pub fn from_query(source: &str, query: &RegionQuery) -> Self {
    let text = |s: &Option<String>| s.as_deref().unwrap_or_default().trim().to_owned();
    Self {
      source:       source.to_owned(),
      country_code: text(&query.country_code),
      adm_area_1:   text(&query.adm_area_1),
      adm_area_2:   text(&query.adm_area_2),
      adm_area_3:   text(&query.adm_area_3),
    }
  }
}

/// Collected gaps for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
  missing_geocodes: BTreeSet<RegionKey>,
  unresolved:       BTreeSet<RegionKey>,
}

impl Diagnostics {
  pub fn new() -> Self { Self::default() }

  /// A stored record had no geocode. Returns `true` the first time `key`
  /// is seen.
  pub fn record_missing_geocode(&mut self, key: RegionKey) -> bool {
    if self.missing_geocodes.contains(&key) {
      return false;
    }
    tracing::warn!(
      source = %key.source,
      country_code = %key.country_code,
      adm_area_1 = %key.adm_area_1,
      adm_area_2 = %key.adm_area_2,
      adm_area_3 = %key.adm_area_3,
      "storing record without geocode"
    );
    self.missing_geocodes.insert(key)
  }

  /// A region name matched nothing. The resolver already logged it.
  pub fn record_unresolved(&mut self, key: RegionKey) -> bool { self.unresolved.insert(key) }

  pub fn missing_geocodes(&self) -> impl Iterator<Item = &RegionKey> {
    self.missing_geocodes.iter()
  }

  pub fn unresolved(&self) -> impl Iterator<Item = &RegionKey> { self.unresolved.iter() }
}
