//! [`Resolver`] — cached lookups against one [`MappingTable`].

use std::{collections::HashMap, path::Path};

use epiharvest_core::region::{Region, RegionQuery};

use crate::{Error, MappingTable, Result};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Why a matched region could not be used as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFailure {
  /// The mapping row matched but its geocode cell is empty.
  MissingGeocode { query: RegionQuery, region: Region },
}

/// The outcome of resolving one free-text region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  Resolved { region: Region, geocodes: Vec<String> },
  /// Nothing matched; the free-text names are kept for labelling.
  Unresolved { original: Region },
  Failed(ResolveFailure),
}

impl Resolution {
  pub fn is_resolved(&self) -> bool { matches!(self, Resolution::Resolved { .. }) }

  /// Flatten into the `(resolved, a1, a2, a3, geocodes)` shape producers
  /// write into fact fields.
  pub fn project(self, policy: FailurePolicy) -> Result<Lookup> {
    match self {
      Resolution::Resolved { region, geocodes } => Ok(Lookup::new(true, region, Some(geocodes))),
      Resolution::Unresolved { original } if policy.return_original => {
        Ok(Lookup::new(false, original, None))
      }
      Resolution::Unresolved { .. } => Ok(Lookup::new(false, Region::default(), None)),
      Resolution::Failed(ResolveFailure::MissingGeocode { region, .. })
        if policy.suppress_missing_geocode =>
      {
        Ok(Lookup::new(true, region, None))
      }
      Resolution::Failed(ResolveFailure::MissingGeocode { query, region }) => {
        Err(Error::MissingGeocode {
          country_code: query.country_code.unwrap_or_default(),
          region:       describe(&region),
        })
      }
    }
  }
}

/// How [`Resolution::project`] treats misses and authoring gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePolicy {
  /// Echo the free-text names back on a miss instead of blanking them.
  pub return_original:          bool,
  /// Accept a match without a geocode instead of failing.
  pub suppress_missing_geocode: bool,
}

impl FailurePolicy {
  /// Keep whatever labels are available and never fail.
  pub const LENIENT: Self = Self { return_original: true, suppress_missing_geocode: true };
}

/// Flattened resolution result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
  pub resolved:   bool,
  pub adm_area_1: Option<String>,
  pub adm_area_2: Option<String>,
  pub adm_area_3: Option<String>,
  pub geocodes:   Option<Vec<String>>,
}

impl Lookup {
  fn new(resolved: bool, region: Region, geocodes: Option<Vec<String>>) -> Self {
    Self {
      resolved,
      adm_area_1: region.adm_area_1,
      adm_area_2: region.adm_area_2,
      adm_area_3: region.adm_area_3,
      geocodes,
    }
  }
}

fn describe(region: &Region) -> String {
  [&region.adm_area_1, &region.adm_area_2, &region.adm_area_3]
    .into_iter()
    .flatten()
    .map(String::as_str)
    .collect::<Vec<_>>()
    .join("/")
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolves regions against one mapping table, caching by the exact query.
///
/// Owned by a single producer run; the cache needs no synchronisation.
#[derive(Debug, Default)]
pub struct Resolver {
  table: MappingTable,
  cache: HashMap<RegionQuery, Resolution>,
}

impl Resolver {
  pub fn new(table: MappingTable) -> Self { Self { table, cache: HashMap::new() } }

  /// A resolver with no mapping rows; every query is unresolved.
  pub fn empty() -> Self { Self::default() }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> { Ok(Self::new(MappingTable::load(path)?)) }

  pub fn resolve(&mut self, query: &RegionQuery) -> Resolution {
    if let Some(hit) = self.cache.get(query) {
      return hit.clone();
    }
    let resolution = self.resolve_uncached(query);
    self.cache.insert(query.clone(), resolution.clone());
    resolution
  }

  /// [`Resolver::resolve`] followed by [`Resolution::project`].
  pub fn lookup(&mut self, query: &RegionQuery, policy: FailurePolicy) -> Result<Lookup> {
    self.resolve(query).project(policy)
  }

  pub fn cached(&self) -> usize { self.cache.len() }

  // Only reached once per distinct query, so each gap is logged once.
  fn resolve_uncached(&self, query: &RegionQuery) -> Resolution {
    let Some(entry) = self.table.find(query) else {
      tracing::warn!(
        country_code = ?query.country_code,
        adm_area_1 = ?query.adm_area_1,
        adm_area_2 = ?query.adm_area_2,
        adm_area_3 = ?query.adm_area_3,
        "no mapping for region"
      );
      return Resolution::Unresolved { original: query.as_region() };
    };

    if entry.geocodes.is_empty() {
      tracing::warn!(
        country_code = ?query.country_code,
        region = %describe(&entry.region),
        "mapping row has no geocode"
      );
      return Resolution::Failed(ResolveFailure::MissingGeocode {
        query:  query.clone(),
        region: entry.region.clone(),
      });
    }

    Resolution::Resolved { region: entry.region.clone(), geocodes: entry.geocodes.clone() }
  }
}
