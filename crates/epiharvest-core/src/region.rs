//! Region names and geocodes.
//!
//! Sources spell the same region many ways. Everything that compares region
//! names goes through [`fold`], which ignores case and whitespace runs.

use serde::{Deserialize, Serialize};

/// Separator between geocode tokens in a mapping cell or CSV column.
pub const GEOCODE_DELIMITER: char = ':';

/// Case- and whitespace-insensitive comparison key.
pub fn fold(s: &str) -> String {
  s.split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// Trim `s`, mapping blank strings to `None`.
pub fn non_blank(s: Option<&str>) -> Option<String> {
  s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

/// Compare two optional names; an absent name only equals another absent one.
pub fn names_match(a: Option<&str>, b: Option<&str>) -> bool {
  match (non_blank(a), non_blank(b)) {
    (None, None) => true,
    (Some(a), Some(b)) => fold(&a) == fold(&b),
    _ => false,
  }
}

pub fn split_geocodes(cell: &str) -> Vec<String> {
  cell
    .split(GEOCODE_DELIMITER)
    .map(str::trim)
    .filter(|g| !g.is_empty())
    .map(str::to_owned)
    .collect()
}

pub fn join_geocodes(geocodes: &[String]) -> String {
  geocodes.join(&GEOCODE_DELIMITER.to_string())
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// A region exactly as a producer spelled it.
///
/// Used verbatim as the resolver cache key, so two queries differing only in
/// case are cached separately even though they resolve identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionQuery {
  pub country_code: Option<String>,
  pub adm_area_1:   Option<String>,
  pub adm_area_2:   Option<String>,
  pub adm_area_3:   Option<String>,
}

impl RegionQuery {
  pub fn new(country_code: &str) -> Self {
    Self { country_code: Some(country_code.to_owned()), ..Self::default() }
  }

  pub fn adm1(mut self, name: &str) -> Self {
    self.adm_area_1 = Some(name.to_owned());
    self
  }

  pub fn adm2(mut self, name: &str) -> Self {
    self.adm_area_2 = Some(name.to_owned());
    self
  }

  pub fn adm3(mut self, name: &str) -> Self {
    self.adm_area_3 = Some(name.to_owned());
    self
  }

  pub fn levels(&self) -> [Option<&str>; 3] {
    [
      self.adm_area_1.as_deref(),
      self.adm_area_2.as_deref(),
      self.adm_area_3.as_deref(),
    ]
  }

  /// The free-text names echoed back when resolution fails.
  pub fn as_region(&self) -> Region {
    Region {
      adm_area_1: non_blank(self.adm_area_1.as_deref()),
      adm_area_2: non_blank(self.adm_area_2.as_deref()),
      adm_area_3: non_blank(self.adm_area_3.as_deref()),
    }
  }
}

/// Canonical admin-area names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
  pub adm_area_1: Option<String>,
  pub adm_area_2: Option<String>,
  pub adm_area_3: Option<String>,
}

// ─── Reference register ──────────────────────────────────────────────────────

/// One row of the administrative division reference: a canonical region and
/// its geocode(s), independent of any one source's naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmDivision {
  pub country_code: String,
  pub adm_area_1:   Option<String>,
  pub adm_area_2:   Option<String>,
  pub adm_area_3:   Option<String>,
  pub gid:          Vec<String>,
}

impl AdmDivision {
  pub fn matches(&self, query: &RegionQuery) -> bool {
    let Some(code) = non_blank(query.country_code.as_deref()) else {
      return false;
    };
    fold(&code) == fold(&self.country_code)
      && names_match(self.adm_area_1.as_deref(), query.adm_area_1.as_deref())
      && names_match(self.adm_area_2.as_deref(), query.adm_area_2.as_deref())
      && names_match(self.adm_area_3.as_deref(), query.adm_area_3.as_deref())
  }

  pub fn region(&self) -> Region {
    Region {
      adm_area_1: self.adm_area_1.clone(),
      adm_area_2: self.adm_area_2.clone(),
      adm_area_3: self.adm_area_3.clone(),
    }
  }
}

/// A reference lookup is a hit only when exactly one division matches.
pub fn unique_match<'a>(
  divisions: impl IntoIterator<Item = &'a AdmDivision>,
  query: &RegionQuery,
) -> Option<&'a AdmDivision> {
  let mut hits = divisions.into_iter().filter(|d| d.matches(query));
  let first = hits.next()?;
  match hits.next() {
    Some(_) => None,
    None => Some(first),
  }
}
