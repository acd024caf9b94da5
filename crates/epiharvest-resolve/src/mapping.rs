//! Mapping Entry files: curated per-source translations from free-text
//! region names to canonical names and geocodes.
//!
//! Header is `input_admin_1,input_admin_2,input_admin_3,admin_1,admin_2,
//! admin_3,geocode`, optionally prefixed with `country_code`. Row order is
//! significant: the first matching row wins, so specific rows must precede
//! generic ones.

use std::{fs::File, io::Read, path::Path};

use epiharvest_core::region::{Region, RegionQuery, fold, non_blank, split_geocodes};
use serde::Deserialize;

use crate::{Error, Result};

const REQUIRED_COLUMNS: [&str; 7] = [
  "input_admin_1",
  "input_admin_2",
  "input_admin_3",
  "admin_1",
  "admin_2",
  "admin_3",
  "geocode",
];

#[derive(Debug, Deserialize)]
struct RawEntry {
  #[serde(default)]
  country_code:  Option<String>,
  input_admin_1: Option<String>,
  input_admin_2: Option<String>,
  input_admin_3: Option<String>,
  admin_1:       Option<String>,
  admin_2:       Option<String>,
  admin_3:       Option<String>,
  geocode:       Option<String>,
}

/// One row of a mapping file, with its match keys pre-folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
  /// Folded country code; `None` matches any country.
  pub country_code: Option<String>,
  /// Folded input names; `None` only matches an absent query level.
  pub input:        [Option<String>; 3],
  pub region:       Region,
  /// Empty when the geocode cell was blank.
  pub geocodes:     Vec<String>,
}

impl MappingEntry {
  fn from_raw(raw: RawEntry) -> Self {
    let folded = |s: Option<String>| non_blank(s.as_deref()).map(|s| fold(&s));
    Self {
      country_code: folded(raw.country_code),
      input:        [
        folded(raw.input_admin_1),
        folded(raw.input_admin_2),
        folded(raw.input_admin_3),
      ],
      region:       Region {
        adm_area_1: non_blank(raw.admin_1.as_deref()),
        adm_area_2: non_blank(raw.admin_2.as_deref()),
        adm_area_3: non_blank(raw.admin_3.as_deref()),
      },
      geocodes:     raw.geocode.as_deref().map(split_geocodes).unwrap_or_default(),
    }
  }

  pub fn matches(&self, query: &RegionQuery) -> bool {
    let country_ok = match (&self.country_code, non_blank(query.country_code.as_deref())) {
      (Some(row), Some(q)) => *row == fold(&q),
      _ => true,
    };
    country_ok
      && self
        .input
        .iter()
        .zip(query.levels())
        .all(|(row, q)| *row == non_blank(q).map(|q| fold(&q)))
  }
}

/// The full, ordered contents of one mapping file.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
  entries: Vec<MappingEntry>,
}

impl MappingTable {
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    Self::from_reader(file, &path.display().to_string())
  }

  /// Parse mapping rows from any reader. `origin` names the input in errors.
  pub fn from_reader(reader: impl Read, origin: &str) -> Result<Self> {
    let csv_err = |source| Error::Csv { origin: origin.to_owned(), source };

    let mut rdr = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .flexible(false)
      .from_reader(reader);

    let headers = rdr.headers().map_err(csv_err)?.clone();
    if let Some(column) = REQUIRED_COLUMNS
      .into_iter()
      .find(|c| !headers.iter().any(|h| h == *c))
    {
      return Err(Error::MissingColumn { origin: origin.to_owned(), column });
    }

    let entries = rdr
      .deserialize::<RawEntry>()
      .map(|row| row.map(MappingEntry::from_raw))
      .collect::<csv::Result<Vec<_>>>()
      .map_err(csv_err)?;

    tracing::debug!(origin, entries = entries.len(), "loaded mapping table");
    Ok(Self { entries })
  }

  pub fn from_entries(entries: Vec<MappingEntry>) -> Self { Self { entries } }

  /// The first entry matching `query`, in file order.
  pub fn find(&self, query: &RegionQuery) -> Option<&MappingEntry> {
    self.entries.iter().find(|e| e.matches(query))
  }
}
