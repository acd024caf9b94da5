//! Cell encoding for fact files and the division register.
//!
//! Every cell is text. Absent values are empty cells and geocode lists are
//! `:`-joined, so a file round-trips through [`FactRecord::new`] unchanged.

use std::path::Path;

use csv::StringRecord;
use epiharvest_core::{
  fact::{ColumnKind, Destination, FactRecord, FieldValue, Fields, GID_COLUMN, KEY_COLUMNS},
  region::{AdmDivision, join_geocodes, non_blank, split_geocodes},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Header row for a destination's file: key columns, `gid`, then measures.
pub fn header(destination: Destination) -> Vec<&'static str> {
  KEY_COLUMNS
    .into_iter()
    .chain([GID_COLUMN])
    .chain(destination.table().measures().iter().map(|c| c.name))
    .collect()
}

pub fn encode_record(record: &FactRecord) -> Vec<String> {
  let mut cells = record.key.columns().to_vec();
  cells.push(record.gid.as_deref().map(join_geocodes).unwrap_or_default());
  cells.extend(
    record
      .table
      .measures()
      .iter()
      .map(|c| record.get(c.name).map(FieldValue::render).unwrap_or_default()),
  );
  cells
}

/// Rebuild one record from a data row. Columns the table doesn't know are
/// handed through and dropped by [`FactRecord::new`].
pub fn decode_record(
  destination: Destination,
  headers: &StringRecord,
  row: &StringRecord,
  path: &Path,
) -> Result<FactRecord> {
  let table = destination.table();
  let line = row.position().map(|p| p.line()).unwrap_or_default();
  let mut fields = Fields::new();

  for (name, cell) in headers.iter().zip(row.iter()) {
    if cell.is_empty() {
      continue;
    }
    let kind = table.measure(name).map(|c| c.kind).unwrap_or(ColumnKind::Text);
    let value = match kind {
      ColumnKind::Integer => cell.parse::<i64>().map(FieldValue::Integer).ok(),
      ColumnKind::Real => cell.parse::<f64>().map(FieldValue::Real).ok(),
      ColumnKind::Text => Some(FieldValue::Text(cell.to_owned())),
    };
    let value = value.ok_or_else(|| Error::Decode {
      path:   path.to_path_buf(),
      line,
      column: name.to_owned(),
      value:  cell.to_owned(),
    })?;
    fields.insert(name, value);
  }

  Ok(FactRecord::new(table, fields)?)
}

// ─── Division register ───────────────────────────────────────────────────────

/// One row of `administrative_division.csv`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DivisionRow {
  pub countrycode: String,
  #[serde(default)]
  pub adm_area_1:  String,
  #[serde(default)]
  pub adm_area_2:  String,
  #[serde(default)]
  pub adm_area_3:  String,
  #[serde(default)]
  pub gid:         String,
}

impl From<&AdmDivision> for DivisionRow {
  fn from(division: &AdmDivision) -> Self {
    let text = |s: &Option<String>| non_blank(s.as_deref()).unwrap_or_default();
    Self {
      countrycode: division.country_code.trim().to_owned(),
      adm_area_1:  text(&division.adm_area_1),
      adm_area_2:  text(&division.adm_area_2),
      adm_area_3:  text(&division.adm_area_3),
      gid:         join_geocodes(&division.gid),
    }
  }
}

impl From<DivisionRow> for AdmDivision {
  fn from(row: DivisionRow) -> Self {
    Self {
      country_code: row.countrycode.trim().to_owned(),
      adm_area_1:   non_blank(Some(row.adm_area_1.as_str())),
      adm_area_2:   non_blank(Some(row.adm_area_2.as_str())),
      adm_area_3:   non_blank(Some(row.adm_area_3.as_str())),
      gid:          split_geocodes(&row.gid),
    }
  }
}

/// Divisions with the same country code and names occupy one register slot.
pub fn same_slot(a: &AdmDivision, b: &AdmDivision) -> bool {
  DivisionRow::from(a).slot() == DivisionRow::from(b).slot()
}

impl DivisionRow {
  fn slot(&self) -> (&str, &str, &str, &str) {
    (&self.countrycode, &self.adm_area_1, &self.adm_area_2, &self.adm_area_3)
  }
}
