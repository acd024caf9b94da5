//! Encoding and decoding helpers between fact records and the values stored
//! in SQLite columns.
//!
//! Key components and dates are stored as text (`YYYY-MM-DD` for dates).
//! Geocode lists are stored as compact JSON arrays.

use epiharvest_core::{
  fact::{Destination, FactRecord, FieldValue, Fields, GID_COLUMN},
  region::{AdmDivision, non_blank},
};
use rusqlite::types::Value;

use crate::{Error, Result};

// ─── Geocodes ────────────────────────────────────────────────────────────────

pub fn encode_gid(gid: &[String]) -> Result<String> { Ok(serde_json::to_string(gid)?) }

pub fn decode_gid(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

// ─── Field values ────────────────────────────────────────────────────────────

pub fn encode_value(value: &FieldValue) -> Result<Value> {
  Ok(match value {
    FieldValue::Integer(i) => Value::Integer(*i),
    FieldValue::Real(f) => Value::Real(*f),
    FieldValue::Text(s) => Value::Text(s.clone()),
    FieldValue::List(items) => Value::Text(encode_gid(items)?),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column name/value pairs read directly from a fact table row.
pub struct RawRow {
  pub columns: Vec<(String, Value)>,
}

impl RawRow {
  /// Rebuild the record through the same validation producers go through.
  pub fn into_record(self, destination: Destination) -> Result<FactRecord> {
    let table = destination.table();
    let mut fields = Fields::new();

    for (name, value) in self.columns {
      let field = match value {
        Value::Null => continue,
        Value::Integer(i) => FieldValue::Integer(i),
        Value::Real(f) => FieldValue::Real(f),
        Value::Text(s) if name == GID_COLUMN => FieldValue::List(decode_gid(&s)?),
        Value::Text(s) => FieldValue::Text(s),
        Value::Blob(_) => {
          return Err(Error::Decode {
            table:  table.name(),
            column: name,
            reason: "unexpected blob".into(),
          });
        }
      };
      fields.insert(&name, field);
    }

    Ok(FactRecord::new(table, fields)?)
  }
}

/// Raw strings read directly from an `administrative_division` row.
#[derive(Clone)]
pub struct RawDivision {
  pub country_code: String,
  pub adm_area_1:   String,
  pub adm_area_2:   String,
  pub adm_area_3:   String,
  pub gid:          String,
}

impl RawDivision {
  pub fn from_division(division: &AdmDivision) -> Result<Self> {
    let text = |s: &Option<String>| non_blank(s.as_deref()).unwrap_or_default();
    Ok(Self {
      country_code: division.country_code.trim().to_owned(),
      adm_area_1:   text(&division.adm_area_1),
      adm_area_2:   text(&division.adm_area_2),
      adm_area_3:   text(&division.adm_area_3),
      gid:          encode_gid(&division.gid)?,
    })
  }

  pub fn into_division(self) -> Result<AdmDivision> {
    Ok(AdmDivision {
      country_code: self.country_code,
      adm_area_1:   non_blank(Some(self.adm_area_1.as_str())),
      adm_area_2:   non_blank(Some(self.adm_area_2.as_str())),
      adm_area_3:   non_blank(Some(self.adm_area_3.as_str())),
      gid:          decode_gid(&self.gid)?,
    })
  }
}
