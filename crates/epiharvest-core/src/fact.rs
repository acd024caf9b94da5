//! Fact records — one canonical per-region-per-date row of a fact table.
//!
//! Producers hand the core a loose [`Fields`] map; [`FactRecord::new`] checks
//! it against the table's fixed column whitelist, normalises the natural key
//! and keeps only the measurements the table knows about.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  region::{join_geocodes, split_geocodes},
};

// ─── Tables ──────────────────────────────────────────────────────────────────

/// The four fact families.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Table {
  Epidemiology,
  GovernmentResponse,
  Mobility,
  Weather,
}

impl Table {
  pub const ALL: [Table; 4] = [
    Table::Epidemiology,
    Table::GovernmentResponse,
    Table::Mobility,
    Table::Weather,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Table::Epidemiology => "epidemiology",
      Table::GovernmentResponse => "government_response",
      Table::Mobility => "mobility",
      Table::Weather => "weather",
    }
  }

  /// Measurement columns beyond the natural key and `gid`.
  pub fn measures(self) -> &'static [Column] {
    match self {
      Table::Epidemiology => EPIDEMIOLOGY,
      Table::GovernmentResponse => GOVERNMENT_RESPONSE,
      Table::Mobility => MOBILITY,
      Table::Weather => WEATHER,
    }
  }

  pub fn measure(self, name: &str) -> Option<&'static Column> {
    self.measures().iter().find(|c| c.name == name)
  }

  /// Weather rows are keyed by geocode and may arrive without a country name.
  pub fn requires_country(self) -> bool { !matches!(self, Table::Weather) }
}

impl fmt::Display for Table {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Table {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Table::ALL
      .into_iter()
      .find(|t| t.name() == s)
      .ok_or_else(|| Error::UnknownTable(s.to_owned()))
  }
}

/// Where a record is written. Only epidemiology has a staging twin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Destination {
  Table(Table),
  EpidemiologyStaging,
}

impl Destination {
  pub const ALL: [Destination; 5] = [
    Destination::Table(Table::Epidemiology),
    Destination::Table(Table::GovernmentResponse),
    Destination::Table(Table::Mobility),
    Destination::Table(Table::Weather),
    Destination::EpidemiologyStaging,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Destination::Table(t) => t.name(),
      Destination::EpidemiologyStaging => "epidemiology_staging",
    }
  }

  /// The table whose column layout this destination uses.
  pub fn table(self) -> Table {
    match self {
      Destination::Table(t) => t,
      Destination::EpidemiologyStaging => Table::Epidemiology,
    }
  }
}

impl From<Table> for Destination {
  fn from(table: Table) -> Self { Destination::Table(table) }
}

impl fmt::Display for Destination {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

// ─── Columns ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  Integer,
  Real,
  Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name: &'static str,
  pub kind: ColumnKind,
}

const fn int(name: &'static str) -> Column { Column { name, kind: ColumnKind::Integer } }
const fn real(name: &'static str) -> Column { Column { name, kind: ColumnKind::Real } }
const fn text(name: &'static str) -> Column { Column { name, kind: ColumnKind::Text } }

/// Natural-key columns, in storage order.
pub const KEY_COLUMNS: [&str; 7] = [
  "source",
  "date",
  "country",
  "countrycode",
  "adm_area_1",
  "adm_area_2",
  "adm_area_3",
];

pub const GID_COLUMN: &str = "gid";

const EPIDEMIOLOGY: &[Column] = &[
  int("tested"),
  int("confirmed"),
  int("recovered"),
  int("dead"),
  int("hospitalised"),
  int("hospitalised_icu"),
  int("quarantined"),
];

const GOVERNMENT_RESPONSE: &[Column] = &[
  int("confirmed"),
  int("dead"),
  real("stringency"),
  real("stringency_actual"),
  text("actions"),
];

const MOBILITY: &[Column] = &[
  real("transit_stations"),
  real("residential"),
  real("workplace"),
  real("parks"),
  real("retail_recreation"),
  real("grocery_pharmacy"),
];

const WEATHER: &[Column] = &[
  real("precipitation_max_avg"),
  real("precipitation_max_std"),
  real("precipitation_mean_avg"),
  real("precipitation_mean_std"),
  real("humidity_max_avg"),
  real("humidity_max_std"),
  real("humidity_mean_avg"),
  real("humidity_mean_std"),
  real("humidity_min_avg"),
  real("humidity_min_std"),
  real("sunshine_max_avg"),
  real("sunshine_max_std"),
  real("sunshine_mean_avg"),
  real("sunshine_mean_std"),
  real("temperature_max_avg"),
  real("temperature_max_std"),
  real("temperature_mean_avg"),
  real("temperature_mean_std"),
  real("temperature_min_avg"),
  real("temperature_min_std"),
  real("windgust_max_avg"),
  real("windgust_max_std"),
  real("windgust_mean_avg"),
  real("windgust_mean_std"),
  real("windgust_min_avg"),
  real("windgust_min_std"),
  real("windspeed_max_avg"),
  real("windspeed_max_std"),
  real("windspeed_mean_avg"),
  real("windspeed_mean_std"),
  real("windspeed_min_avg"),
  real("windspeed_min_std"),
];

/// Map producer-facing aliases onto storage column names.
pub fn canonical_column(name: &str) -> &str {
  match name {
    "country_code" => "countrycode",
    "admin_1" => "adm_area_1",
    "admin_2" => "adm_area_2",
    "admin_3" => "adm_area_3",
    "geocode" => GID_COLUMN,
    other => other,
  }
}

// ─── Values ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
  Integer(i64),
  Real(f64),
  Text(String),
  List(Vec<String>),
}

impl FieldValue {
  pub fn as_text(&self) -> Option<&str> {
    match self {
      FieldValue::Text(s) => Some(s),
      _ => None,
    }
  }

  /// Cell rendering shared by the flat-file backend and log output.
  pub fn render(&self) -> String {
    match self {
      FieldValue::Integer(v) => v.to_string(),
      FieldValue::Real(v) => v.to_string(),
      FieldValue::Text(s) => s.clone(),
      FieldValue::List(items) => join_geocodes(items),
    }
  }
}

impl From<i64> for FieldValue {
  fn from(v: i64) -> Self { FieldValue::Integer(v) }
}

impl From<i32> for FieldValue {
  fn from(v: i32) -> Self { FieldValue::Integer(v.into()) }
}

impl From<u32> for FieldValue {
  fn from(v: u32) -> Self { FieldValue::Integer(v.into()) }
}

impl From<f64> for FieldValue {
  fn from(v: f64) -> Self { FieldValue::Real(v) }
}

impl From<&str> for FieldValue {
  fn from(v: &str) -> Self { FieldValue::Text(v.to_owned()) }
}

impl From<String> for FieldValue {
  fn from(v: String) -> Self { FieldValue::Text(v) }
}

impl From<Vec<String>> for FieldValue {
  fn from(v: Vec<String>) -> Self { FieldValue::List(v) }
}

impl From<NaiveDate> for FieldValue {
  fn from(v: NaiveDate) -> Self { FieldValue::Text(v.format(DATE_FORMAT).to_string()) }
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A loose, producer-built field set. Names are canonicalised on insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
  pub fn new() -> Self { Self::default() }

  pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
    self.insert(name, value);
    self
  }

  /// Like [`Fields::with`], but `None` leaves the field absent.
  pub fn with_opt<V: Into<FieldValue>>(mut self, name: &str, value: Option<V>) -> Self {
    if let Some(v) = value {
      self.insert(name, v);
    }
    self
  }

  pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
    self.0.insert(canonical_column(name).to_owned(), value.into());
  }

  pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
    self.0.remove(canonical_column(name))
  }

  pub fn get(&self, name: &str) -> Option<&FieldValue> { self.0.get(canonical_column(name)) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl IntoIterator for Fields {
  type Item = (String, FieldValue);
  type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

  fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// The normalised natural key. Optional components are the empty string
/// when absent, so an unset and an empty admin level are the same region.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NaturalKey {
  pub source:       String,
  pub date:         NaiveDate,
  pub country:      String,
  pub country_code: String,
  pub adm_area_1:   String,
  pub adm_area_2:   String,
  pub adm_area_3:   String,
}

impl NaturalKey {
  pub fn date_string(&self) -> String { self.date.format(DATE_FORMAT).to_string() }

  /// Key values in [`KEY_COLUMNS`] order.
  pub fn columns(&self) -> [String; 7] {
    [
      self.source.clone(),
      self.date_string(),
      self.country.clone(),
      self.country_code.clone(),
      self.adm_area_1.clone(),
      self.adm_area_2.clone(),
      self.adm_area_3.clone(),
    ]
  }
}

/// One validated row of one fact table.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRecord {
  pub table:  Table,
  pub key:    NaturalKey,
  /// `None` when the producer supplied no geocode at all.
  pub gid:    Option<Vec<String>>,
  pub values: BTreeMap<&'static str, FieldValue>,
}

impl FactRecord {
  /// Validate `fields` against `table`'s whitelist.
  ///
  /// Columns outside the whitelist are dropped; a missing key field, a
  /// malformed date or a value of the wrong kind is an error.
  pub fn new(table: Table, fields: Fields) -> Result<Self> {
    let mut key: [Option<String>; 7] = Default::default();
    let mut gid = None;
    let mut values = BTreeMap::new();

    for (name, value) in fields {
      if let Some(idx) = KEY_COLUMNS.iter().position(|k| *k == name) {
        let text = value.as_text().ok_or_else(|| Error::InvalidField {
          table:    table.name(),
          column:   name.clone(),
          expected: "text",
        })?;
        key[idx] = Some(text.trim().to_owned()).filter(|s| !s.is_empty());
      } else if name == GID_COLUMN {
        gid = Some(geocodes(table, value)?);
      } else if let Some(column) = table.measure(&name) {
        values.insert(column.name, coerce(table, column, value)?);
      } else {
        tracing::trace!(table = table.name(), column = %name, "dropping column outside whitelist");
      }
    }

    let [source, date, country, country_code, adm_area_1, adm_area_2, adm_area_3] = key;
    let required = |value: Option<String>, field: &'static str| {
      value.ok_or(Error::MissingKeyField { table: table.name(), field })
    };

    let source = required(source, "source")?;
    let date = required(date, "date")?;
    let date =
      NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| Error::InvalidDate(date))?;
    let country = if table.requires_country() {
      required(country, "country")?
    } else {
      country.unwrap_or_default()
    };
    let country_code = required(country_code, "countrycode")?;

    Ok(Self {
      table,
      key: NaturalKey {
        source,
        date,
        country,
        country_code,
        adm_area_1: adm_area_1.unwrap_or_default(),
        adm_area_2: adm_area_2.unwrap_or_default(),
        adm_area_3: adm_area_3.unwrap_or_default(),
      },
      gid,
      values,
    })
  }

  pub fn get(&self, column: &str) -> Option<&FieldValue> { self.values.get(column) }

  pub fn has_geocode(&self) -> bool { self.gid.as_ref().is_some_and(|g| !g.is_empty()) }
}

fn geocodes(table: Table, value: FieldValue) -> Result<Vec<String>> {
  match value {
    FieldValue::List(items) => Ok(
      items
        .into_iter()
        .map(|g| g.trim().to_owned())
        .filter(|g| !g.is_empty())
        .collect(),
    ),
    FieldValue::Text(cell) => Ok(split_geocodes(&cell)),
    _ => Err(Error::InvalidField {
      table:    table.name(),
      column:   GID_COLUMN.to_owned(),
      expected: "geocode list",
    }),
  }
}

fn coerce(table: Table, column: &Column, value: FieldValue) -> Result<FieldValue> {
  match (column.kind, value) {
    (ColumnKind::Integer, v @ FieldValue::Integer(_)) => Ok(v),
    (ColumnKind::Real, v @ FieldValue::Real(_)) => Ok(v),
    (ColumnKind::Real, FieldValue::Integer(i)) => Ok(FieldValue::Real(i as f64)),
    (ColumnKind::Text, v @ FieldValue::Text(_)) => Ok(v),
    (kind, _) => Err(Error::InvalidField {
      table:    table.name(),
      column:   column.name.to_owned(),
      expected: match kind {
        ColumnKind::Integer => "integer",
        ColumnKind::Real => "number",
        ColumnKind::Text => "text",
      },
    }),
  }
}
