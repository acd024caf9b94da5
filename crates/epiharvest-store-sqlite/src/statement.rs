//! SQL statements shared by both SQLite backends.
//!
//! Statements are built outside the connection thread and moved into
//! `Connection::call` closures, so they own their SQL text and parameters.
//! Column names interpolated into SQL all come from the static whitelists.

use epiharvest_core::{
  fact::{Destination, FactRecord, GID_COLUMN, KEY_COLUMNS},
  store::ConflictPolicy,
};
use rusqlite::{Connection, params_from_iter, types::Value};

use crate::{
  Result,
  encode::{RawDivision, RawRow, encode_gid, encode_value},
};

/// An owned statement with positional parameters.
#[derive(Debug, Clone)]
pub struct Statement {
  pub sql:    String,
  pub params: Vec<Value>,
}

impl Statement {
  /// Build an upsert of `record` into `destination`.
  ///
  /// Only the columns present in `record` are named. Under
  /// [`ConflictPolicy::Merge`] a conflict updates exactly those columns;
  /// under [`ConflictPolicy::Replace`] the row is deleted and re-inserted,
  /// so absent columns end up NULL.
  pub fn upsert(
    destination: Destination,
    record: &FactRecord,
    policy: ConflictPolicy,
  ) -> Result<Self> {
    let mut columns: Vec<&str> = KEY_COLUMNS.to_vec();
    let mut params: Vec<Value> = record.key.columns().into_iter().map(Value::Text).collect();

    if let Some(gid) = &record.gid {
      columns.push(GID_COLUMN);
      params.push(Value::Text(encode_gid(gid)?));
    }
    for (name, value) in &record.values {
      columns.push(*name);
      params.push(encode_value(value)?);
    }

    let placeholders = (1..=columns.len())
      .map(|i| format!("?{i}"))
      .collect::<Vec<_>>()
      .join(", ");
    let table = destination.name();
    let column_list = columns.join(", ");

    let sql = match policy {
      ConflictPolicy::Replace => {
        format!("INSERT OR REPLACE INTO {table} ({column_list}) VALUES ({placeholders})")
      }
      ConflictPolicy::Merge => {
        let updates = columns[KEY_COLUMNS.len()..]
          .iter()
          .map(|c| format!("{c} = excluded.{c}"))
          .collect::<Vec<_>>();
        let action = if updates.is_empty() {
          "DO NOTHING".to_owned()
        } else {
          format!("DO UPDATE SET {}", updates.join(", "))
        };
        format!(
          "INSERT INTO {table} ({column_list}) VALUES ({placeholders})
           ON CONFLICT ({key}) {action}",
          key = KEY_COLUMNS.join(", "),
        )
      }
    };

    Ok(Self { sql, params })
  }

  pub fn execute(&self, conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(&self.sql, params_from_iter(self.params.iter()))
  }
}

/// All rows of `destination` for `source`, ordered by natural key.
pub fn select_rows(
  conn: &Connection,
  destination: Destination,
  source: &str,
) -> rusqlite::Result<Vec<RawRow>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT * FROM {} WHERE source = ?1 ORDER BY {}",
    destination.name(),
    KEY_COLUMNS.join(", "),
  ))?;
  let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();

  stmt
    .query_map([source], |row| {
      let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| Ok((name.clone(), row.get::<_, Value>(i)?)))
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(RawRow { columns })
    })?
    .collect()
}

/// Every division registered for `country_code` (case-insensitive).
pub fn select_divisions(
  conn: &Connection,
  country_code: &str,
) -> rusqlite::Result<Vec<RawDivision>> {
  let mut stmt = conn.prepare(
    "SELECT countrycode, adm_area_1, adm_area_2, adm_area_3, gid
     FROM administrative_division
     WHERE countrycode = ?1 COLLATE NOCASE",
  )?;
  stmt
    .query_map([country_code], |row| {
      Ok(RawDivision {
        country_code: row.get(0)?,
        adm_area_1:   row.get(1)?,
        adm_area_2:   row.get(2)?,
        adm_area_3:   row.get(3)?,
        gid:          row.get(4)?,
      })
    })?
    .collect()
}

pub fn insert_divisions(conn: &mut Connection, divisions: &[RawDivision]) -> rusqlite::Result<()> {
  let tx = conn.transaction()?;
  {
    let mut stmt = tx.prepare(
      "INSERT OR REPLACE INTO administrative_division
         (countrycode, adm_area_1, adm_area_2, adm_area_3, gid)
       VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for d in divisions {
      stmt.execute(rusqlite::params![
        d.country_code,
        d.adm_area_1,
        d.adm_area_2,
        d.adm_area_3,
        d.gid,
      ])?;
    }
  }
  tx.commit()
}
