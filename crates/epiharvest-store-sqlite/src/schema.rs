//! SQL schema for the epiharvest SQLite stores.
//!
//! Executed on every (re)connect. Fact tables are generated from the column
//! whitelists in `epiharvest-core` so the DDL cannot drift from validation.

use epiharvest_core::fact::{ColumnKind, Destination};

/// Pragmas and the administrative division register; idempotent thanks to
/// `CREATE TABLE IF NOT EXISTS`.
const PREAMBLE: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS administrative_division (
    countrycode TEXT NOT NULL,
    adm_area_1  TEXT NOT NULL DEFAULT '',
    adm_area_2  TEXT NOT NULL DEFAULT '',
    adm_area_3  TEXT NOT NULL DEFAULT '',
    gid         TEXT NOT NULL,              -- JSON array of geocodes
    PRIMARY KEY (countrycode, adm_area_1, adm_area_2, adm_area_3)
);
";

/// Full schema DDL.
pub fn schema() -> String {
  let mut sql = PREAMBLE.to_owned();
  for destination in Destination::ALL {
    sql.push_str(&fact_table(destination));
  }
  sql.push_str("PRAGMA user_version = 1;\n");
  sql
}

// Optional key components are NOT NULL DEFAULT '' so that SQLite's
// "NULL is distinct from NULL" rule can never split one natural key in two.
fn fact_table(destination: Destination) -> String {
  let measures = destination
    .table()
    .measures()
    .iter()
    .map(|c| {
      let kind = match c.kind {
        ColumnKind::Integer => "INTEGER",
        ColumnKind::Real => "REAL",
        ColumnKind::Text => "TEXT",
      };
      format!("    {} {kind},\n", c.name)
    })
    .collect::<String>();

  format!(
    "
CREATE TABLE IF NOT EXISTS {name} (
    source      TEXT NOT NULL,
    date        TEXT NOT NULL,              -- YYYY-MM-DD
    country     TEXT NOT NULL DEFAULT '',
    countrycode TEXT NOT NULL,
    adm_area_1  TEXT NOT NULL DEFAULT '',
    adm_area_2  TEXT NOT NULL DEFAULT '',
    adm_area_3  TEXT NOT NULL DEFAULT '',
    gid         TEXT,                       -- JSON array of geocodes or NULL
{measures}    PRIMARY KEY (source, date, country, countrycode, adm_area_1, adm_area_2, adm_area_3)
);
CREATE INDEX IF NOT EXISTS {name}_date_idx ON {name}(date);
",
    name = destination.name(),
  )
}
