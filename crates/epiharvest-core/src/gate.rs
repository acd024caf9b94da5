//! The pre-upsert gate: sliding-window filter and table routing.

use chrono::{NaiveDate, Utc};

use crate::fact::{Destination, FactRecord, Table};

/// Decides whether a record reaches storage, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
  window_days: Option<u32>,
  validate:    bool,
  today:       NaiveDate,
}

impl Gate {
  /// A gate evaluated against today's UTC date.
  pub fn new(window_days: Option<u32>, validate: bool) -> Self {
    Self { window_days, validate, today: Utc::now().date_naive() }
  }

  pub fn with_today(mut self, today: NaiveDate) -> Self {
    self.today = today;
    self
  }

  /// `false` when `date` is older than the window. Future dates always pass.
  pub fn admits(&self, date: NaiveDate) -> bool {
    match self.window_days {
      Some(window) => (self.today - date).num_days() <= i64::from(window),
      None => true,
    }
  }

  /// Validation mode sends epidemiology to its staging table.
  pub fn route(&self, table: Table) -> Destination {
    match table {
      Table::Epidemiology if self.validate => Destination::EpidemiologyStaging,
      t => Destination::Table(t),
    }
  }

  /// `None` when the record is stale and must be dropped.
  pub fn check(&self, record: &FactRecord) -> Option<Destination> {
    self
      .admits(record.key.date)
      .then(|| self.route(record.table))
  }
}
