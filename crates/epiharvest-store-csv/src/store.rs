//! [`CsvStore`] — the buffered flat-file backend.

use std::{
  collections::BTreeMap,
  fs,
  path::{Path, PathBuf},
  sync::{Mutex, MutexGuard},
};

use epiharvest_core::{
  fact::{Destination, FactRecord, NaturalKey},
  region::{AdmDivision, RegionQuery, unique_match},
  store::{ConflictPolicy, FactStore},
};

use crate::{
  Error, Result,
  encode::{self, DivisionRow},
};

const DIVISION_FILE: &str = "administrative_division.csv";

/// A fact store writing one CSV file per (destination, source).
///
/// Rows for the most recently written pair are held in memory. Switching to
/// another pair, calling [`FactStore::flush`], or dropping the store rewrites
/// that pair's file in full. A conflicting upsert replaces the buffered row.
pub struct CsvStore {
  dir:   PathBuf,
  state: Mutex<State>,
}

#[derive(Default)]
struct State {
  buffer:    Option<Buffer>,
  /// Loaded on first use.
  divisions: Option<Vec<AdmDivision>>,
}

struct Buffer {
  destination: Destination,
  source:      String,
  rows:        BTreeMap<NaturalKey, FactRecord>,
  dirty:       bool,
}

impl Buffer {
  fn holds(&self, destination: Destination, source: &str) -> bool {
    self.destination == destination && self.source == source
  }
}

impl CsvStore {
  /// Use `dir` as the data directory, creating it if needed.
  pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    fs::create_dir_all(&dir).map_err(|source| Error::Io { path: dir.clone(), source })?;
    Ok(Self { dir, state: Mutex::new(State::default()) })
  }

  /// `<dir>/<table>/<source>.csv`
  fn file_path(&self, destination: Destination, source: &str) -> Result<PathBuf> {
    let stem = file_stem(source)?;
    Ok(self.dir.join(destination.name()).join(format!("{stem}.csv")))
  }

  fn lock(&self) -> Result<MutexGuard<'_, State>> {
    self.state.lock().map_err(|_| Error::Poisoned)
  }

  // ── Fact files ─────────────────────────────────────────────────────────

  fn read_file(&self, destination: Destination, source: &str) -> Result<Vec<FactRecord>> {
    let path = self.file_path(destination, source)?;
    if !path.exists() {
      return Ok(Vec::new());
    }
    let csv_err = |source| Error::Csv { path: path.clone(), source };

    let mut reader = csv::Reader::from_path(&path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let mut rows = Vec::new();
    for row in reader.records() {
      let record = encode::decode_record(destination, &headers, &row.map_err(csv_err)?, &path)?;
      if record.key.source == source {
        rows.push(record);
      } else {
        tracing::warn!(
          path = %path.display(),
          source = %record.key.source,
          "skipping row belonging to another source"
        );
      }
    }
    Ok(rows)
  }

  fn write_file(&self, buffer: &Buffer) -> Result<()> {
    let path = self.file_path(buffer.destination, &buffer.source)?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    replace_file(&path, |writer| {
      writer.write_record(encode::header(buffer.destination))?;
      for record in buffer.rows.values() {
        writer.write_record(encode::encode_record(record))?;
      }
      Ok(())
    })?;
    tracing::debug!(
      table = buffer.destination.name(),
      source = %buffer.source,
      rows = buffer.rows.len(),
      "wrote fact file"
    );
    Ok(())
  }

  fn flush_buffer(&self, state: &mut State) -> Result<()> {
    if let Some(buffer) = state.buffer.as_ref().filter(|b| b.dirty) {
      self.write_file(buffer)?;
    }
    state.buffer = None;
    Ok(())
  }

  /// Make `state.buffer` hold the pair, flushing whatever it held before.
  fn buffer_for<'s>(
    &self,
    state: &'s mut State,
    destination: Destination,
    source: &str,
  ) -> Result<&'s mut Buffer> {
    let buffer = match state.buffer.take_if(|b| b.holds(destination, source)) {
      Some(current) => current,
      None => {
        self.flush_buffer(state)?;
        let rows = self
          .read_file(destination, source)?
          .into_iter()
          .map(|r| (r.key.clone(), r))
          .collect();
        Buffer { destination, source: source.to_owned(), rows, dirty: false }
      }
    };
    Ok(state.buffer.insert(buffer))
  }

  // ── Division register ──────────────────────────────────────────────────

  fn division_path(&self) -> PathBuf { self.dir.join(DIVISION_FILE) }

  fn divisions<'s>(&self, state: &'s mut State) -> Result<&'s mut Vec<AdmDivision>> {
    let divisions = match state.divisions.take() {
      Some(loaded) => loaded,
      None => self.read_divisions()?,
    };
    Ok(state.divisions.insert(divisions))
  }

  fn read_divisions(&self) -> Result<Vec<AdmDivision>> {
    let path = self.division_path();
    if !path.exists() {
      return Ok(Vec::new());
    }
    let csv_err = |source| Error::Csv { path: path.clone(), source };
    csv::Reader::from_path(&path)
      .map_err(csv_err)?
      .deserialize::<DivisionRow>()
      .map(|row| row.map(AdmDivision::from).map_err(csv_err))
      .collect()
  }

  fn write_divisions(&self, divisions: &[AdmDivision]) -> Result<()> {
    replace_file(&self.division_path(), |writer| {
      for division in divisions {
        writer.serialize(DivisionRow::from(division))?;
      }
      Ok(())
    })
  }
}

impl Drop for CsvStore {
  fn drop(&mut self) {
    let state = match self.state.get_mut() {
      Ok(state) => state,
      Err(poisoned) => poisoned.into_inner(),
    };
    let Some(buffer) = state.buffer.take().filter(|b| b.dirty) else {
      return;
    };
    if let Err(e) = self.write_file(&buffer) {
      tracing::error!(
        table = buffer.destination.name(),
        source = %buffer.source,
        error = %e,
        "failed to flush fact file on drop"
      );
    }
  }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error {
  let path = path.to_path_buf();
  move |source| Error::Io { path, source }
}

/// Write `path` through a sibling `.tmp` file renamed into place.
fn replace_file<F>(path: &Path, write: F) -> Result<()>
where
  F: FnOnce(&mut csv::Writer<fs::File>) -> csv::Result<()>,
{
  let mut tmp = path.as_os_str().to_owned();
  tmp.push(".tmp");
  let tmp = PathBuf::from(tmp);

  let mut writer = csv::Writer::from_path(&tmp)
    .map_err(|source| Error::Csv { path: tmp.clone(), source })?;
  write(&mut writer).map_err(|source| Error::Csv { path: tmp.clone(), source })?;
  writer.flush().map_err(io_err(&tmp))?;
  drop(writer);
  fs::rename(&tmp, path).map_err(io_err(path))
}

/// Source tags are file names verbatim: `[A-Za-z0-9_.-]`, no leading dot.
fn file_stem(source: &str) -> Result<&str> {
  let valid = !source.is_empty()
    && !source.starts_with('.')
    && source.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
  if valid { Ok(source) } else { Err(Error::InvalidSource(source.to_owned())) }
}

impl FactStore for CsvStore {
  type Error = Error;

  fn conflict_policy(&self) -> ConflictPolicy { ConflictPolicy::Replace }

  async fn upsert(&self, destination: Destination, record: &FactRecord) -> Result<()> {
    let mut state = self.lock()?;
    let buffer = self.buffer_for(&mut state, destination, &record.key.source)?;
    buffer.rows.insert(record.key.clone(), record.clone());
    buffer.dirty = true;
    Ok(())
  }

  async fn flush(&self) -> Result<()> {
    let mut state = self.lock()?;
    self.flush_buffer(&mut state)
  }

  async fn lookup_adm_division(&self, query: &RegionQuery) -> Result<Option<AdmDivision>> {
    let mut state = self.lock()?;
    let divisions = self.divisions(&mut state)?;
    Ok(unique_match(divisions.iter(), query).cloned())
  }

  async fn load_adm_divisions(&self, incoming: Vec<AdmDivision>) -> Result<()> {
    let mut state = self.lock()?;
    let divisions = self.divisions(&mut state)?;
    for division in incoming {
      match divisions.iter_mut().find(|d| encode::same_slot(d, &division)) {
        Some(slot) => *slot = division,
        None => divisions.push(division),
      }
    }
    self.write_divisions(divisions)
  }

  async fn rows(&self, destination: Destination, source: &str) -> Result<Vec<FactRecord>> {
    let state = self.lock()?;
    match &state.buffer {
      Some(buffer) if buffer.holds(destination, source) => {
        Ok(buffer.rows.values().cloned().collect())
      }
      _ => {
        let mut rows = self.read_file(destination, source)?;
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
      }
    }
  }
}
