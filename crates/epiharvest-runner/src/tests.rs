//! Tests for the ingestion context, runner, feed producer and configuration.

use std::{path::PathBuf, sync::Arc};

use chrono::NaiveDate;
use epiharvest_core::{
  fact::{Destination, FieldValue, Fields, Table},
  region::{AdmDivision, RegionQuery},
  store::FactStore,
};
use epiharvest_store_csv::CsvStore;
use epiharvest_store_sqlite::{EmbeddedStore, RetryPolicy};
use tempfile::TempDir;

use crate::{
  BackendConfig, FeedConfig, HarvestConfig, Outcome, Producer, ProducerEntry, ProducerFuture,
  Registry, RunSettings, Runner, feed_registry,
  ingest::{Ingest, apply_lookup},
};

const EPI: Destination = Destination::Table(Table::Epidemiology);

const MAPPING: &str = "\
input_admin_1,input_admin_2,input_admin_3,admin_1,admin_2,admin_3,geocode
england,county durham,,England,County Durham,,GBR.1.30_1
";

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

/// A mapping directory holding `GBR.csv`.
fn mapping_dir() -> TempDir {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("GBR.csv"), MAPPING).unwrap();
  dir
}

fn settings(mappings: &TempDir) -> RunSettings {
  RunSettings {
    mapping_dir: mappings.path().to_path_buf(),
    today: Some(date(2020, 4, 11)),
    ..RunSettings::default()
  }
}

async fn memory_store() -> Arc<EmbeddedStore> {
  Arc::new(EmbeddedStore::open_in_memory().await.unwrap())
}

// ─── Test producers ──────────────────────────────────────────────────────────

/// Resolves County Durham through the ingestion context and stores the
/// worked-example record twice.
#[derive(Clone)]
struct Durham;

impl<S: FactStore> Producer<S> for Durham {
  fn source(&self) -> &str { "TEST" }

  fn run<'a>(&'a self, ingest: &'a mut Ingest<S>) -> ProducerFuture<'a> {
    Box::pin(async move {
      let query = RegionQuery::new("GBR").adm1("england").adm2("county durham");
      for _ in 0..2 {
        let lookup = ingest.resolve_region(&query).await?;
        let fields = Fields::new()
          .with("date", "2020-04-01")
          .with("country", "United Kingdom")
          .with("countrycode", "GBR")
          .with("confirmed", 10);
        ingest.upsert_epidemiology(apply_lookup(fields, lookup)).await?;
      }
      Ok(())
    })
  }
}

/// Writes one epidemiology row per date, then optionally fails or panics.
#[derive(Clone)]
struct Scripted {
  source: &'static str,
  dates:  Vec<&'static str>,
  fail:   bool,
  panic:  bool,
}

impl Scripted {
  fn new(source: &'static str) -> Self {
    Self { source, dates: Vec::new(), fail: false, panic: false }
  }

  fn dates(self, dates: &[&'static str]) -> Self { Self { dates: dates.to_vec(), ..self } }

  fn failing(self) -> Self { Self { fail: true, ..self } }

  fn panicking(self) -> Self { Self { panic: true, ..self } }
}

impl<S: FactStore> Producer<S> for Scripted {
  fn source(&self) -> &str { self.source }

  fn run<'a>(&'a self, ingest: &'a mut Ingest<S>) -> ProducerFuture<'a> {
    Box::pin(async move {
      for date in &self.dates {
        let fields = Fields::new()
          .with("date", *date)
          .with("country", "United Kingdom")
          .with("countrycode", "GBR")
          .with("adm_area_1", "England")
          .with("confirmed", 1);
        ingest.upsert_epidemiology(fields).await?;
      }
      if self.panic {
        panic!("kaboom");
      }
      if self.fail {
        anyhow::bail!("boom");
      }
      Ok(())
    })
  }
}

/// Registers `producer` under the source tag it reports.
fn entry<S: FactStore + 'static, P>(producer: P) -> ProducerEntry<S>
where
  P: Producer<S> + Clone + 'static,
{
  let source = producer.source().to_owned();
  ProducerEntry::new(source, move || Ok(Box::new(producer.clone()) as Box<dyn Producer<S>>))
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn worked_example_stores_one_resolved_row() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  registry.register(entry(Durham).with_mapping("GBR.csv"));

  let runner = Runner::new(Arc::clone(&store), registry, settings(&mappings));
  let summary = runner.run(&[]).await;
  assert!(summary.all_succeeded(), "{summary:?}");
  assert_eq!(summary.outcomes[0].stats.stored, 2);

  let rows = store.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows.len(), 1);
  let row = &rows[0];
  assert_eq!(row.key.date, date(2020, 4, 1));
  assert_eq!(row.key.country_code, "GBR");
  assert_eq!(row.key.adm_area_1, "England");
  assert_eq!(row.key.adm_area_2, "County Durham");
  assert_eq!(row.key.adm_area_3, "");
  assert_eq!(row.gid, Some(vec!["GBR.1.30_1".to_owned()]));
  assert_eq!(row.get("confirmed"), Some(&FieldValue::Integer(10)));
}

#[tokio::test]
async fn reference_register_takes_precedence_over_mapping() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  store
    .load_adm_divisions(vec![AdmDivision {
      country_code: "GBR".into(),
      adm_area_1:   Some("England".into()),
      adm_area_2:   Some("County Durham".into()),
      adm_area_3:   None,
      gid:          vec!["REF.1".into()],
    }])
    .await
    .unwrap();

  let mut registry = Registry::new();
  registry.register(entry(Durham).with_mapping("GBR.csv"));
  Runner::new(Arc::clone(&store), registry, settings(&mappings)).run(&[]).await;

  let rows = store.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows[0].gid, Some(vec!["REF.1".to_owned()]));
}

// ─── Isolation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_producer_does_not_stop_the_batch() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  registry
    .register(entry(Scripted::new("A").dates(&["2020-04-01"])))
    .register(entry(Scripted::new("B").dates(&["2020-04-01"]).failing()))
    .register(entry(Scripted::new("C").dates(&["2020-04-01"])));

  let summary = Runner::new(Arc::clone(&store), registry, settings(&mappings)).run(&[]).await;

  assert_eq!(summary.outcomes.len(), 3);
  assert!(summary.outcome("A").unwrap().succeeded());
  assert!(summary.outcome("C").unwrap().succeeded());
  let failed: Vec<_> = summary.failed().collect();
  assert_eq!(failed.len(), 1);
  assert_eq!(failed[0].source, "B");
  assert!(matches!(&failed[0].outcome, Outcome::Failed(m) if m.contains("boom")));

  assert_eq!(store.rows(EPI, "A").await.unwrap().len(), 1);
  assert_eq!(store.rows(EPI, "C").await.unwrap().len(), 1);
  // Rows accepted before the failure are kept.
  assert_eq!(store.rows(EPI, "B").await.unwrap().len(), 1);
}

#[tokio::test]
async fn panicking_producer_is_reported_as_failed() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  registry
    .register(entry(Scripted::new("A").dates(&["2020-04-01"])))
    .register(entry(Scripted::new("B").panicking()))
    .register(entry(Scripted::new("C").dates(&["2020-04-01"])));

  let summary = Runner::new(store, registry, settings(&mappings)).run(&[]).await;

  assert_eq!(summary.outcomes.len(), 3);
  let b = summary.outcome("B").unwrap();
  assert!(matches!(
    &b.outcome,
    Outcome::Failed(m) if m.contains("panicked") && m.contains("kaboom")
  ));
  assert!(summary.outcome("C").unwrap().succeeded());
}

#[tokio::test]
async fn missing_mapping_file_fails_only_that_producer() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  registry
    .register(entry(Scripted::new("A").dates(&["2020-04-01"])).with_mapping("absent.csv"))
    .register(entry(Scripted::new("B").dates(&["2020-04-01"])));

  let summary = Runner::new(Arc::clone(&store), registry, settings(&mappings)).run(&[]).await;

  let a = summary.outcome("A").unwrap();
  assert!(matches!(&a.outcome, Outcome::Failed(m) if m.contains("absent.csv")));
  assert!(summary.outcome("B").unwrap().succeeded());
  assert!(store.rows(EPI, "A").await.unwrap().is_empty());
}

#[tokio::test]
async fn producer_must_report_its_registered_source() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  registry
    .register(ProducerEntry::new("X", || {
      let producer = Scripted::new("A").dates(&["2020-04-01"]);
      Ok(Box::new(producer) as Box<dyn Producer<EmbeddedStore>>)
    }))
    .register(entry(Scripted::new("B").dates(&["2020-04-01"])));

  let summary = Runner::new(Arc::clone(&store), registry, settings(&mappings)).run(&[]).await;

  let x = summary.outcome("X").unwrap();
  assert!(
    matches!(&x.outcome, Outcome::Failed(m) if m.contains("\"A\"") && m.contains("\"X\"")),
    "{x:?}"
  );
  assert!(summary.outcome("B").unwrap().succeeded());
  assert!(store.rows(EPI, "X").await.unwrap().is_empty());
  assert!(store.rows(EPI, "A").await.unwrap().is_empty());
}

// ─── Selection ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn allow_list_and_disabled_entries() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  registry
    .register(entry(Scripted::new("A")))
    .register(entry(Scripted::new("B")).enabled(false))
    .register(entry(Scripted::new("C")));

  let runner = Runner::new(store, registry, settings(&mappings));

  let all = runner.run(&[]).await;
  let sources: Vec<_> = all.outcomes.iter().map(|o| o.source.as_str()).collect();
  assert_eq!(sources, ["A", "C"]);

  let only = runner.run(&["C".to_owned(), "B".to_owned(), "Z".to_owned()]).await;
  let sources: Vec<_> = only.outcomes.iter().map(|o| o.source.as_str()).collect();
  assert_eq!(sources, ["C"]);
}

// ─── Gate ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sliding_window_drops_stale_records() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  // Today is 2020-04-11: ten days old and three days old.
  registry.register(entry(Scripted::new("A").dates(&["2020-04-01", "2020-04-08"])));

  let settings = RunSettings { window_days: Some(7), ..settings(&mappings) };
  let summary = Runner::new(Arc::clone(&store), registry, settings).run(&[]).await;

  let stats = summary.outcome("A").unwrap().stats;
  assert_eq!((stats.stored, stats.stale), (1, 1));
  let rows = store.rows(EPI, "A").await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].key.date, date(2020, 4, 8));
}

#[tokio::test]
async fn validation_mode_writes_to_staging() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  registry.register(entry(Scripted::new("A").dates(&["2020-04-01"])));

  let settings = RunSettings { validate: true, ..settings(&mappings) };
  Runner::new(Arc::clone(&store), registry, settings).run(&[]).await;

  assert!(store.rows(EPI, "A").await.unwrap().is_empty());
  assert_eq!(store.rows(Destination::EpidemiologyStaging, "A").await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_geocode_is_recorded_once_per_region() {
  let mappings = mapping_dir();
  let store = memory_store().await;
  let mut registry = Registry::new();
  let dates = ["2020-04-01", "2020-04-02", "2020-04-03"];
  registry.register(entry(Scripted::new("A").dates(&dates)));

  let summary = Runner::new(Arc::clone(&store), registry, settings(&mappings)).run(&[]).await;

  let outcome = summary.outcome("A").unwrap();
  assert_eq!(outcome.stats.stored, 3);
  let missing: Vec<_> = outcome.diagnostics.missing_geocodes().collect();
  assert_eq!(missing.len(), 1);
  assert_eq!(missing[0].adm_area_1, "England");
  // Stored anyway.
  assert_eq!(store.rows(EPI, "A").await.unwrap().len(), 3);
}

// ─── Backends ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_backend_is_flushed_after_each_producer() {
  let mappings = mapping_dir();
  let data = tempfile::tempdir().unwrap();
  let store = Arc::new(CsvStore::open(data.path()).unwrap());
  let mut registry = Registry::new();
  registry
    .register(entry(Scripted::new("A").dates(&["2020-04-01"])))
    .register(entry(Scripted::new("B").dates(&["2020-04-01"]).failing()));

  Runner::new(Arc::clone(&store), registry, settings(&mappings)).run(&[]).await;

  assert!(data.path().join("epidemiology/A.csv").exists());
  assert!(data.path().join("epidemiology/B.csv").exists());
}

// ─── Feed producer ───────────────────────────────────────────────────────────

fn feed(mappings: &TempDir, body: &str) -> FeedConfig {
  let path = mappings.path().join("feed.csv");
  std::fs::write(&path, body).unwrap();
  FeedConfig {
    source:   "GBR_TEST".into(),
    table:    Table::Epidemiology,
    location: path.display().to_string(),
    mapping:  Some(PathBuf::from("GBR.csv")),
    enabled:  true,
  }
}

#[tokio::test]
async fn feed_producer_resolves_and_stores_rows() {
  let mappings = mapping_dir();
  let config = feed(
    &mappings,
    "\
date,country,countrycode,adm_area_1,adm_area_2,adm_area_3,confirmed,dead,comment
2020-04-01,United Kingdom,GBR,england,county durham,,10,1,dropped
2020-04-02,United Kingdom,GBR,narnia,,,5,,
",
  );
  let store = memory_store().await;
  let registry = feed_registry(&[config]);

  let summary = Runner::new(Arc::clone(&store), registry, settings(&mappings)).run(&[]).await;
  assert!(summary.all_succeeded(), "{summary:?}");

  let rows = store.rows(EPI, "GBR_TEST").await.unwrap();
  assert_eq!(rows.len(), 2);

  assert_eq!(rows[0].key.adm_area_2, "County Durham");
  assert_eq!(rows[0].gid, Some(vec!["GBR.1.30_1".to_owned()]));
  assert_eq!(rows[0].get("dead"), Some(&FieldValue::Integer(1)));

  // Unresolved: original names kept, no geocode, blank cell absent.
  assert_eq!(rows[1].key.adm_area_1, "narnia");
  assert_eq!(rows[1].gid, None);
  assert_eq!(rows[1].get("dead"), None);

  let diagnostics = &summary.outcomes[0].diagnostics;
  assert_eq!(diagnostics.unresolved().count(), 1);
  assert_eq!(diagnostics.missing_geocodes().count(), 1);
}

#[tokio::test]
async fn feed_producer_reports_malformed_number_with_row() {
  let mappings = mapping_dir();
  let config = feed(
    &mappings,
    "\
date,country,countrycode,adm_area_1,confirmed
2020-04-01,United Kingdom,GBR,england,10
2020-04-02,United Kingdom,GBR,england,ten
",
  );
  let store = memory_store().await;
  let summary =
    Runner::new(store, feed_registry(&[config]), settings(&mappings)).run(&[]).await;

  let outcome = &summary.outcomes[0];
  assert!(
    matches!(
      &outcome.outcome,
      Outcome::Failed(m) if m.contains("row 2") && m.contains("confirmed")
    ),
    "{outcome:?}"
  );
  // The first row went through before the failure.
  assert_eq!(outcome.stats.stored, 1);
}

#[tokio::test]
async fn feed_from_missing_file_fails() {
  let mappings = mapping_dir();
  let config = FeedConfig {
    source:   "GONE".into(),
    table:    Table::Mobility,
    location: "/nonexistent/feed.csv".into(),
    mapping:  None,
    enabled:  true,
  };
  let runner = Runner::new(memory_store().await, feed_registry(&[config]), settings(&mappings));
  let summary = runner.run(&[]).await;
  assert!(!summary.all_succeeded());
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[test]
fn config_defaults() {
  let config = HarvestConfig::from_toml("").unwrap();
  assert_eq!(config.mapping_dir, PathBuf::from("mappings"));
  assert_eq!(config.sliding_window_days, None);
  assert!(!config.validate);
  assert_eq!(config.backend.retry_policy(), Some(RetryPolicy::default()));
  assert!(config.feeds.is_empty());
}

#[test]
fn config_with_file_backend_and_feeds() {
  let config = HarvestConfig::from_toml(
    r#"
mapping_dir = "maps"
sliding_window_days = 14
validate = true

[backend]
kind = "file"
dir = "out"

[[feeds]]
source = "GOOGLE"
table = "mobility"
location = "https://example.org/mobility.csv"

[[feeds]]
source = "PHE"
table = "epidemiology"
location = "phe.csv"
mapping = "GBR_PHE.csv"
enabled = false
"#,
  )
  .unwrap();

  assert_eq!(config.sliding_window_days, Some(14));
  assert!(config.validate);
  assert_eq!(config.backend, BackendConfig::File { dir: PathBuf::from("out") });
  assert_eq!(config.backend.retry_policy(), None);
  assert_eq!(config.feeds.len(), 2);
  assert_eq!(config.feeds[0].table, Table::Mobility);
  assert!(config.feeds[0].enabled);
  assert_eq!(config.feeds[1].mapping, Some(PathBuf::from("GBR_PHE.csv")));
  assert!(!config.feeds[1].enabled);

  let settings = config.run_settings();
  assert_eq!(settings.mapping_dir, PathBuf::from("maps"));
  assert_eq!(settings.window_days, Some(14));
}

#[test]
fn feed_location_parsing() {
  use crate::FeedLocation;
  assert_eq!(
    "https://example.org/x.csv".parse::<FeedLocation>().unwrap(),
    FeedLocation::Url("https://example.org/x.csv".into())
  );
  assert_eq!(
    "data/x.csv".parse::<FeedLocation>().unwrap(),
    FeedLocation::Path(PathBuf::from("data/x.csv"))
  );
}
