//! Integration tests for the SQLite backends.

use epiharvest_core::{
  fact::{Destination, FactRecord, FieldValue, Fields, Table},
  region::{AdmDivision, RegionQuery},
  store::{ConflictPolicy, FactStore},
};
use tempfile::TempDir;

use crate::{EmbeddedStore, Error, RelationalStore, RetryPolicy};

const EPI: Destination = Destination::Table(Table::Epidemiology);

async fn relational() -> (TempDir, RelationalStore) {
  let dir = tempfile::tempdir().expect("tempdir");
  let store = RelationalStore::open(dir.path().join("facts.db"), RetryPolicy::immediate(3))
    .await
    .expect("relational store");
  (dir, store)
}

async fn embedded() -> EmbeddedStore {
  EmbeddedStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn durham() -> Fields {
  Fields::new()
    .with("source", "TEST")
    .with("date", "2020-04-01")
    .with("country", "United Kingdom")
    .with("country_code", "GBR")
    .with("adm_area_1", "England")
    .with("adm_area_2", "County Durham")
    .with("gid", vec!["GBR.1.30_1".to_owned()])
}

// ─── Relational: merge-on-conflict ───────────────────────────────────────────

#[tokio::test]
async fn relational_reports_merge_policy() {
  let (_dir, s) = relational().await;
  assert_eq!(s.conflict_policy(), ConflictPolicy::Merge);
}

#[tokio::test]
async fn relational_upsert_is_idempotent() {
  let (_dir, s) = relational().await;
  for _ in 0..3 {
    s.upsert_epidemiology(durham().with("confirmed", 5)).await.unwrap();
  }

  let rows = s.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].get("confirmed"), Some(&FieldValue::Integer(5)));
  assert_eq!(rows[0].gid.as_deref(), Some(&["GBR.1.30_1".to_owned()][..]));
}

#[tokio::test]
async fn relational_merges_fields_from_later_writes() {
  let (_dir, s) = relational().await;
  s.upsert_epidemiology(durham().with("confirmed", 5)).await.unwrap();
  s.upsert_epidemiology(durham().with("dead", 2)).await.unwrap();

  let rows = s.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].get("confirmed"), Some(&FieldValue::Integer(5)));
  assert_eq!(rows[0].get("dead"), Some(&FieldValue::Integer(2)));
}

#[tokio::test]
async fn relational_later_value_overwrites_same_field() {
  let (_dir, s) = relational().await;
  s.upsert_epidemiology(durham().with("confirmed", 5)).await.unwrap();
  s.upsert_epidemiology(durham().with("confirmed", 7)).await.unwrap();

  let rows = s.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows[0].get("confirmed"), Some(&FieldValue::Integer(7)));
}

#[tokio::test]
async fn relational_keeps_geocode_when_later_write_omits_it() {
  let (_dir, s) = relational().await;
  s.upsert_epidemiology(durham().with("confirmed", 5)).await.unwrap();

  let mut without_gid = durham().with("confirmed", 6);
  without_gid.remove("gid");
  s.upsert_epidemiology(without_gid).await.unwrap();

  let rows = s.rows(EPI, "TEST").await.unwrap();
  assert!(rows[0].has_geocode());
}

#[tokio::test]
async fn key_only_upsert_creates_row_once() {
  let (_dir, s) = relational().await;
  let mut bare = durham();
  bare.remove("gid");
  s.upsert_epidemiology(bare.clone()).await.unwrap();
  s.upsert_epidemiology(bare).await.unwrap();

  assert_eq!(s.rows(EPI, "TEST").await.unwrap().len(), 1);
}

// ─── Embedded: replace-on-conflict ───────────────────────────────────────────

#[tokio::test]
async fn embedded_reports_replace_policy() {
  assert_eq!(embedded().await.conflict_policy(), ConflictPolicy::Replace);
}

#[tokio::test]
async fn embedded_upsert_is_idempotent() {
  let s = embedded().await;
  for _ in 0..3 {
    s.upsert_epidemiology(durham().with("confirmed", 5)).await.unwrap();
  }
  let rows = s.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].get("confirmed"), Some(&FieldValue::Integer(5)));
}

#[tokio::test]
async fn embedded_replaces_whole_row() {
  let s = embedded().await;
  s.upsert_epidemiology(durham().with("confirmed", 5)).await.unwrap();
  s.upsert_epidemiology(durham().with("dead", 2)).await.unwrap();

  let rows = s.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].get("confirmed"), None);
  assert_eq!(rows[0].get("dead"), Some(&FieldValue::Integer(2)));
}

// ─── Shared key semantics ────────────────────────────────────────────────────

#[tokio::test]
async fn absent_and_empty_admin_levels_share_one_row() {
  let (_dir, s) = relational().await;
  s.upsert_epidemiology(durham().with("confirmed", 1)).await.unwrap();
  s.upsert_epidemiology(durham().with("adm_area_3", "").with("dead", 1))
    .await
    .unwrap();

  let rows = s.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].key.adm_area_3, "");
}

#[tokio::test]
async fn distinct_keys_are_distinct_rows() {
  let s = embedded().await;
  s.upsert_epidemiology(durham()).await.unwrap();
  s.upsert_epidemiology(durham().with("date", "2020-04-02")).await.unwrap();
  s.upsert_epidemiology(durham().with("adm_area_2", "Kent")).await.unwrap();
  s.upsert_epidemiology(durham().with("source", "OTHER")).await.unwrap();

  assert_eq!(s.rows(EPI, "TEST").await.unwrap().len(), 3);
  assert_eq!(s.rows(EPI, "OTHER").await.unwrap().len(), 1);
}

#[tokio::test]
async fn staging_is_a_separate_table() {
  let s = embedded().await;
  let record = FactRecord::new(Table::Epidemiology, durham().with("confirmed", 3)).unwrap();
  s.upsert(Destination::EpidemiologyStaging, &record).await.unwrap();

  assert!(s.rows(EPI, "TEST").await.unwrap().is_empty());
  assert_eq!(s.rows(Destination::EpidemiologyStaging, "TEST").await.unwrap(), vec![record]);
}

#[tokio::test]
async fn every_table_round_trips() {
  let (_dir, s) = relational().await;
  s.upsert_government_response(
    durham()
      .with("stringency", 71.3)
      .with("actions", r#"{"C1":"2"}"#),
  )
  .await
  .unwrap();
  s.upsert_mobility(durham().with("residential", 12.0).with("parks", -30))
    .await
    .unwrap();
  let mut weather = durham().with("temperature_mean_avg", 8.25);
  weather.remove("country");
  s.upsert_weather(weather).await.unwrap();

  let gov = s.rows(Table::GovernmentResponse.into(), "TEST").await.unwrap();
  assert_eq!(gov[0].get("stringency"), Some(&FieldValue::Real(71.3)));
  assert_eq!(gov[0].get("actions"), Some(&FieldValue::Text(r#"{"C1":"2"}"#.into())));

  let mobility = s.rows(Table::Mobility.into(), "TEST").await.unwrap();
  assert_eq!(mobility[0].get("parks"), Some(&FieldValue::Real(-30.0)));

  let weather = s.rows(Table::Weather.into(), "TEST").await.unwrap();
  assert_eq!(weather[0].key.country, "");
  assert_eq!(weather[0].get("temperature_mean_avg"), Some(&FieldValue::Real(8.25)));
}

#[tokio::test]
async fn missing_key_field_is_rejected_before_storage() {
  let s = embedded().await;
  let mut fields = durham();
  fields.remove("date");
  let err = s.upsert_epidemiology(fields).await.unwrap_err();
  assert!(matches!(err, Error::Core(epiharvest_core::Error::MissingKeyField { .. })));
}

// ─── Administrative division reference ───────────────────────────────────────

fn division(a1: &str, a2: Option<&str>, gid: &str) -> AdmDivision {
  AdmDivision {
    country_code: "GBR".into(),
    adm_area_1:   Some(a1.into()),
    adm_area_2:   a2.map(str::to_owned),
    adm_area_3:   None,
    gid:          vec![gid.into()],
  }
}

#[tokio::test]
async fn reference_lookup_is_case_insensitive_and_exact_depth() {
  let s = embedded().await;
  s.load_adm_divisions(vec![
    division("England", None, "GBR.1_1"),
    division("England", Some("County Durham"), "GBR.1.30_1"),
  ])
  .await
  .unwrap();

  let hit = s
    .lookup_adm_division(&RegionQuery::new("gbr").adm1("england").adm2("COUNTY DURHAM"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(hit.gid, vec!["GBR.1.30_1".to_owned()]);
  assert_eq!(hit.adm_area_2.as_deref(), Some("County Durham"));

  let country = s
    .lookup_adm_division(&RegionQuery::new("GBR").adm1("England"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(country.gid, vec!["GBR.1_1".to_owned()]);

  let miss = s
    .lookup_adm_division(&RegionQuery::new("GBR").adm1("Narnia"))
    .await
    .unwrap();
  assert!(miss.is_none());
}

#[tokio::test]
async fn reference_lookup_without_country_code_misses() {
  let (_dir, s) = relational().await;
  s.load_adm_divisions(vec![division("England", None, "GBR.1_1")]).await.unwrap();

  let query = RegionQuery { adm_area_1: Some("England".into()), ..Default::default() };
  assert!(s.lookup_adm_division(&query).await.unwrap().is_none());
}

#[tokio::test]
async fn reference_lookup_ignores_ambiguous_names() {
  let (_dir, s) = relational().await;
  s.load_adm_divisions(vec![
    division("England", Some("Kent"), "A"),
    division("England", Some("  kent "), "B"),
  ])
  .await
  .unwrap();

  let query = RegionQuery::new("GBR").adm1("England").adm2("Kent");
  assert!(s.lookup_adm_division(&query).await.unwrap().is_none());
}

// ─── Retry ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn relational_reconnects_after_connection_loss() {
  let (_dir, s) = relational().await;
  s.upsert_epidemiology(durham().with("confirmed", 5)).await.unwrap();

  let conn = s.conn.lock().await.clone();
  conn.close().await.unwrap();

  s.upsert_epidemiology(durham().with("dead", 1)).await.unwrap();

  let rows = s.rows(EPI, "TEST").await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].get("confirmed"), Some(&FieldValue::Integer(5)));
  assert_eq!(rows[0].get("dead"), Some(&FieldValue::Integer(1)));
}

#[tokio::test]
async fn relational_gives_up_after_retry_budget() {
  let dir = tempfile::tempdir().unwrap();
  let nested = dir.path().join("gone");
  std::fs::create_dir(&nested).unwrap();
  let s = RelationalStore::open(nested.join("facts.db"), RetryPolicy::immediate(3))
    .await
    .unwrap();

  let conn = s.conn.lock().await.clone();
  conn.close().await.unwrap();
  std::fs::remove_dir_all(&nested).unwrap();

  let err = s.upsert_epidemiology(durham()).await.unwrap_err();
  assert!(matches!(err, Error::RetriesExhausted { attempts: 3, operation: "upsert", .. }));
}

#[test]
fn transient_classification() {
  use crate::retry::is_transient;

  assert!(is_transient(&tokio_rusqlite::Error::ConnectionClosed));

  let busy = rusqlite::Error::SqliteFailure(
    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
    None,
  );
  assert!(is_transient(&tokio_rusqlite::Error::Rusqlite(busy)));

  let constraint = rusqlite::Error::SqliteFailure(
    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
    None,
  );
  assert!(!is_transient(&tokio_rusqlite::Error::Rusqlite(constraint)));
}
