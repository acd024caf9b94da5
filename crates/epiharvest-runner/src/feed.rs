//! [`FeedProducer`] — a generic producer for denormalised CSV feeds.
//!
//! A feed row names its region in free text (`countrycode`, `adm_area_1..3`)
//! alongside its measurements; one feed fills one table for one source.

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context as _, anyhow};
use epiharvest_core::{
  fact::{ColumnKind, FieldValue, Fields, Table, canonical_column},
  region::{RegionQuery, non_blank},
  store::FactStore,
};

use crate::{
  FeedConfig,
  ingest::{Ingest, apply_lookup},
  producer::{Producer, ProducerFuture},
  registry::{ProducerEntry, Registry},
};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a feed is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
  Path(PathBuf),
  Url(String),
}

impl FromStr for FeedLocation {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(if s.starts_with("http://") || s.starts_with("https://") {
      FeedLocation::Url(s.to_owned())
    } else {
      FeedLocation::Path(PathBuf::from(s))
    })
  }
}

impl fmt::Display for FeedLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FeedLocation::Path(p) => write!(f, "{}", p.display()),
      FeedLocation::Url(u) => f.write_str(u),
    }
  }
}

#[derive(Debug, Clone)]
pub struct FeedProducer {
  source:   String,
  table:    Table,
  location: FeedLocation,
}

impl FeedProducer {
  pub fn new(source: impl Into<String>, table: Table, location: FeedLocation) -> Self {
    Self { source: source.into(), table, location }
  }

  pub fn from_config(config: &FeedConfig) -> Self {
    let Ok(location) = config.location.parse::<FeedLocation>();
    Self::new(config.source.clone(), config.table, location)
  }

  async fn fetch(&self) -> anyhow::Result<String> {
    match &self.location {
      FeedLocation::Path(path) => tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display())),
      FeedLocation::Url(url) => {
        let client = reqwest::Client::builder()
          .timeout(FETCH_TIMEOUT)
          .build()
          .context("failed to build HTTP client")?;
        let resp = client
          .get(url)
          .send()
          .await
          .with_context(|| format!("GET {url} failed"))?;
        if !resp.status().is_success() {
          return Err(anyhow!("GET {url} → {}", resp.status()));
        }
        resp.text().await.with_context(|| format!("reading body of {url}"))
      }
    }
  }

  async fn ingest_rows<S: FactStore>(
    &self,
    text: &str,
    ingest: &mut Ingest<S>,
  ) -> anyhow::Result<()> {
    let mut reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
      .headers()
      .context("feed has no header row")?
      .iter()
      .map(|h| canonical_column(&h.to_lowercase()).to_owned())
      .collect();

    for (index, row) in reader.records().enumerate() {
      let row_number = index + 1;
      let row = row.with_context(|| format!("row {row_number}: malformed CSV"))?;
      let cells: Vec<(&str, &str)> = headers
        .iter()
        .map(String::as_str)
        .zip(row.iter())
        .filter(|(_, cell)| !cell.is_empty())
        .collect();

      let fields = self.fields(&cells).with_context(|| format!("row {row_number}"))?;
      let query = region_query(&cells);
      let lookup = ingest.resolve_region(&query).await?;
      ingest
        .upsert(self.table, apply_lookup(fields, lookup))
        .await
        .with_context(|| format!("row {row_number}"))?;
    }
    Ok(())
  }

  fn fields(&self, cells: &[(&str, &str)]) -> anyhow::Result<Fields> {
    let mut fields = Fields::new();
    for &(name, cell) in cells {
      let kind = self.table.measure(name).map(|c| c.kind).unwrap_or(ColumnKind::Text);
      let value = match kind {
        ColumnKind::Integer => cell
          .parse::<i64>()
          .map(FieldValue::Integer)
          .map_err(|_| anyhow!("{name}: expected an integer, got {cell:?}"))?,
        ColumnKind::Real => cell
          .parse::<f64>()
          .map(FieldValue::Real)
          .map_err(|_| anyhow!("{name}: expected a number, got {cell:?}"))?,
        ColumnKind::Text => FieldValue::Text(cell.to_owned()),
      };
      fields.insert(name, value);
    }
    Ok(fields)
  }
}

fn region_query(cells: &[(&str, &str)]) -> RegionQuery {
  let cell = |name: &str| non_blank(cells.iter().find(|(n, _)| *n == name).map(|(_, c)| *c));
  RegionQuery {
    country_code: cell("countrycode"),
    adm_area_1:   cell("adm_area_1"),
    adm_area_2:   cell("adm_area_2"),
    adm_area_3:   cell("adm_area_3"),
  }
}

impl<S: FactStore> Producer<S> for FeedProducer {
  fn source(&self) -> &str { &self.source }

  fn run<'a>(&'a self, ingest: &'a mut Ingest<S>) -> ProducerFuture<'a> {
    Box::pin(async move {
      let text = self.fetch().await?;
      tracing::debug!(
        source = %self.source,
        location = %self.location,
        bytes = text.len(),
        "fetched feed"
      );
      self.ingest_rows(&text, ingest).await
    })
  }
}

/// One registry entry per configured feed.
pub fn feed_registry<S: FactStore + 'static>(feeds: &[FeedConfig]) -> Registry<S> {
  let mut registry = Registry::new();
  for feed in feeds {
    let producer = FeedProducer::from_config(feed);
    let mut entry = ProducerEntry::new(feed.source.clone(), move || {
      Ok(Box::new(producer.clone()) as Box<dyn Producer<S>>)
    })
    .enabled(feed.enabled);
    if let Some(mapping) = &feed.mapping {
      entry = entry.with_mapping(mapping.clone());
    }
    registry.register(entry);
  }
  registry
}
