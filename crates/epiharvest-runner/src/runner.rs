//! [`Runner`] — drives every selected producer against one shared store.

use std::{any::Any, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::NaiveDate;
use epiharvest_core::{diagnostics::Diagnostics, gate::Gate, store::FactStore};
use epiharvest_resolve::Resolver;
use serde::Serialize;

use crate::{
  ingest::{Ingest, IngestStats},
  registry::{ProducerEntry, Registry},
};

/// Run-wide knobs shared by every producer.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
  pub mapping_dir: PathBuf,
  pub window_days: Option<u32>,
  pub validate:    bool,
  /// Overrides the gate's notion of today.
  pub today:       Option<NaiveDate>,
}

impl RunSettings {
  fn gate(&self) -> Gate {
    let gate = Gate::new(self.window_days, self.validate);
    match self.today {
      Some(today) => gate.with_today(today),
      None => gate,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Outcome {
  Succeeded,
  Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ProducerOutcome {
  pub source:      String,
  pub outcome:     Outcome,
  pub stats:       IngestStats,
  pub diagnostics: Diagnostics,
}

impl ProducerOutcome {
  pub fn succeeded(&self) -> bool { self.outcome == Outcome::Succeeded }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
  pub outcomes: Vec<ProducerOutcome>,
}

impl RunSummary {
  pub fn outcome(&self, source: &str) -> Option<&ProducerOutcome> {
    self.outcomes.iter().find(|o| o.source == source)
  }

  pub fn failed(&self) -> impl Iterator<Item = &ProducerOutcome> {
    self.outcomes.iter().filter(|o| !o.succeeded())
  }

  pub fn all_succeeded(&self) -> bool { self.failed().next().is_none() }
}

pub struct Runner<S: FactStore> {
  store:    Arc<S>,
  registry: Registry<S>,
  settings: RunSettings,
}

impl<S: FactStore + 'static> Runner<S> {
  pub fn new(store: Arc<S>, registry: Registry<S>, settings: RunSettings) -> Self {
    Self { store, registry, settings }
  }

  /// Run the enabled producers (narrowed to `only` when non-empty) one after
  /// another. A producer failure is logged and recorded; it never stops the
  /// batch.
  pub async fn run(&self, only: &[String]) -> RunSummary {
    let mut summary = RunSummary::default();
    for entry in self.registry.select(only) {
      summary.outcomes.push(self.run_entry(entry).await);
    }
    tracing::info!(
      producers = summary.outcomes.len(),
      failed = summary.failed().count(),
      "batch finished"
    );
    summary
  }

  async fn run_entry(&self, entry: &ProducerEntry<S>) -> ProducerOutcome {
    let source = entry.source.clone();
    tracing::info!(source = %source, "running producer");

    let (result, stats, diagnostics) = self
      .drive(entry)
      .await
      .unwrap_or_else(|e| (Err(e), IngestStats::default(), Diagnostics::new()));

    // Flush even after a failure so rows already accepted are kept.
    let result = match (result, self.store.flush().await) {
      (Ok(()), Err(e)) => Err(anyhow::Error::new(e).context("flush failed")),
      (Err(e), Err(flush)) => {
        tracing::error!(source = %source, error = %flush, "flush failed");
        Err(e)
      }
      (result, Ok(())) => result,
    };

    let outcome = match result {
      Ok(()) => {
        tracing::info!(
          source = %source,
          stored = stats.stored,
          stale = stats.stale,
          "producer finished"
        );
        Outcome::Succeeded
      }
      Err(e) => {
        let message = format!("{e:#}");
        tracing::error!(source = %source, error = %message, "producer failed");
        Outcome::Failed(message)
      }
    };

    ProducerOutcome { source, outcome, stats, diagnostics }
  }

  /// Set up and run one producer on its own task. The outer error covers
  /// setup and panics; the inner result is the producer's own.
  async fn drive(
    &self,
    entry: &ProducerEntry<S>,
  ) -> anyhow::Result<(anyhow::Result<()>, IngestStats, Diagnostics)> {
    let resolver = match &entry.mapping {
      Some(file) => {
        let path = self.settings.mapping_dir.join(file);
        Resolver::load(&path)
          .with_context(|| format!("failed to load mapping {}", path.display()))?
      }
      None => Resolver::empty(),
    };
    let producer = entry.build().context("failed to build producer")?;
    if producer.source() != entry.source {
      anyhow::bail!(
        "producer identifies as {:?} but is registered as {:?}",
        producer.source(),
        entry.source
      );
    }
    let mut ingest =
      Ingest::new(entry.source.clone(), Arc::clone(&self.store), resolver, self.settings.gate());

    let task = tokio::spawn(async move {
      let result = producer.run(&mut ingest).await;
      (result, ingest)
    });

    match task.await {
      Ok((result, ingest)) => {
        let (stats, diagnostics) = ingest.into_parts();
        Ok((result, stats, diagnostics))
      }
      Err(e) if e.is_panic() => Err(anyhow::anyhow!("panicked: {}", panic_message(e.into_panic()))),
      Err(e) => Err(anyhow::Error::new(e).context("producer task was cancelled")),
    }
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  match payload.downcast::<String>() {
    Ok(s) => *s,
    Err(payload) => match payload.downcast::<&'static str>() {
      Ok(s) => (*s).to_owned(),
      Err(_) => "non-string panic payload".to_owned(),
    },
  }
}
