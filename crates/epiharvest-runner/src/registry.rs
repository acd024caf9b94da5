//! [`Registry`] — the compiled-in list of producers.

use std::path::PathBuf;

use epiharvest_core::store::FactStore;

use crate::producer::Producer;

/// Builds a fresh producer for one run.
pub type ProducerFactory<S> =
  Box<dyn Fn() -> anyhow::Result<Box<dyn Producer<S>>> + Send + Sync>;

pub struct ProducerEntry<S: FactStore> {
  pub source:  String,
  pub enabled: bool,
  /// Mapping file name, relative to the configured mapping directory.
  pub mapping: Option<PathBuf>,
  factory:     ProducerFactory<S>,
}

impl<S: FactStore> ProducerEntry<S> {
  pub fn new<F>(source: impl Into<String>, factory: F) -> Self
  where
    F: Fn() -> anyhow::Result<Box<dyn Producer<S>>> + Send + Sync + 'static,
  {
    Self { source: source.into(), enabled: true, mapping: None, factory: Box::new(factory) }
  }

  pub fn with_mapping(mut self, mapping: impl Into<PathBuf>) -> Self {
    self.mapping = Some(mapping.into());
    self
  }

  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn build(&self) -> anyhow::Result<Box<dyn Producer<S>>> { (self.factory)() }
}

pub struct Registry<S: FactStore> {
  entries: Vec<ProducerEntry<S>>,
}

impl<S: FactStore> Default for Registry<S> {
  fn default() -> Self { Self { entries: Vec::new() } }
}

impl<S: FactStore> Registry<S> {
  pub fn new() -> Self { Self::default() }

  pub fn register(&mut self, entry: ProducerEntry<S>) -> &mut Self {
    self.entries.push(entry);
    self
  }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Enabled entries in registration order, narrowed to `only` when it is
  /// non-empty.
  pub fn select(&self, only: &[String]) -> Vec<&ProducerEntry<S>> {
    for name in only {
      match self.entries.iter().find(|e| &e.source == name) {
        None => tracing::warn!(source = %name, "no registered producer with this source"),
        Some(e) if !e.enabled => tracing::warn!(source = %name, "producer is disabled; skipping"),
        Some(_) => {}
      }
    }

    self
      .entries
      .iter()
      .filter(|e| e.enabled)
      .filter(|e| only.is_empty() || only.contains(&e.source))
      .collect()
  }
}
