//! The producer contract.

use std::{future::Future, pin::Pin};

use epiharvest_core::store::FactStore;

use crate::ingest::Ingest;

/// The boxed future a producer run returns.
pub type ProducerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// A unit that fetches raw data for one source and hands normalised fields
/// to an [`Ingest`] context.
///
/// Producers are stored as trait objects in the [`Registry`](crate::Registry),
/// so `run` returns a boxed future instead of being an `async fn`.
pub trait Producer<S: FactStore>: Send + Sync {
  /// The source tag written into every record's natural key.
  fn source(&self) -> &str;

  fn run<'a>(&'a self, ingest: &'a mut Ingest<S>) -> ProducerFuture<'a>;
}
