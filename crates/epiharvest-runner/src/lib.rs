//! Batch ingestion for epiharvest.
//!
//! A [`Registry`] lists the producers compiled into the binary. The
//! [`Runner`] drives them one at a time against a single shared
//! [`FactStore`](epiharvest_core::store::FactStore), giving each its own
//! [`Ingest`] context (resolver, gate, diagnostics) and isolating failures so
//! one broken source never stops the batch.

pub mod backend;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod producer;
pub mod registry;
pub mod runner;
pub mod settings;

pub use backend::AnyStore;
pub use error::{Error, Result};
pub use feed::{FeedLocation, FeedProducer, feed_registry};
pub use ingest::{Admission, Ingest, IngestStats};
pub use producer::{Producer, ProducerFuture};
pub use registry::{ProducerEntry, Registry};
pub use runner::{Outcome, ProducerOutcome, RunSettings, RunSummary, Runner};
pub use settings::{BackendConfig, FeedConfig, HarvestConfig};

#[cfg(test)]
mod tests;
