//! Core types and trait definitions for epiharvest.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::FactStore`]; the runner and producers
//! depend on that abstraction, not on any concrete backend.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod diagnostics;
pub mod error;
pub mod fact;
pub mod gate;
pub mod region;
pub mod store;

pub use error::{Error, Result};
