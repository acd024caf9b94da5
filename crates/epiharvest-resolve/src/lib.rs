//! Region name resolution for epiharvest.
//!
//! A [`Resolver`] translates one source's free-text admin-area names into
//! canonical names and geocodes using that source's curated mapping file.

mod mapping;
mod resolver;

pub mod error;

pub use error::{Error, Result};
pub use mapping::{MappingEntry, MappingTable};
pub use resolver::{FailurePolicy, Lookup, Resolution, ResolveFailure, Resolver};
