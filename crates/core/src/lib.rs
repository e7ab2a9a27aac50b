//! Core types for the activity pipeline: events, resource metadata,
//! statistic buckets, the error taxonomy and tag normalization.

pub mod bucket;
pub mod error;
pub mod events;
pub mod metadata;
pub mod tags;

pub use bucket::*;
pub use error::{Error, Result};
pub use events::*;
pub use metadata::*;
