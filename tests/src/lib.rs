//! Shared harness for the pipeline integration tests.
//!
//! Most suites run against in-memory doubles of the storage and upstream
//! seams. The ClickHouse suite needs Docker and is ignored by default.

pub mod fixtures;
pub mod setup;
