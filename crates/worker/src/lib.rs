//! Background workers for the activity pipeline.
//!
//! - Ingestion (event feed → batch writer → dispatch channel)
//! - Refresh pool (dispatch channel → metadata fetch → upsert → broadcast)
//! - Rollups (hourly and daily counts by category, tag and language)
//! - Scheduler tying the tickers together with cooperative shutdown

pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod ingestion;
pub mod pool;
pub mod queue;
pub mod rollup;
pub mod scheduler;

pub use broadcast::{BroadcastHub, Subscription};
pub use config::PipelineConfig;
pub use dispatch::{DispatchChannel, SendOutcome};
pub use ingestion::{IngestionReport, IngestionWorker};
pub use pool::{ItemOutcome, RefreshWorker};
pub use queue::OverflowPolicy;
pub use rollup::{RollupEngine, RollupReport};
pub use scheduler::*;
