//! Thermostream - partitioned temperature stream aggregation pipeline.
//!
//! This library consumes an unbounded, date-partitioned log of temperature
//! readings, computes per-hour rolling aggregates, and republishes finalized
//! hourly averages on a separate bounded log. Both consumers checkpoint after
//! every message and survive process restarts without losing or duplicating
//! work.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        thermostream                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  temps:20260829 ─┐                                           │
//! │  temps:20260830 ─┼──▶ ┌────────────┐      ┌───────────────┐  │
//! │  temps:20260831 ─┘    │  Hourly    │─────▶│ Averages log  │  │
//! │     (partitions)      │ Aggregator │      │ (capped ~50)  │  │
//! │                       └─────┬──────┘      └───────┬───────┘  │
//! │                             │                     ▼          │
//! │                       ┌─────▼──────┐      ┌───────────────┐  │
//! │                       │ Checkpoint │◀─────│   Averages    │  │
//! │                       │   store    │      │   consumer    │  │
//! │                       └────────────┘      └───────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two consumers run as independent units of execution with no shared
//! memory; the only coupling is the averages log and the checkpoint store,
//! and each consumer owns a disjoint checkpoint key.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use thermostream::{
//!     stats::shared_stats,
//!     store::MemoryStore,
//!     stream::{AggregatorCheckpoint, AggregatorConfig, HourlyAggregator},
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! let start = AggregatorCheckpoint::fresh("stream:temps:20260830".parse().unwrap());
//! let mut aggregator =
//!     HourlyAggregator::new(store, AggregatorConfig::default(), start, shared_stats());
//!
//! // Drive one read step; in production this loops until shutdown.
//! let _progress = aggregator.poll().expect("store failure");
//! ```

pub mod config;
pub mod stats;
pub mod store;
pub mod stream;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use stats::{shared_stats, shared_stats_with_persistence, PipelineStats, SharedStats};
pub use store::{CheckpointStore, MemoryStore, PartitionLog, StoreError};
pub use stream::{
    AggregatorCheckpoint, AggregatorConfig, AveragesCheckpoint, AveragesConfig, AveragesConsumer,
    HourlyAggregator, HourlyAverage, LogEntry, MessageId, Navigator, PartitionKey, PipelineError,
    Progress, TempReading,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
