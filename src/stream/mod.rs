//! The partitioned log aggregation pipeline.
//!
//! This module contains:
//! - Structured IDs, keys and records for the event and averages logs
//! - The forward-only partition navigator
//! - The hourly aggregating consumer
//! - The averages consumer tailing the derived log

pub mod aggregator;
pub mod averages;
pub mod navigator;
pub mod types;

// Re-export commonly used types
pub use aggregator::{AggregatorConfig, HourlyAggregator, Progress};
pub use averages::{AveragesConfig, AveragesConsumer};
pub use navigator::Navigator;
pub use types::{
    AggregatorCheckpoint, AveragesCheckpoint, DecodeError, HourlyAverage, LogEntry, MessageId,
    ParseError, PartitionKey, TempReading,
};

use crate::store::StoreError;
use std::fmt;

/// Errors fatal to a consumer loop.
///
/// These are never converted into skips: a failing loop terminates so an
/// external supervisor can restart the process and replay from the last
/// durable checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The backing store failed
    Store(StoreError),
    /// A message or checkpoint record could not be decoded
    Malformed(DecodeError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Store(e) => write!(f, "store failure: {e}"),
            PipelineError::Malformed(e) => write!(f, "malformed record: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Store(e) => Some(e),
            PipelineError::Malformed(e) => Some(e),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::Store(e)
    }
}

impl From<DecodeError> for PipelineError {
    fn from(e: DecodeError) -> Self {
        PipelineError::Malformed(e)
    }
}
