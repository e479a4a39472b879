//! Forward partition advancement.
//!
//! When a blocking read on the current partition times out, the navigator
//! decides whether to stay or move one day ahead. The walk is monotonic and
//! one-way: partitions are never revisited, and the candidate is always
//! exactly one day after the current one. A missing intermediate partition
//! therefore stalls the walk at the last existing one until it appears.

use crate::store::{PartitionLog, StoreError};
use crate::stream::types::PartitionKey;
use std::sync::Arc;

/// Decides whether to advance to a newer partition after a read timeout.
#[derive(Debug)]
pub struct Navigator<S> {
    store: Arc<S>,
}

impl<S: PartitionLog> Navigator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the next partition to consume, or `None` to keep blocking on
    /// the current one. Advances only when the successor partition exists.
    pub fn advance_from(&self, current: &PartitionKey) -> Result<Option<PartitionKey>, StoreError> {
        let candidate = current.successor();
        if self.store.exists(&candidate.to_string())? {
            Ok(Some(candidate))
        } else {
            Ok(None)
        }
    }
}
