//! Storage seam for the pipeline.
//!
//! The backing service is an append-only, partition-keyed log plus a simple
//! field-map checkpoint store. Both are specified here as traits so consumers
//! take an explicitly constructed handle rather than a process-wide
//! connection singleton; `MemoryStore` is the embedded implementation.

pub mod memory;

pub use memory::MemoryStore;

use crate::stream::types::{LogEntry, MessageId};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// An append-only, partition-keyed log with blocking reads by ID.
///
/// No retries live at this layer: transient failures propagate to the caller
/// as fatal for that call. A read timeout is not an error.
pub trait PartitionLog {
    /// Blocking read of the next entry strictly after `after` (all entries
    /// when `after` is [`MessageId::ZERO`]). Returns `Ok(None)` if nothing
    /// arrives within `timeout`.
    fn read_next(
        &self,
        key: &str,
        after: MessageId,
        timeout: Duration,
    ) -> Result<Option<LogEntry>, StoreError>;

    /// Existence probe for a named partition.
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Append a record with an auto-assigned ID, then approximately trim the
    /// log to at most "around" `maxlen` most-recent entries when given. Exact
    /// length is not guaranteed, only an upper bound near the cap.
    fn append(
        &self,
        key: &str,
        fields: BTreeMap<String, String>,
        maxlen: Option<u64>,
    ) -> Result<MessageId, StoreError>;
}

/// Field-map persistence for resumable consumer state.
///
/// Each checkpoint key has exactly one writer by construction; access is
/// read-once-at-startup, write-after-every-message.
pub trait CheckpointStore {
    /// Full read of a checkpoint record, `Ok(None)` if it was never written.
    fn load_checkpoint(&self, key: &str) -> Result<Option<BTreeMap<String, String>>, StoreError>;

    /// Full overwrite of a checkpoint record.
    fn save_checkpoint(
        &self,
        key: &str,
        fields: BTreeMap<String, String>,
    ) -> Result<(), StoreError>;
}

/// Errors from the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Persistence I/O failure
    Io(String),
    /// Persisted state could not be decoded
    Corrupt(String),
    /// An explicit append ID was not greater than the last entry's
    IdOutOfOrder,
    /// A store lock was poisoned by a panicking holder
    Poisoned,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store IO error: {e}"),
            StoreError::Corrupt(e) => write!(f, "corrupt store state: {e}"),
            StoreError::IdOutOfOrder => write!(f, "append ID not greater than last entry"),
            StoreError::Poisoned => write!(f, "store lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}
