//! Embedded implementation of the log and checkpoint traits.
//!
//! Streams and checkpoint records live behind one mutex; blocking reads park
//! on a condvar until an append lands or the deadline passes. With
//! persistence enabled the whole store is rewritten as JSON after every
//! mutation, so a restarted process resumes against the same data.

use crate::store::{CheckpointStore, PartitionLog, StoreError};
use crate::stream::types::{LogEntry, MessageId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Shared {
    streams: HashMap<String, Vec<LogEntry>>,
    checkpoints: HashMap<String, BTreeMap<String, String>>,
}

/// In-process log and checkpoint store with optional file persistence.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Shared>,
    wakeup: Condvar,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty, non-persistent store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Shared::default()),
            wakeup: Condvar::new(),
            persist_path: None,
        }
    }

    /// Open a store persisted at `path`, loading existing contents if any.
    pub fn with_persistence(path: PathBuf) -> Result<Self, StoreError> {
        let shared = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))?
        } else {
            Shared::default()
        };

        Ok(Self {
            inner: Mutex::new(shared),
            wakeup: Condvar::new(),
            persist_path: Some(path),
        })
    }

    /// Append with an explicit ID, used when seeding historical partitions.
    ///
    /// The ID must be strictly greater than the last entry's.
    pub fn append_with_id(
        &self,
        key: &str,
        id: MessageId,
        fields: BTreeMap<String, String>,
    ) -> Result<MessageId, StoreError> {
        let mut shared = self.locked()?;

        let stream = shared.streams.entry(key.to_string()).or_default();
        if let Some(last) = stream.last() {
            if id <= last.id {
                return Err(StoreError::IdOutOfOrder);
            }
        }
        stream.push(LogEntry::new(id, fields));

        self.persist(&shared)?;
        self.wakeup.notify_all();
        Ok(id)
    }

    /// Number of entries currently held for `key`.
    pub fn stream_len(&self, key: &str) -> Result<usize, StoreError> {
        let shared = self.locked()?;
        Ok(shared.streams.get(key).map_or(0, Vec::len))
    }

    fn locked(&self) -> Result<MutexGuard<'_, Shared>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    fn persist(&self, shared: &Shared) -> Result<(), StoreError> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
            let json =
                serde_json::to_string(shared).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            std::fs::write(path, json).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        Ok(())
    }

    fn first_after(shared: &Shared, key: &str, after: MessageId) -> Option<LogEntry> {
        shared
            .streams
            .get(key)?
            .iter()
            .find(|entry| entry.id > after)
            .cloned()
    }

    /// Trim the stream once it exceeds the cap plus slack, then cut back to
    /// the cap. This mirrors the backing service's approximate MAXLEN: length
    /// stays at or slightly above the configured bound.
    fn trim(stream: &mut Vec<LogEntry>, maxlen: u64) {
        let maxlen = maxlen as usize;
        let slack = (maxlen / 10).max(1);
        if stream.len() > maxlen + slack {
            let excess = stream.len() - maxlen;
            stream.drain(..excess);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionLog for MemoryStore {
    fn read_next(
        &self,
        key: &str,
        after: MessageId,
        timeout: Duration,
    ) -> Result<Option<LogEntry>, StoreError> {
        let deadline = Instant::now() + timeout;
        let mut shared = self.locked()?;

        loop {
            if let Some(entry) = Self::first_after(&shared, key, after) {
                return Ok(Some(entry));
            }

            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => return Ok(None),
            };

            let (guard, _timed_out) = self
                .wakeup
                .wait_timeout(shared, remaining)
                .map_err(|_| StoreError::Poisoned)?;
            shared = guard;
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let shared = self.locked()?;
        Ok(shared.streams.get(key).is_some_and(|s| !s.is_empty()))
    }

    fn append(
        &self,
        key: &str,
        fields: BTreeMap<String, String>,
        maxlen: Option<u64>,
    ) -> Result<MessageId, StoreError> {
        let mut shared = self.locked()?;

        let now = Utc::now().timestamp().max(0) as u64;
        let stream = shared.streams.entry(key.to_string()).or_default();

        // IDs must stay monotonic even if the clock steps backwards.
        let id = match stream.last() {
            Some(last) if last.id.timestamp >= now => MessageId::new(last.id.timestamp, last.id.seq + 1),
            _ => MessageId::new(now, 0),
        };
        stream.push(LogEntry::new(id, fields));

        if let Some(maxlen) = maxlen {
            Self::trim(stream, maxlen);
        }

        self.persist(&shared)?;
        self.wakeup.notify_all();
        Ok(id)
    }
}

impl CheckpointStore for MemoryStore {
    fn load_checkpoint(&self, key: &str) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        let shared = self.locked()?;
        Ok(shared.checkpoints.get(key).cloned())
    }

    fn save_checkpoint(
        &self,
        key: &str,
        fields: BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut shared = self.locked()?;
        shared.checkpoints.insert(key.to_string(), fields);
        self.persist(&shared)
    }
}
