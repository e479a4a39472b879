//! Process-lifetime pipeline counters.
//!
//! Both consumer loops record what they did here so an operator can inspect
//! throughput with `thermostream status`. Counters accumulate across runs
//! when persistence is enabled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle both consumer threads hold.
pub type SharedStats = Arc<PipelineStats>;

/// Counters for the current pipeline process.
#[derive(Debug)]
pub struct PipelineStats {
    /// Sensor messages folded or emitted by the aggregator
    messages_consumed: AtomicU64,
    /// Partition switches performed by the navigator
    partitions_advanced: AtomicU64,
    /// Finalized hour buckets published to the averages log
    buckets_emitted: AtomicU64,
    /// Average records surfaced by the averages consumer
    averages_reported: AtomicU64,
    /// Blocking reads that returned empty
    read_timeouts: AtomicU64,
    /// Process start time
    started: DateTime<Utc>,
    /// Identifies this process instance in exported stats
    instance_id: Uuid,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            messages_consumed: AtomicU64::new(0),
            partitions_advanced: AtomicU64::new(0),
            buckets_emitted: AtomicU64::new(0),
            averages_reported: AtomicU64::new(0),
            read_timeouts: AtomicU64::new(0),
            started: Utc::now(),
            instance_id: Uuid::new_v4(),
            persist_path: None,
        }
    }

    /// Create stats with persistence, resuming previous counter values.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            log::debug!("no previous stats loaded: {e}");
        }

        stats
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn record_message_consumed(&self) {
        self.messages_consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_partition_advanced(&self) {
        self.partitions_advanced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bucket_emitted(&self) {
        self.buckets_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_average_reported(&self) {
        self.averages_reported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_timeout(&self) {
        self.read_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_consumed: self.messages_consumed.load(Ordering::Relaxed),
            partitions_advanced: self.partitions_advanced.load(Ordering::Relaxed),
            buckets_emitted: self.buckets_emitted.load(Ordering::Relaxed),
            averages_reported: self.averages_reported.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }

    /// Operator-facing summary string.
    pub fn summary(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "Pipeline statistics:\n\
             - Messages consumed: {}\n\
             - Partitions advanced: {}\n\
             - Hour buckets emitted: {}\n\
             - Averages reported: {}\n\
             - Read timeouts: {}\n\
             - Uptime: {} seconds",
            snapshot.messages_consumed,
            snapshot.partitions_advanced,
            snapshot.buckets_emitted,
            snapshot.averages_reported,
            snapshot.read_timeouts,
            snapshot.uptime_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let snapshot = self.snapshot();
            let persisted = PersistedStats {
                instance_id: self.instance_id,
                messages_consumed: snapshot.messages_consumed,
                partitions_advanced: snapshot.partitions_advanced,
                buckets_emitted: snapshot.buckets_emitted,
                averages_reported: snapshot.averages_reported,
                read_timeouts: snapshot.read_timeouts,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if !path.exists() {
                return Ok(());
            }

            let content = std::fs::read_to_string(path)?;
            let persisted: PersistedStats = serde_json::from_str(&content)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

            self.messages_consumed
                .store(persisted.messages_consumed, Ordering::Relaxed);
            self.partitions_advanced
                .store(persisted.partitions_advanced, Ordering::Relaxed);
            self.buckets_emitted
                .store(persisted.buckets_emitted, Ordering::Relaxed);
            self.averages_reported
                .store(persisted.averages_reported, Ordering::Relaxed);
            self.read_timeouts
                .store(persisted.read_timeouts, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub messages_consumed: u64,
    pub partitions_advanced: u64,
    pub buckets_emitted: u64,
    pub averages_reported: u64,
    pub read_timeouts: u64,
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    instance_id: Uuid,
    messages_consumed: u64,
    partitions_advanced: u64,
    buckets_emitted: u64,
    averages_reported: u64,
    read_timeouts: u64,
    last_updated: DateTime<Utc>,
}

/// Create a shared stats handle without persistence.
pub fn shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}

/// Create a shared stats handle persisted at `path`.
pub fn shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(PipelineStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = PipelineStats::new();
        stats.record_message_consumed();
        stats.record_message_consumed();
        stats.record_bucket_emitted();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_consumed, 2);
        assert_eq!(snapshot.buckets_emitted, 1);
        assert_eq!(snapshot.averages_reported, 0);
    }

    #[test]
    fn test_summary_mentions_counters() {
        let stats = PipelineStats::new();
        stats.record_partition_advanced();
        let summary = stats.summary();
        assert!(summary.contains("Partitions advanced: 1"));
        assert!(summary.contains("Messages consumed: 0"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let stats = PipelineStats::with_persistence(path.clone());
        stats.record_message_consumed();
        stats.record_average_reported();
        stats.save().unwrap();

        let reloaded = PipelineStats::with_persistence(path);
        let snapshot = reloaded.snapshot();
        assert_eq!(snapshot.messages_consumed, 1);
        assert_eq!(snapshot.averages_reported, 1);
    }
}
