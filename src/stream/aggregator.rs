//! The hourly aggregating consumer.
//!
//! Walks forward through the time-partitioned event log one message at a
//! time, folds readings into the in-flight hour bucket, publishes a finalized
//! average when the observed hour changes, and checkpoints its full state
//! after every message. Hour boundaries are detected by value change, not
//! wall-clock rollover: a bucket spanning a gap in data is finalized only
//! when the next observed message's hour differs.

use crate::config::Config;
use crate::stats::SharedStats;
use crate::store::{CheckpointStore, PartitionLog};
use crate::stream::navigator::Navigator;
use crate::stream::types::{
    format_record_date, AggregatorCheckpoint, HourlyAverage, LogEntry, MessageId, TempReading,
};
use crate::stream::PipelineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tuning for the aggregating consumer.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Key of the derived averages log
    pub averages_stream_key: String,
    /// Checkpoint key owned by this consumer
    pub state_key: String,
    /// Approximate cap on the averages log length
    pub averages_maxlen: u64,
    /// How long one blocking read may wait
    pub block_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        let config = Config::default();
        Self::from_config(&config)
    }
}

impl AggregatorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            averages_stream_key: config.averages_stream_key.clone(),
            state_key: config.aggregator_state_key.clone(),
            averages_maxlen: config.averages_maxlen,
            block_timeout: config.block_timeout,
        }
    }
}

/// What one poll step accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// A reading was folded into the in-flight bucket
    Folded,
    /// The previous hour's bucket was finalized and published
    Emitted(HourlyAverage),
    /// The consumer switched to a newer partition
    Advanced,
    /// Nothing arrived and no newer partition exists yet
    Idle,
}

/// The aggregating consumer state machine.
///
/// A fresh start and a resumed start follow identical logic; the only
/// difference is the initial [`AggregatorCheckpoint`].
#[derive(Debug)]
pub struct HourlyAggregator<S> {
    store: Arc<S>,
    navigator: Navigator<S>,
    config: AggregatorConfig,
    state: AggregatorCheckpoint,
    /// Hour of the in-flight bucket carried across a partition advance.
    ///
    /// IDs are partition-local, so advancing resets `last_message_id` and
    /// loses the hour it encoded. Without the carry, the previous day's last
    /// bucket would silently merge into the new day's first one instead of
    /// being finalized. Not checkpointed: a crash mid-advance resumes on the
    /// old partition and re-derives it when the advance replays.
    carry_hour: Option<u32>,
    stats: SharedStats,
}

impl<S: PartitionLog + CheckpointStore> HourlyAggregator<S> {
    pub fn new(
        store: Arc<S>,
        config: AggregatorConfig,
        start: AggregatorCheckpoint,
        stats: SharedStats,
    ) -> Self {
        log::info!(
            target: "agg",
            "starting aggregating consumer in stream {} at message {}",
            start.partition,
            start.last_message_id
        );
        Self {
            navigator: Navigator::new(store.clone()),
            store,
            config,
            state: start,
            carry_hour: None,
            stats,
        }
    }

    /// Load this consumer's checkpoint, if one was ever written.
    pub fn load_checkpoint(
        store: &S,
        config: &AggregatorConfig,
    ) -> Result<Option<AggregatorCheckpoint>, PipelineError> {
        match store.load_checkpoint(&config.state_key)? {
            Some(fields) => Ok(Some(AggregatorCheckpoint::from_fields(&fields)?)),
            None => Ok(None),
        }
    }

    /// The current resume snapshot (also the in-flight bucket).
    pub fn state(&self) -> &AggregatorCheckpoint {
        &self.state
    }

    /// One step of the state machine: a single blocking read, then either a
    /// partition decision or a fold/emit plus checkpoint.
    pub fn poll(&mut self) -> Result<Progress, PipelineError> {
        let key = self.state.partition.to_string();
        let next = self.store.read_next(
            &key,
            self.state.last_message_id,
            self.config.block_timeout,
        )?;

        match next {
            Some(entry) => self.fold(entry),
            None => {
                self.stats.record_read_timeout();
                match self.navigator.advance_from(&self.state.partition)? {
                    Some(next_partition) => {
                        log::info!(
                            target: "agg",
                            "changing partition to consume stream {next_partition}"
                        );
                        // IDs are partition-local: restart from the top, but
                        // keep the in-flight bucket's hour so the previous
                        // day's last bucket still closes on the next message.
                        if !self.state.last_message_id.is_zero() {
                            self.carry_hour = Some(self.state.last_message_id.hour());
                        }
                        self.state.partition = next_partition;
                        self.state.last_message_id = MessageId::ZERO;
                        self.stats.record_partition_advanced();
                        Ok(Progress::Advanced)
                    }
                    None => {
                        log::debug!(
                            target: "agg",
                            "waiting for new messages in stream {key}, or a new partition"
                        );
                        Ok(Progress::Idle)
                    }
                }
            }
        }
    }

    fn fold(&mut self, entry: LogEntry) -> Result<Progress, PipelineError> {
        let reading = TempReading::from_entry(&entry)?;
        let msg_hour = entry.id.hour();

        // The hour the previous message fell in, if there was one. The very
        // first message of a fresh run has no prior bucket and never emits;
        // the first message after a partition advance uses the carried hour.
        let last_hour = if self.state.last_message_id.is_zero() {
            self.carry_hour
        } else {
            Some(self.state.last_message_id.hour())
        };

        let progress = match last_hour {
            Some(last_hour) if last_hour != msg_hour && self.state.hourly_count > 0 => {
                // The date tag comes from the message that closed the bucket,
                // not from the closing hour's own timestamp.
                let record = HourlyAverage {
                    hour: last_hour,
                    date: format_record_date(entry.id)?,
                    average_temp_f: self
                        .state
                        .hourly_total
                        .div_euclid(self.state.hourly_count as i64),
                };
                self.store.append(
                    &self.config.averages_stream_key,
                    record.to_fields(),
                    Some(self.config.averages_maxlen),
                )?;
                log::info!(
                    target: "agg",
                    "published hour {} average {}F for {}",
                    record.hour,
                    record.average_temp_f,
                    record.date
                );

                self.state.hourly_total = reading.temp_f;
                self.state.hourly_count = 1;
                self.stats.record_bucket_emitted();
                Progress::Emitted(record)
            }
            _ => {
                self.state.hourly_total += reading.temp_f;
                self.state.hourly_count += 1;
                Progress::Folded
            }
        };

        self.state.last_message_id = entry.id;
        // A non-zero last id encodes the bucket's hour again.
        self.carry_hour = None;

        // Checkpoint unconditionally after every message, emitted or not.
        // Written only once the message is fully folded, so replay resumes
        // strictly after it with no partial-application state.
        self.store
            .save_checkpoint(&self.config.state_key, self.state.to_fields())?;
        self.stats.record_message_consumed();

        Ok(progress)
    }

    /// Loop until the running flag clears or an error propagates. The machine
    /// has no terminal state of its own.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), PipelineError> {
        while running.load(Ordering::SeqCst) {
            self.poll()?;
        }
        Ok(())
    }
}
