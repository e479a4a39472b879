//! The averages consumer.
//!
//! Independently tails the bounded averages log from its own checkpoint and
//! surfaces finalized hourly records. It shares no in-process state with the
//! aggregator; the only coupling is the averages log and the checkpoint
//! store, each side owning a disjoint checkpoint key.

use crate::config::Config;
use crate::stats::SharedStats;
use crate::store::{CheckpointStore, PartitionLog};
use crate::stream::types::{AveragesCheckpoint, HourlyAverage};
use crate::stream::PipelineError;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tuning for the averages consumer.
#[derive(Debug, Clone)]
pub struct AveragesConfig {
    /// Key of the averages log being tailed
    pub averages_stream_key: String,
    /// Checkpoint key owned by this consumer
    pub state_key: String,
    /// How long one blocking read may wait
    pub block_timeout: Duration,
}

impl Default for AveragesConfig {
    fn default() -> Self {
        let config = Config::default();
        Self::from_config(&config)
    }
}

impl AveragesConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            averages_stream_key: config.averages_stream_key.clone(),
            state_key: config.averages_state_key.clone(),
            block_timeout: config.block_timeout,
        }
    }
}

/// Tails the averages log, reporting each finalized record.
#[derive(Debug)]
pub struct AveragesConsumer<S> {
    store: Arc<S>,
    config: AveragesConfig,
    state: AveragesCheckpoint,
    reporter: Option<Sender<HourlyAverage>>,
    stats: SharedStats,
}

impl<S: PartitionLog + CheckpointStore> AveragesConsumer<S> {
    /// Create the consumer, resuming from its own checkpoint if one exists.
    pub fn new(
        store: Arc<S>,
        config: AveragesConfig,
        stats: SharedStats,
    ) -> Result<Self, PipelineError> {
        let state = match store.load_checkpoint(&config.state_key)? {
            Some(fields) => AveragesCheckpoint::from_fields(&fields)?,
            None => AveragesCheckpoint::default(),
        };

        log::info!(
            target: "avg",
            "starting averages consumer in stream {} at message {}",
            config.averages_stream_key,
            state.last_message_id
        );

        Ok(Self {
            store,
            config,
            state,
            reporter: None,
            stats,
        })
    }

    /// Forward each surfaced record to `sender` in addition to logging it.
    pub fn with_reporter(mut self, sender: Sender<HourlyAverage>) -> Self {
        self.reporter = Some(sender);
        self
    }

    /// The current resume position.
    pub fn state(&self) -> &AveragesCheckpoint {
        &self.state
    }

    /// One blocking read: `Ok(None)` on timeout (no state change), otherwise
    /// the surfaced record, with the checkpoint advanced past it.
    pub fn poll(&mut self) -> Result<Option<HourlyAverage>, PipelineError> {
        let next = self.store.read_next(
            &self.config.averages_stream_key,
            self.state.last_message_id,
            self.config.block_timeout,
        )?;

        let entry = match next {
            Some(entry) => entry,
            None => {
                self.stats.record_read_timeout();
                log::debug!(
                    target: "avg",
                    "waiting for new messages in stream {}",
                    self.config.averages_stream_key
                );
                return Ok(None);
            }
        };

        let record = HourlyAverage::from_entry(&entry)?;
        log::info!(
            target: "avg",
            "average temperature for {} at hour {} was {}F",
            record.date,
            record.hour,
            record.average_temp_f
        );

        if let Some(ref reporter) = self.reporter {
            // A detached reporter is not a pipeline failure.
            let _ = reporter.send(record.clone());
        }

        self.state.last_message_id = entry.id;
        self.store
            .save_checkpoint(&self.config.state_key, self.state.to_fields())?;
        self.stats.record_average_reported();

        Ok(Some(record))
    }

    /// Loop until the running flag clears or an error propagates.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), PipelineError> {
        while running.load(Ordering::SeqCst) {
            self.poll()?;
        }
        Ok(())
    }
}
