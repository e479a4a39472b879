//! Integration tests for the aggregation pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thermostream::{
    shared_stats, AggregatorCheckpoint, AggregatorConfig, AveragesConfig, AveragesConsumer,
    CheckpointStore, HourlyAggregator, HourlyAverage, MemoryStore, MessageId, PartitionKey,
    PartitionLog, Progress, TempReading,
};

const DAY_ONE: &str = "temps:20260830";

fn aggregator_config() -> AggregatorConfig {
    AggregatorConfig {
        averages_stream_key: "stream:averages".to_string(),
        state_key: "checkpoint:aggregator".to_string(),
        averages_maxlen: 50,
        block_timeout: Duration::from_millis(10),
    }
}

fn averages_config() -> AveragesConfig {
    AveragesConfig {
        averages_stream_key: "stream:averages".to_string(),
        state_key: "checkpoint:averages".to_string(),
        block_timeout: Duration::from_millis(10),
    }
}

fn seed(store: &MemoryStore, key: &str, ts: u64, temp: i64) {
    store
        .append_with_id(key, MessageId::new(ts, 0), TempReading::new(temp).to_fields())
        .unwrap();
}

fn fresh_aggregator(
    store: Arc<MemoryStore>,
    partition: &str,
    config: AggregatorConfig,
) -> HourlyAggregator<MemoryStore> {
    let partition: PartitionKey = partition.parse().unwrap();
    HourlyAggregator::new(
        store,
        config,
        AggregatorCheckpoint::fresh(partition),
        shared_stats(),
    )
}

/// Drive the aggregator until it reports idle, collecting emissions.
fn drain(aggregator: &mut HourlyAggregator<MemoryStore>) -> Vec<HourlyAverage> {
    let mut emitted = Vec::new();
    loop {
        match aggregator.poll().unwrap() {
            Progress::Emitted(record) => emitted.push(record),
            Progress::Idle => return emitted,
            Progress::Folded | Progress::Advanced => {}
        }
    }
}

#[test]
fn emissions_match_per_hour_floor_averages() {
    let store = Arc::new(MemoryStore::new());
    // Hour 0: 70, 74, 71 -> floor(215/3) = 71
    seed(&store, DAY_ONE, 10, 70);
    seed(&store, DAY_ONE, 600, 74);
    seed(&store, DAY_ONE, 1_200, 71);
    // Hour 1: 80, 81 -> floor(161/2) = 80
    seed(&store, DAY_ONE, 3_700, 80);
    seed(&store, DAY_ONE, 4_000, 81);
    // Hour 2: closes hour 1
    seed(&store, DAY_ONE, 7_300, 90);

    let mut aggregator = fresh_aggregator(store, DAY_ONE, aggregator_config());
    let emitted = drain(&mut aggregator);

    let summary: Vec<(u32, i64)> = emitted
        .iter()
        .map(|r| (r.hour, r.average_temp_f))
        .collect();
    assert_eq!(summary, vec![(0, 71), (1, 80)]);

    // Hour 2 is still in flight, unemitted.
    assert_eq!(aggregator.state().hourly_total, 90);
    assert_eq!(aggregator.state().hourly_count, 1);
}

#[test]
fn first_message_of_fresh_run_never_emits() {
    let store = Arc::new(MemoryStore::new());
    // Hour 7: differs from the sentinel "no prior hour".
    seed(&store, DAY_ONE, 7 * 3_600 + 42, 66);

    let mut aggregator = fresh_aggregator(store.clone(), DAY_ONE, aggregator_config());
    let emitted = drain(&mut aggregator);

    assert!(emitted.is_empty());
    assert_eq!(store.stream_len("stream:averages").unwrap(), 0);
}

#[test]
fn checkpoint_replay_matches_uninterrupted_run() {
    let readings: &[(u64, i64)] = &[
        (10, 70),
        (600, 74),
        (3_700, 80),
        (4_100, 82),
        (7_300, 60),
        (7_900, 62),
        (10_900, 50),
    ];

    // Uninterrupted run.
    let store_a = Arc::new(MemoryStore::new());
    for &(ts, temp) in readings {
        seed(&store_a, DAY_ONE, ts, temp);
    }
    let mut uninterrupted = fresh_aggregator(store_a.clone(), DAY_ONE, aggregator_config());
    let emitted_a = drain(&mut uninterrupted);

    // Crash-and-resume run: process three messages, drop the aggregator,
    // rebuild from the durable checkpoint, continue.
    let store_b = Arc::new(MemoryStore::new());
    for &(ts, temp) in readings {
        seed(&store_b, DAY_ONE, ts, temp);
    }
    let mut first_half = fresh_aggregator(store_b.clone(), DAY_ONE, aggregator_config());
    let mut emitted_b = Vec::new();
    for _ in 0..3 {
        if let Progress::Emitted(record) = first_half.poll().unwrap() {
            emitted_b.push(record);
        }
    }
    drop(first_half);

    let checkpoint = HourlyAggregator::load_checkpoint(store_b.as_ref(), &aggregator_config())
        .unwrap()
        .expect("checkpoint must exist after processing");
    let mut resumed = HourlyAggregator::new(
        store_b.clone(),
        aggregator_config(),
        checkpoint,
        shared_stats(),
    );
    emitted_b.extend(drain(&mut resumed));

    assert_eq!(emitted_a, emitted_b);
    assert_eq!(uninterrupted.state(), resumed.state());
}

#[test]
fn partition_walk_is_forward_only_and_stalls_on_gaps() {
    let store = Arc::new(MemoryStore::new());
    // Days D, D+1 and D+3 exist; D+2 is missing.
    seed(&store, "temps:20260830", 100, 70);
    seed(&store, "temps:20260831", 100, 71);
    seed(&store, "temps:20260902", 100, 73);

    let mut aggregator = fresh_aggregator(store.clone(), DAY_ONE, aggregator_config());
    drain(&mut aggregator);
    assert_eq!(aggregator.state().partition.to_string(), "temps:20260831");

    // Stalls on D+1: never jumps the gap to D+3.
    for _ in 0..5 {
        assert_eq!(aggregator.poll().unwrap(), Progress::Idle);
    }
    assert_eq!(aggregator.state().partition.to_string(), "temps:20260831");

    // Once D+2 appears the walk resumes, one day at a time.
    seed(&store, "temps:20260901", 100, 72);
    drain(&mut aggregator);
    assert_eq!(aggregator.state().partition.to_string(), "temps:20260902");
}

#[test]
fn averages_log_stays_near_configured_cap() {
    let store = Arc::new(MemoryStore::new());
    let config = AggregatorConfig {
        averages_maxlen: 10,
        ..aggregator_config()
    };

    // One reading per hour; every message after the first closes a bucket.
    for step in 0..200u64 {
        seed(&store, DAY_ONE, step * 3_600 + 1, 70);
    }

    let mut aggregator = fresh_aggregator(store.clone(), DAY_ONE, config);
    let emitted = drain(&mut aggregator);
    assert_eq!(emitted.len(), 199);

    let len = store.stream_len("stream:averages").unwrap();
    assert!(len >= 10, "trimmed below the cap: {len}");
    assert!(len <= 12, "averages log grew past the cap: {len}");
}

#[test]
fn consumers_restart_independently() {
    let store = Arc::new(MemoryStore::new());
    // Three hour boundaries -> two emissions.
    seed(&store, DAY_ONE, 10, 70);
    seed(&store, DAY_ONE, 3_700, 80);
    seed(&store, DAY_ONE, 7_300, 90);

    let mut aggregator = fresh_aggregator(store.clone(), DAY_ONE, aggregator_config());
    drain(&mut aggregator);
    let aggregator_fields = store
        .load_checkpoint("checkpoint:aggregator")
        .unwrap()
        .unwrap();

    // First consumer instance surfaces one record, then terminates mid-run.
    let mut consumer =
        AveragesConsumer::new(store.clone(), averages_config(), shared_stats()).unwrap();
    let first = consumer.poll().unwrap().expect("first record");
    assert_eq!(first.hour, 0);
    drop(consumer);

    // The restarted instance resumes exactly after its own checkpoint.
    let mut consumer =
        AveragesConsumer::new(store.clone(), averages_config(), shared_stats()).unwrap();
    let second = consumer.poll().unwrap().expect("second record");
    assert_eq!(second.hour, 1);
    assert_eq!(consumer.poll().unwrap(), None);

    // The aggregator's checkpoint was untouched throughout.
    let aggregator_fields_after = store
        .load_checkpoint("checkpoint:aggregator")
        .unwrap()
        .unwrap();
    assert_eq!(aggregator_fields, aggregator_fields_after);
}

#[test]
fn concurrent_consumers_share_only_the_store() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, DAY_ONE, 10, 70);
    seed(&store, DAY_ONE, 3_700, 80);

    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = crossbeam_channel::unbounded();

    let consumer_handle = {
        let store = store.clone();
        let running = running.clone();
        std::thread::spawn(move || {
            let mut consumer = AveragesConsumer::new(store, averages_config(), shared_stats())
                .unwrap()
                .with_reporter(tx);
            consumer.run(&running)
        })
    };

    // The aggregator runs on this thread; one emission is due.
    let mut aggregator = fresh_aggregator(store, DAY_ONE, aggregator_config());
    drain(&mut aggregator);

    let record = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("averages consumer should surface the emission");
    assert_eq!(record.hour, 0);
    assert_eq!(record.average_temp_f, 70);

    running.store(false, Ordering::SeqCst);
    consumer_handle.join().unwrap().unwrap();
}

#[test]
fn consumer_failure_leaves_the_other_running() {
    use std::collections::BTreeMap;

    let store = Arc::new(MemoryStore::new());
    // A reading with no temperature is fatal to the aggregator alone.
    store
        .append_with_id(
            DAY_ONE,
            MessageId::new(10, 0),
            BTreeMap::from([("humidity".to_string(), "40".to_string())]),
        )
        .unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = crossbeam_channel::unbounded();

    let consumer_handle = {
        let store = store.clone();
        let running = running.clone();
        std::thread::spawn(move || {
            let mut consumer = AveragesConsumer::new(store, averages_config(), shared_stats())
                .unwrap()
                .with_reporter(tx);
            consumer.run(&running)
        })
    };

    let mut aggregator = fresh_aggregator(store.clone(), DAY_ONE, aggregator_config());
    assert!(aggregator.run(&running).is_err());

    // The aggregator's failure did not signal a shutdown.
    assert!(running.load(Ordering::SeqCst));

    // The averages consumer is still live: a fresh record reaches it.
    let record = HourlyAverage {
        hour: 4,
        date: "2026/08/30".to_string(),
        average_temp_f: 68,
    };
    store
        .append("stream:averages", record.to_fields(), None)
        .unwrap();
    let surfaced = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("averages consumer should outlive the aggregator");
    assert_eq!(surfaced, record);

    running.store(false, Ordering::SeqCst);
    consumer_handle.join().unwrap().unwrap();
}

#[test]
fn resume_never_reprocesses_checkpointed_messages() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, DAY_ONE, 10, 70);
    seed(&store, DAY_ONE, 600, 74);

    let mut aggregator = fresh_aggregator(store.clone(), DAY_ONE, aggregator_config());
    drain(&mut aggregator);
    drop(aggregator);

    // Replaying from the checkpoint must not double-count the folded
    // readings: the bucket state is unchanged after an idle resume.
    let checkpoint = HourlyAggregator::load_checkpoint(store.as_ref(), &aggregator_config())
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.hourly_total, 144);
    assert_eq!(checkpoint.hourly_count, 2);

    let mut resumed =
        HourlyAggregator::new(store, aggregator_config(), checkpoint, shared_stats());
    assert_eq!(resumed.poll().unwrap(), Progress::Idle);
    assert_eq!(resumed.state().hourly_total, 144);
    assert_eq!(resumed.state().hourly_count, 2);
}
