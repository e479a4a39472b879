//! Thermostream CLI
//!
//! Partitioned temperature stream aggregation pipeline.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use thermostream::{
    config::Config,
    stats::shared_stats_with_persistence,
    store::{CheckpointStore, MemoryStore},
    stream::{
        AggregatorCheckpoint, AggregatorConfig, AveragesCheckpoint, AveragesConfig,
        AveragesConsumer, HourlyAggregator, MessageId, PartitionKey, TempReading,
    },
    VERSION,
};

#[derive(Parser)]
#[command(name = "thermostream")]
#[command(version = VERSION)]
#[command(about = "Partitioned temperature stream aggregation pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the aggregation pipeline
    Run {
        /// Partition to start from (e.g. stream:temps:20260830). When
        /// omitted, the pipeline resumes from its saved checkpoint.
        stream_key: Option<String>,
    },

    /// Seed synthetic temperature readings into partition streams
    Seed {
        /// Number of consecutive daily partitions to create
        #[arg(long, default_value_t = 3)]
        days: u32,

        /// Readings per hour in each partition
        #[arg(long, default_value_t = 4)]
        per_hour: u32,

        /// First partition date (YYYYMMDD); defaults so the run ends today
        #[arg(long)]
        start: Option<String>,

        /// Center of the synthetic temperature range, in Fahrenheit
        #[arg(long, default_value_t = 70)]
        base_temp: i64,
    },

    /// Show checkpoints, stream lengths and cumulative statistics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { stream_key } => cmd_run(stream_key),
        Commands::Seed {
            days,
            per_hour,
            start,
            base_temp,
        } => cmd_seed(days, per_hour, start, base_temp),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    }
}

fn cmd_run(stream_key: Option<String>) {
    println!("Thermostream v{VERSION}");
    println!();

    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Error: could not create data directory: {e}");
        std::process::exit(1);
    }

    let store = open_store(&config);
    let stats = shared_stats_with_persistence(config.stats_path());
    let aggregator_config = AggregatorConfig::from_config(&config);
    let averages_config = AveragesConfig::from_config(&config);

    // An explicit stream key starts fresh; without one, resume from the
    // saved checkpoint. Having neither is a configuration error.
    let start = match stream_key {
        Some(raw) => {
            let partition: PartitionKey = match raw.parse() {
                Ok(partition) => partition,
                Err(e) => {
                    eprintln!("Invalid stream key supplied: {e}");
                    std::process::exit(1);
                }
            };
            if partition.base != config.stream_base {
                eprintln!(
                    "Invalid stream key supplied: expected base {:?}, got {:?}",
                    config.stream_base, partition.base
                );
                std::process::exit(1);
            }
            AggregatorCheckpoint::fresh(partition)
        }
        None => match HourlyAggregator::load_checkpoint(store.as_ref(), &aggregator_config) {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => {
                eprintln!("No saved aggregator state found.");
                eprintln!(
                    "Start the pipeline with an explicit stream key, e.g. `thermostream run {}:{}`.",
                    config.stream_base,
                    Utc::now().format("%Y%m%d")
                );
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Error loading aggregator checkpoint: {e}");
                std::process::exit(1);
            }
        },
    };

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    println!("Starting pipeline...");
    println!("  Aggregating consumer: agg-{host}");
    println!("  Averages consumer: avg-{host}");
    println!("  Start partition: {}", start.partition);
    println!("  Resume after message: {}", start.last_message_id);
    println!("  Block timeout: {}s", config.block_timeout.as_secs());
    println!("  Averages log cap: ~{} records", config.averages_maxlen);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut aggregator =
        HourlyAggregator::new(store.clone(), aggregator_config, start, stats.clone());
    let mut averages = match AveragesConsumer::new(store, averages_config, stats.clone()) {
        Ok(consumer) => consumer,
        Err(e) => {
            eprintln!("Error loading averages checkpoint: {e}");
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    // Each consumer is its own unit of execution with no shared mutable
    // state; a failure in one leaves the other running on its own
    // checkpoint, and the process reports it at shutdown.
    let aggregator_handle = {
        let running = running.clone();
        thread::spawn(move || {
            let result = aggregator.run(&running);
            if let Err(ref e) = result {
                log::error!(target: "agg", "aggregating consumer stopped: {e}");
            }
            result
        })
    };

    let averages_handle = {
        let running = running.clone();
        thread::spawn(move || {
            let result = averages.run(&running);
            if let Err(ref e) = result {
                log::error!(target: "avg", "averages consumer stopped: {e}");
            }
            result
        })
    };

    let mut failed = false;
    for (name, handle) in [
        ("aggregating consumer", aggregator_handle),
        ("averages consumer", averages_handle),
    ] {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("Error: {name} failed: {e}");
                failed = true;
            }
            Err(_) => {
                eprintln!("Error: {name} panicked");
                failed = true;
            }
        }
    }

    println!();
    println!("Stopping pipeline...");

    if let Err(e) = stats.save() {
        eprintln!("Warning: could not save pipeline stats: {e}");
    }

    println!();
    println!("{}", stats.summary());

    if failed {
        // A terminated loop resumes from its durable checkpoint on the
        // next start; the non-zero status lets a supervisor restart us.
        std::process::exit(1);
    }
}

fn cmd_seed(days: u32, per_hour: u32, start: Option<String>, base_temp: i64) {
    use rand::Rng;

    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Error: could not create data directory: {e}");
        std::process::exit(1);
    }

    let days = days.max(1);
    let per_hour = per_hour.clamp(1, 3_600);

    let start_date = match start {
        Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y%m%d") {
            Ok(date) => date,
            Err(e) => {
                eprintln!("Invalid start date {raw:?}: {e}");
                std::process::exit(1);
            }
        },
        None => Utc::now().date_naive() - ChronoDuration::days(days as i64 - 1),
    };

    let store = open_store(&config);
    let mut rng = rand::thread_rng();
    let spacing = 3_600 / per_hour as u64;
    let mut seeded = 0u64;

    for day in 0..days {
        let partition = PartitionKey::new(
            config.stream_base.clone(),
            start_date + ChronoDuration::days(day as i64),
        );
        let key = partition.to_string();
        let day_start = partition
            .date
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp()
            .max(0) as u64;

        for hour in 0..24u64 {
            for slot in 0..per_hour as u64 {
                let ts = day_start + hour * 3_600 + slot * spacing;
                let temp = base_temp + rng.gen_range(-8..=8);
                if let Err(e) =
                    store.append_with_id(&key, MessageId::new(ts, 0), TempReading::new(temp).to_fields())
                {
                    eprintln!("Error seeding {key} at {ts}: {e}");
                    eprintln!("(was this range already seeded?)");
                    std::process::exit(1);
                }
                seeded += 1;
            }
        }

        println!("Seeded partition {key}");
    }

    println!();
    println!("Seeded {seeded} readings across {days} partition(s).");
    println!(
        "Run the pipeline with: thermostream run {}:{}",
        config.stream_base,
        start_date.format("%Y%m%d")
    );
}

fn cmd_status() {
    let config = load_config();

    println!("Thermostream Status");
    println!("===================");
    println!();

    match MemoryStore::with_persistence(config.store_path()) {
        Ok(store) => {
            match store.load_checkpoint(&config.aggregator_state_key) {
                Ok(Some(fields)) => match AggregatorCheckpoint::from_fields(&fields) {
                    Ok(checkpoint) => {
                        println!("Aggregating consumer:");
                        println!("  Partition: {}", checkpoint.partition);
                        println!("  Last message: {}", checkpoint.last_message_id);
                        println!(
                            "  In-flight bucket: total={} count={}",
                            checkpoint.hourly_total, checkpoint.hourly_count
                        );
                    }
                    Err(e) => println!("Aggregating consumer: corrupt checkpoint ({e})"),
                },
                Ok(None) => println!("Aggregating consumer: no checkpoint yet"),
                Err(e) => println!("Aggregating consumer: {e}"),
            }
            println!();

            match store.load_checkpoint(&config.averages_state_key) {
                Ok(Some(fields)) => match AveragesCheckpoint::from_fields(&fields) {
                    Ok(checkpoint) => {
                        println!("Averages consumer:");
                        println!("  Last message: {}", checkpoint.last_message_id);
                    }
                    Err(e) => println!("Averages consumer: corrupt checkpoint ({e})"),
                },
                Ok(None) => println!("Averages consumer: no checkpoint yet"),
                Err(e) => println!("Averages consumer: {e}"),
            }
            println!();

            match store.stream_len(&config.averages_stream_key) {
                Ok(len) => println!(
                    "Averages log: {} record(s) (cap ~{})",
                    len, config.averages_maxlen
                ),
                Err(e) => println!("Averages log: {e}"),
            }
        }
        Err(e) => println!("Could not open store: {e}"),
    }
    println!();

    // Cumulative stats persist across runs.
    let stats_path = config.stats_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(messages) = stats.get("messages_consumed") {
                    println!("  Messages consumed: {messages}");
                }
                if let Some(advanced) = stats.get("partitions_advanced") {
                    println!("  Partitions advanced: {advanced}");
                }
                if let Some(emitted) = stats.get("buckets_emitted") {
                    println!("  Hour buckets emitted: {emitted}");
                }
                if let Some(reported) = stats.get("averages_reported") {
                    println!("  Averages reported: {reported}");
                }
            }
        }
    } else {
        println!("No previous run statistics found.");
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: could not load config, using defaults: {e}");
            Config::default()
        }
    }
}

fn open_store(config: &Config) -> Arc<MemoryStore> {
    match MemoryStore::with_persistence(config.store_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error opening store at {:?}: {e}", config.store_path());
            std::process::exit(1);
        }
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
