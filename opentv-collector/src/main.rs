//! opentv-collector: builds an OpenTV programme guide from captured
//! transport streams.
//!
//! Each input file is one frequency. Sections are replayed into the
//! acquisition loops, and the synthesized schedules of every frequency are
//! written as one JSON document.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use log::{error, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use opentv_epg::channel::ChannelReport;
use opentv_epg::{
    ChannelSchedule, Dictionary, EpgConfig, EpgError, FrequencySession, ReferenceTables,
    SessionStats, StaticReferenceTables,
};

mod logging;
mod replay;

use replay::{Replay, ReplayQueues, Routes};

const DEFAULT_CONFIG: &str = "opentv-collector.toml";

/// opentv-collector - OpenTV EPG collector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Captured transport stream files, one per frequency
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Write the guide here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Country code selecting the dictionary and text heuristics
    #[arg(long)]
    country: Option<String>,

    /// Directory holding `<COUNTRY>.dict` files
    #[arg(long)]
    dictionary_dir: Option<PathBuf>,

    /// Only register channels of this bouquet
    #[arg(long)]
    bouquet_id: Option<u16>,

    /// Only register channels of this region
    #[arg(long)]
    region: Option<u16>,

    /// Consecutive wakes without new fragments before a group converges
    #[arg(long)]
    repeat_threshold: Option<u32>,

    /// Sections pushed per replay step
    #[arg(long, default_value = "64")]
    replay_chunk: usize,

    /// Pause between replay steps in milliseconds
    #[arg(long, default_value = "50")]
    replay_delay_ms: u64,

    /// Directory where log files are stored
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Guide of one frequency.
#[derive(Debug, Serialize)]
struct FrequencyDocument {
    name: String,
    source: PathBuf,
    channels: Vec<ChannelReport>,
    schedules: Vec<ChannelSchedule>,
    stats: SessionStats,
}

#[derive(Debug, Serialize)]
struct GuideDocument {
    generated_at: DateTime<Utc>,
    country: String,
    frequencies: Vec<FrequencyDocument>,
}

fn load_config(args: &Args) -> Result<EpgConfig, Box<dyn std::error::Error>> {
    // Explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG);
        default_path.exists().then_some(default_path)
    });

    let mut config = match &config_path {
        Some(path) => match EpgConfig::load(path) {
            Ok(config) => {
                eprintln!("Loaded config from: {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e.into());
            }
        },
        None => EpgConfig::default(),
    };

    // Command line takes precedence
    if let Some(country) = &args.country {
        config.epg.country = country.clone();
    }
    if let Some(dir) = &args.dictionary_dir {
        config.reference.dictionary_dir = dir.clone();
    }
    if args.bouquet_id.is_some() {
        config.channels.bouquet_id = args.bouquet_id;
    }
    if args.region.is_some() {
        config.channels.region = args.region;
    }
    if let Some(threshold) = args.repeat_threshold {
        config.acquisition.repeat_threshold = threshold;
    }
    if args.log_dir.to_string_lossy() != "logs" {
        config.logging.log_dir = args.log_dir.clone();
    }
    if args.log_retention_days != 7 {
        config.logging.retention_days = args.log_retention_days;
    }

    config.validate()?;
    Ok(config)
}

fn load_reference(config: &EpgConfig) -> Result<Arc<dyn ReferenceTables>, EpgError> {
    let tables = match &config.reference.tables {
        Some(path) => StaticReferenceTables::load(path)?,
        None => {
            warn!("No reference tables configured; categories will be empty");
            StaticReferenceTables::default()
        }
    };
    Ok(Arc::new(tables))
}

fn frequency_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;

    logging::init_logging(
        &config.logging.log_dir,
        config.logging.retention_days,
        args.verbose,
        config.logging.level.as_deref(),
    )?;

    info!("opentv-collector starting...");
    info!("  Country: {}", config.epg.country);
    info!("  Dictionary directory: {:?}", config.reference.dictionary_dir);
    info!("  Inputs: {}", args.inputs.len());

    let dictionary = match Dictionary::load(&config.reference.dictionary_dir, &config.epg.country) {
        Ok(dictionary) => Arc::new(dictionary),
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    let reference = load_reference(&config)?;
    let config = Arc::new(config);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing with the data collected so far");
                shutdown.cancel();
            }
        });
    }

    let routes = Routes::from_config(&config.acquisition);
    let mut frequencies = Vec::new();

    for input in &args.inputs {
        if shutdown.is_cancelled() {
            break;
        }
        let name = frequency_name(input);
        let cancel = shutdown.child_token();

        let queues = ReplayQueues::new();
        let replay = Replay::new(
            input.clone(),
            routes.clone(),
            args.replay_chunk,
            Duration::from_millis(args.replay_delay_ms),
        );
        let replay_handle = tokio::spawn(replay.run(queues.clone(), cancel.clone()));

        let session = FrequencySession::new(name.clone(), config.clone(), dictionary.clone(), reference.clone())
            .with_cancellation(cancel.clone());
        let result = session
            .run(queues.sources(config.acquisition.enable_diagnostic_group))
            .await;

        // Stop feeding a frequency that has finished
        cancel.cancel();
        if let Ok(stats) = replay_handle.await {
            info!(
                "[{}] Replayed {} packet(s), {} section(s), {} refused",
                name, stats.packets, stats.sections, stats.refused
            );
        }

        match result {
            Ok(outcome) => {
                info!(
                    "[{}] {} schedule(s), {} entries, usage count {}",
                    name,
                    outcome.schedules.len(),
                    outcome.stats.synthesis.entries_emitted,
                    outcome.stats.usage_count()
                );
                frequencies.push(FrequencyDocument {
                    name,
                    source: input.clone(),
                    channels: outcome.channels,
                    schedules: outcome.schedules,
                    stats: outcome.stats,
                });
            }
            Err(e @ EpgError::AcquisitionFailed { .. }) => {
                warn!("[{}] No data collected: {}", name, e);
            }
            Err(e) => {
                error!("[{}] Session failed: {}", name, e);
            }
        }
    }

    let document = GuideDocument {
        generated_at: Utc::now(),
        country: config.epg.country.clone(),
        frequencies,
    };
    let json = serde_json::to_string_pretty(&document)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Guide written to {:?}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}
