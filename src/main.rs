use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use migset::config::Config;
use migset::energy::{EnergyCollector, EnergyReader, DEFAULT_POWERCAP_ROOT};
use migset::merge;
use migset::proc::ProcTaskSource;
use migset::sink::JsonlSink;
use migset::snapshot::StateCollector;
use migset::topology::TopologyResolver;

#[derive(Parser)]
#[command(name = "migset")]
#[command(about = "Scheduler migration training-data collector and merge toolkit")]
struct Cli {
    /// Path to the TOML config file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample task placement and emit labeled migration records
    State {
        /// Sampling interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,
        /// Stop after this many seconds (default: run until interrupted)
        #[arg(short, long)]
        duration: Option<u64>,
        /// Output JSONL path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sample package energy counters
    Energy {
        /// Sampling interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,
        /// Stop after this many seconds (default: run until interrupted)
        #[arg(short, long)]
        duration: Option<u64>,
        /// Output JSONL path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Time-align collector logs into one merged CSV table
    Merge {
        /// State snapshot log
        #[arg(long)]
        state: PathBuf,
        /// Hardware counter log
        #[arg(long)]
        counters: PathBuf,
        /// Energy log
        #[arg(long)]
        energy: PathBuf,
        /// Output CSV path
        #[arg(long, default_value = "merged_dataset.csv")]
        output: PathBuf,
    },
}

fn load_config(path: Option<PathBuf>) -> Config {
    let path = path.unwrap_or_else(Config::config_path);
    if path.exists() {
        Config::load(&path).unwrap_or_else(|e| {
            warn!("failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        Config::default()
    }
}

fn shutdown_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            handler_flag.store(true, Ordering::Relaxed);
        }
    });
    flag
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(cli.config);

    match cli.command {
        Command::State {
            interval,
            duration,
            output,
        } => {
            let interval = Duration::from_millis(interval.unwrap_or(config.state.interval_ms));
            let duration = duration
                .or(config.state.duration_secs)
                .map(Duration::from_secs);
            let output = output.unwrap_or_else(|| PathBuf::from(&config.state.output));

            let source = ProcTaskSource::new();
            let sink = JsonlSink::open(&output)?;
            let mut collector = StateCollector::new(source, TopologyResolver::new(), sink);
            collector.run(interval, duration, shutdown_flag()).await?;
            info!("data saved to {}", output.display());
        }

        Command::Energy {
            interval,
            duration,
            output,
        } => {
            let interval = Duration::from_millis(interval.unwrap_or(config.energy.interval_ms));
            let duration = duration
                .or(config.energy.duration_secs)
                .map(Duration::from_secs);
            let output = output.unwrap_or_else(|| PathBuf::from(&config.energy.output));

            let reader = EnergyReader::discover(DEFAULT_POWERCAP_ROOT.as_ref());
            let sink = JsonlSink::open(&output)?;
            let mut collector = EnergyCollector::new(reader, sink);
            collector.run(interval, duration, shutdown_flag()).await?;
            info!("data saved to {}", output.display());
        }

        Command::Merge {
            state,
            counters,
            energy,
            output,
        } => {
            merge::merge_files(&state, &counters, &energy, &output)?;
        }
    }

    Ok(())
}
