//! drishti-annotate: traffic light datasets from a driving simulator
//!
//! Three subcommands:
//!
//! - **record**: plan a route covering every lane of a town, drive it with the
//!   simulator's autopilot and keep the native recording
//! - **annotate**: replay a recording under a weather preset and export a
//!   YOLO dataset of traffic light boxes
//! - **plan**: plan and report a coverage route without driving it
//!
//! # Usage
//!
//! ```bash
//! drishti-annotate --config drishti.toml record --town Town10HD
//! drishti-annotate annotate recordings/Town10HD_1718000000.log --weather HardRainNoon
//! drishti-annotate annotate recordings/Town10HD_1718000000.log --resume-after 412
//! drishti-annotate --backend mock plan --town Town01 --output route.yaml
//! ```

mod client;
mod commands;
mod config;
mod error;
mod export;

use clap::{Parser, Subcommand};
use commands::Backend;
use config::ToolConfig;
use drishti_core::sim::WeatherPreset;
use error::Result;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "drishti.toml";

#[derive(Parser)]
#[command(name = "drishti-annotate")]
#[command(about = "Record simulated drives and export annotated traffic light datasets")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file (default: drishti.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Simulator backend
    #[arg(long, value_enum, default_value = "bridge", global = true)]
    backend: Backend,

    /// Bridge host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Bridge port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Timeout for each simulator call in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Drive a full-coverage route and keep the recording
    Record {
        /// Town to record
        #[arg(short, long)]
        town: Option<String>,

        /// Directory receiving the recording
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many simulation ticks
        #[arg(long)]
        max_ticks: Option<u64>,
    },

    /// Replay a recording and export annotated frames
    Annotate {
        /// Recording log to replay
        log: PathBuf,

        /// Weather preset applied to the replay
        #[arg(short, long)]
        weather: Option<WeatherPreset>,

        /// Dataset root directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Continue after this frame index of an earlier failed run
        #[arg(long)]
        resume_after: Option<u64>,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,

        /// Also write preview images with boxes drawn
        #[arg(long)]
        preview: bool,
    },

    /// Plan a coverage route and print its statistics
    Plan {
        /// Town to plan
        #[arg(short, long)]
        town: Option<String>,

        /// Write the route as YAML
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(args: &Args) -> Result<ToolConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            ToolConfig::load(path)?
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            info!("Loading configuration from {}", DEFAULT_CONFIG);
            ToolConfig::load(Path::new(DEFAULT_CONFIG))?
        }
        None => {
            info!("Using default configuration");
            ToolConfig::default()
        }
    };

    if let Some(host) = &args.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = args.port {
        config.connection.port = port;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.connection.timeout_ms = timeout_ms;
    }

    match &args.command {
        Command::Record {
            town,
            output,
            max_ticks,
        } => {
            if let Some(town) = town {
                config.recording.town = town.clone();
            }
            if let Some(output) = output {
                config.recording.output_dir = output.clone();
            }
            if let Some(max_ticks) = max_ticks {
                config.drive.max_ticks = *max_ticks;
            }
        }
        Command::Annotate {
            weather,
            output,
            max_frames,
            preview,
            ..
        } => {
            if let Some(weather) = weather {
                config.annotation.weather = *weather;
            }
            if let Some(output) = output {
                config.export.output_dir = output.clone();
            }
            if max_frames.is_some() {
                config.annotation.max_frames = *max_frames;
            }
            config.export.preview |= *preview;
        }
        Command::Plan { town, .. } => {
            if let Some(town) = town {
                config.recording.town = town.clone();
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let mut sim = commands::connect(args.backend, &config.connection)?;

    match &args.command {
        Command::Record { .. } => {
            commands::record(&mut *sim, &config)?;
        }
        Command::Annotate {
            log, resume_after, ..
        } => {
            commands::annotate(&mut *sim, &config, log, *resume_after)?;
        }
        Command::Plan { output, .. } => {
            let route = commands::plan(&mut *sim, &config.recording.town, &config.planner)?;
            if let Some(path) = output {
                commands::write_route(&route, path)?;
            }
        }
    }
    Ok(())
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("drishti_annotate=info,drishti_core=info")
            }),
        )
        .init();

    let args = Args::parse();
    info!("drishti-annotate v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
