//! Glacier evolution model.
//!
//! Usage:
//! `rgem [--config rgem.toml] calibrate [--glacier-list FILE] [--processes N] [--serial]`
//! `rgem [--config rgem.toml] simulate [--gcm-list NAME|FILE] [--glacier-list FILE] [--processes N] [--serial]`

mod calibration;
mod config;
mod error;
mod export;
mod setup;
mod simulation;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::RunConfig;
use crate::error::RunResult;
use crate::setup::Execution;

#[derive(Parser, Debug)]
#[command(name = "rgem")]
#[command(about = "Simulate and calibrate the mass balance and evolution of mountain glaciers")]
struct Cli {
    /// Run configuration (TOML)
    #[arg(long, global = true, default_value = "rgem.toml")]
    config: PathBuf,

    /// Log debug messages
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Parallelism {
    /// Number of worker threads
    #[arg(long, default_value = "4")]
    processes: usize,

    /// Process all glaciers on the current thread
    #[arg(long)]
    serial: bool,
}

impl From<&Parallelism> for Execution {
    fn from(p: &Parallelism) -> Self {
        Execution {
            processes: p.processes,
            serial: p.serial,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate glacier evolution for one or more climate datasets
    Simulate {
        /// Reference dataset name, or a text file of dataset names whose file name
        /// carries the scenario, e.g. `gcms_rcp45.txt`
        #[arg(long)]
        gcm_list: Option<String>,

        /// Text file of glacier numbers overriding the configured selection
        #[arg(long)]
        glacier_list: Option<PathBuf>,

        #[command(flatten)]
        parallelism: Parallelism,
    },
    /// Calibrate model parameters against mass balance observations
    Calibrate {
        /// Text file of glacier numbers overriding the configured selection
        #[arg(long)]
        glacier_list: Option<PathBuf>,

        #[command(flatten)]
        parallelism: Parallelism,
    },
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rgem={level},rgem_core={level},rgem_calibrate={level}"
        ))
    });

    fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: &Cli) -> RunResult<()> {
    let config = RunConfig::from_file(&cli.config)?;
    info!("Loaded configuration from {}", cli.config.display());

    match &cli.command {
        Command::Simulate {
            gcm_list,
            glacier_list,
            parallelism,
        } => simulation::run(
            &config,
            gcm_list.as_deref(),
            glacier_list.as_deref(),
            parallelism.into(),
        ),
        Command::Calibrate {
            glacier_list,
            parallelism,
        } => calibration::run(&config, glacier_list.as_deref(), parallelism.into()),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(&cli) {
        error!("{}", e);
        process::exit(1);
    }
}
