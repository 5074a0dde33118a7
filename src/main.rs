//! CLI Entry Point for the conveyor cell
//!
//! # Usage
//!
//! Run the cell with the default configuration file:
//! ```bash
//! conveyor-cell
//! ```
//!
//! Validate a configuration without touching hardware:
//! ```bash
//! conveyor-cell --config config/conveyor.toml check
//! ```
//!
//! Keys are read from stdin one line at a time; every character of a line is
//! one key (`w` forward, `s` reverse, space stop, `d`/`a` speed, `v`/`b`
//! feeder, `q` quit by default).

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use conveyor_cell::config::{CellConfig, DEFAULT_CONFIG_PATH};
use conveyor_cell::hardware::build_camera;
use conveyor_cell::logging::{self, LoggingConfig, OutputFormat};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "conveyor-cell")]
#[command(about = "Conveyor cell control: camera, servo belt and vibration feeder", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "compact")]
    log_format: OutputFormat,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cell (default)
    Run,

    /// Load and validate the configuration, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CellConfig::load_from(&cli.config)?;
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.application.log_level.as_str());
    let level = logging::parse_log_level(level).map_err(|e| anyhow!(e))?;
    logging::init(LoggingConfig::new(level).with_format(cli.log_format)).map_err(|e| anyhow!(e))?;

    config.validate()?;
    info!(name = %config.application.name, config = %cli.config.display(), "Configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => conveyor_cell::app::run(config).await,
        Commands::Check => check(&config),
    }
}

fn check(config: &CellConfig) -> Result<()> {
    let camera = build_camera(&config.camera)?;
    info!(camera = camera.name(), "Camera configuration valid");
    info!(
        port = %config.servo.link.port,
        slave = config.servo.link.slave_address,
        speed = %format!("{}..={}", config.servo.min_speed, config.servo.max_speed),
        "Servo configuration valid"
    );
    info!(port = %config.vibration.link.port, "Vibration configuration valid");
    println!("Configuration OK");
    Ok(())
}
