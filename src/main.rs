// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "ir-tool-tracking")]
#[command(about = "Depth acquisition and pose registration for infrared tool tracking")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: <config dir>/ir-tool-tracking/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the depth sensor calibration
    Info,

    /// Run acquisition against the synthetic sensor
    Run {
        /// Run duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Register a demo tool and start tool tracking
        #[arg(short, long)]
        track: bool,
    },

    /// Build the unit-ray lookup table and summarize it
    Lut,

    /// Write the effective configuration to the config file
    InitConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=ir_tool_tracking=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(ir_tool_tracking::Config::default_path);

    match cli.command {
        Commands::Info => cli::show_info(config_path.as_deref()),
        Commands::Run { duration, track } => cli::run(config_path.as_deref(), duration, track),
        Commands::Lut => cli::build_lut(config_path.as_deref()),
        Commands::InitConfig => cli::init_config(config_path.as_deref()),
    }
}
