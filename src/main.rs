//! Stickydisk CLI
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use stickydisk::cli::{Cli, Commands};
use stickydisk::config::ConfigManager;
use stickydisk::error::StickyResult;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> StickyResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = match config_manager.load().await {
        Ok(config) => config,
        Err(e) if matches!(cli.command, Commands::Setup(_) | Commands::Teardown(_)) => {
            init_logging(cli.verbose, "text");
            warn!("Failed to load configuration, skipping sticky disk: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    init_logging(cli.verbose, &config.general.log_format);
    debug!("Control plane endpoint: {}", config.control_plane.endpoint());

    let state_file = cli.state_file.as_deref();
    match cli.command {
        Commands::Setup(args) => stickydisk::cli::commands::setup(args, &config, state_file).await,
        Commands::Teardown(args) => {
            stickydisk::cli::commands::teardown(args, &config, state_file).await
        }
        Commands::DeleteCache(args) => stickydisk::cli::commands::delete_cache(args, &config).await,
        Commands::Config(args) => {
            stickydisk::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = info, 1 = debug, 2+ = trace; `RUNNER_DEBUG=1` forces debug
fn init_logging(verbose: u8, log_format: &str) {
    let runner_debug = std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1");
    let filter = match (verbose, runner_debug) {
        (0, false) => EnvFilter::new("stickydisk=info"),
        (0 | 1, _) => EnvFilter::new("stickydisk=debug"),
        _ => EnvFilter::new("stickydisk=trace"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time();

    if log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
