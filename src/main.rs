//! Rebroadcast - replay one event stream to many consumers
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use rebroadcast::cli::{Cli, Commands};
use rebroadcast::config::ConfigManager;
use rebroadcast::error::RebroadcastResult;
use std::process::ExitCode;
use tracing::debug;
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

async fn run() -> RebroadcastResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // Logging: 0 = warn, 1 = info, 2 = debug, 3+ = trace
    let verbosity = cli.verbose.max(u8::from(config.general.verbose));
    let filter = match verbosity {
        0 => EnvFilter::new("rebroadcast=warn"),
        1 => EnvFilter::new("rebroadcast=info"),
        2 => EnvFilter::new("rebroadcast=debug"),
        _ => EnvFilter::new("rebroadcast=trace"),
    };

    if config.general.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }

    debug!("Using config at {}", config_manager.path().display());

    match cli.command {
        Commands::Replay(args) => rebroadcast::cli::commands::replay(args, &config).await,
        Commands::Config(args) => {
            rebroadcast::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
