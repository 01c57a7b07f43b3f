//! token-sessions CLI entry point
//!
//! Dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use token_sessions::cli::{Cli, Commands};
use token_sessions::config::{Config, ConfigManager};
use token_sessions::error::TokenResult;
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

async fn run() -> TokenResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Config command loads the file itself, so init still works on a broken one
    if let Commands::Config(args) = cli.command {
        init_logging(cli.verbose, None);
        return token_sessions::cli::commands::config(args, &config_manager).await;
    }

    // Load configuration before logging so log_format applies
    let loaded = config_manager.load().await;
    init_logging(cli.verbose, loaded.as_ref().ok());
    let config = loaded?;
    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Config(_) => unreachable!("Config handled above"),
        Commands::Run(args) => token_sessions::cli::commands::run(args, &config).await,
        Commands::Stress(args) => token_sessions::cli::commands::stress(args, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: Option<&Config>) {
    let filter = match verbose {
        0 => EnvFilter::new("token_sessions=warn"),
        1 => EnvFilter::new("token_sessions=info"),
        _ => EnvFilter::new("token_sessions=debug"),
    };

    let json = config.is_some_and(|c| c.general.log_format == "json");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
