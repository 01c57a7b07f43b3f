//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// token-sessions - Session registry for cryptographic security tokens
///
/// Replays session scenarios and stress-tests the token session table.
#[derive(Parser, Debug)]
#[command(name = "token-sessions")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "TOKEN_SESSIONS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a session scenario file against a fresh token
    Run(RunArgs),

    /// Hammer a token with concurrent sessions and check its invariants
    Stress(StressArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario file (TOML with [[step]] entries)
    pub scenario: PathBuf,

    /// Stop at the first failing step
    #[arg(long)]
    pub fail_fast: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the stress command
///
/// The token is sized by `token.max_sessions`; opens past it are counted
/// as rejections.
#[derive(Parser, Debug)]
pub struct StressArgs {
    /// Concurrent workers
    #[arg(short, long, default_value = "8")]
    pub threads: usize,

    /// Operations per worker
    #[arg(short, long, default_value = "1000")]
    pub iterations: usize,

    /// Random seed (defaults to a random one)
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for the run command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}
