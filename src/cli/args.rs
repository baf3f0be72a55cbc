//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Sticky disk lifecycle for CI jobs
///
/// Mounts a persistent, reusable block device as a job cache and commits
/// or discards it when the job ends.
#[derive(Parser, Debug)]
#[command(name = "stickydisk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STICKYDISK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Job state file (defaults to one per sticky disk path)
    #[arg(long, global = true, env = "STICKYDISK_STATE_FILE")]
    pub state_file: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire a sticky disk and mount it for this job
    Setup(SetupArgs),

    /// Unmount the sticky disk and commit or discard it
    Teardown(TeardownArgs),

    /// Delete entries from the remote cache
    DeleteCache(DeleteCacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the setup command
#[derive(Parser, Debug)]
pub struct SetupArgs {
    /// Cache identity for the sticky disk
    #[arg(short, long, env = "INPUT_KEY")]
    pub key: String,

    /// Path to expose the disk at
    #[arg(short, long, env = "INPUT_PATH")]
    pub path: PathBuf,
}

/// Arguments for the teardown command
#[derive(Parser, Debug)]
pub struct TeardownArgs {
    /// Path the disk was exposed at during setup
    #[arg(short, long, env = "INPUT_PATH")]
    pub path: PathBuf,
}

/// Arguments for the delete-cache command
#[derive(Parser, Debug)]
pub struct DeleteCacheArgs {
    /// Cache key (may be empty with --prefix)
    #[arg(short, long, env = "INPUT_KEY", default_value = "")]
    pub key: String,

    /// Delete only this version of the key
    #[arg(id = "cache_version", long = "cache-version", value_name = "VERSION", env = "INPUT_VERSION")]
    pub version: Option<String>,

    /// Treat the key as a prefix
    #[arg(long)]
    pub prefix: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (secrets omitted)
    Show,

    /// Show config file path
    Path,
}
