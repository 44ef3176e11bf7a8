//! Resumable upload command-line entry point.

mod app;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Uploads files to HTTP resumable-upload sessions.
#[derive(Debug, Parser)]
#[command(name = "resumable-upload", version)]
pub struct Cli {
    /// Configuration file (defaults to the per-user location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a file to an already created session.
    Upload(UploadArgs),
    /// Ask a session how many bytes it has committed.
    Status(StatusArgs),
    /// Show or create the configuration file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Session URL returned when the upload was initiated.
    #[arg(long)]
    pub endpoint: String,

    /// File to upload.
    pub file: PathBuf,

    /// Bytes per chunk request.
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts allowed at one offset before giving up.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Print events as JSON lines on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Session URL.
    #[arg(long)]
    pub endpoint: String,

    /// Total object size in bytes.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub size: Option<u64>,

    /// Take the object size from this file.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(app::run(cli)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
