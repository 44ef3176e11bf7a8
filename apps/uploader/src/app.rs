//! Subcommand implementations.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use resumable_http::HttpTransport;
use resumable_transfer::{
    ByteSource, ChunkTransferDriver, FileSource, ProgressTracker, SessionStatus, TransferError,
    TransferProgress,
};
use tracing::{info, warn};

use crate::config::{self, Config, Overrides};
use crate::{Cli, Command, ConfigCommand, StatusArgs, UploadArgs};

/// Exit code for a transfer stopped by Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Command::Upload(args) => {
            config.apply(&Overrides {
                chunk_size: args.chunk_size,
                timeout_secs: args.timeout,
                max_attempts: args.max_attempts,
                json: args.json,
            });
            upload(args, config).await
        }
        Command::Status(args) => status(args, config).await,
        Command::Config(ConfigCommand::Show) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config(ConfigCommand::Init { force }) => {
            let path = cli.config.unwrap_or_else(config::config_path);
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(&path)?;
            println!("wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_driver(config: &Config) -> anyhow::Result<ChunkTransferDriver> {
    let transport = HttpTransport::new(Some(config.connect_timeout()))?;
    let driver = ChunkTransferDriver::new(Arc::new(transport), config.transfer.clone())?;
    Ok(driver)
}

async fn upload(args: UploadArgs, config: Config) -> anyhow::Result<ExitCode> {
    let source = FileSource::open(&args.file)
        .await
        .with_context(|| format!("opening {}", args.file.display()))?;
    let total = source.size();
    info!(file = %source.path().display(), total_bytes = total, "uploading");

    let mut driver = build_driver(&config)?;
    let mut events = driver
        .take_events()
        .context("event receiver already taken")?;

    let json = config.json_events;
    let tracker = Arc::new(ProgressTracker::new(total));
    if !json {
        tracker.on_progress(Box::new(|p: &TransferProgress| eprintln!("{}", format_progress(p))));
    }

    let printer = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!(error = %e, "failed to encode event"),
                    }
                }
                tracker.apply(&event);
            }
        })
    };

    let cancel = driver.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling transfer");
            cancel.cancel();
        }
    });

    let result = driver.transfer(&source, &args.endpoint).await;
    interrupt.abort();
    // Dropping the driver closes the event channel and ends the printer.
    drop(driver);
    printer.await.context("event printer panicked")?;

    match result {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "uploaded {} bytes in {} requests ({} retries)",
                    report.total_bytes, report.requests, report.retries
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(TransferError::Cancelled { committed }) => {
            eprintln!("cancelled: {committed} of {total} bytes committed");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(e) => Err(e.into()),
    }
}

async fn status(args: StatusArgs, config: Config) -> anyhow::Result<ExitCode> {
    let total = match (args.size, &args.file) {
        (Some(size), _) => size,
        (None, Some(file)) => FileSource::open(file)
            .await
            .with_context(|| format!("opening {}", file.display()))?
            .size(),
        (None, None) => anyhow::bail!("either --size or a file is required"),
    };

    let driver = build_driver(&config)?;
    match driver.query_status(&args.endpoint, total).await? {
        SessionStatus::Complete { status } => {
            println!("complete (status {status})");
        }
        SessionStatus::Incomplete { committed } => {
            println!("incomplete: {committed} of {total} bytes committed");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn format_progress(p: &TransferProgress) -> String {
    let mut line = format!(
        "{:5.1}%  {}/{} bytes  {}/s",
        p.percent(),
        p.committed,
        p.total,
        format_bytes(p.bytes_per_second as u64)
    );
    if let Some(eta) = p.eta {
        line.push_str(&format!("  eta {}s", eta.as_secs()));
    }
    if p.retries > 0 {
        line.push_str(&format!("  ({} retries)", p.retries));
    }
    line
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
