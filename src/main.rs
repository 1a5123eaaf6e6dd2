//! CLI entry point for the flashfetch tool.

use std::fs;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use flashfetch_core::{DownloadConfig, DownloadOrchestrator, FileStorage, HttpTransport};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::Args;

fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    if loaded.loaded_from_file
        && let Some(path) = &loaded.path
    {
        info!(path = %path.display(), "loaded configuration file");
    }
    let file_config = loaded.config.unwrap_or_default();
    let config = resolve_download_config(&args, &file_config);
    debug!(?config, "effective download configuration");

    let storage = match args.partition_size.or(file_config.partition_size) {
        Some(total) => FileStorage::with_partition_size(total),
        None => FileStorage::new(),
    };

    let mut orchestrator = DownloadOrchestrator::new(HttpTransport::new(), storage, config)?;
    let report = orchestrator.download(&args.url, &args.dest)?;

    match fs::metadata(&args.dest) {
        Ok(metadata) => info!(
            path = %args.dest.display(),
            size = metadata.len(),
            attempts = report.attempts,
            "file written"
        ),
        Err(e) => warn!(path = %args.dest.display(), error = %e, "could not stat downloaded file"),
    }

    Ok(())
}

/// Built-in defaults, then the config file, then CLI flags.
fn resolve_download_config(args: &Args, file_config: &FileConfig) -> DownloadConfig {
    let mut config = file_config.apply(DownloadConfig::default());
    if let Some(value) = args.max_retries {
        config.max_retries = value;
    }
    if let Some(value) = args.buffer_capacity {
        config.buffer_capacity = value;
    }
    if let Some(value) = args.read_timeout_ms {
        config.read_timeout = Duration::from_millis(value);
    }
    if let Some(value) = args.backoff_base_ms {
        config.backoff_base = Duration::from_millis(value);
    }
    config
}
