//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Download one file into flash-backed storage.
///
/// Bytes are staged in a RAM buffer and written to DEST in buffer-sized
/// blocks. Network failures are retried with exponential backoff; storage
/// failures abort immediately.
#[derive(Parser, Debug)]
#[command(name = "flashfetch")]
#[command(author, version, about)]
pub struct Args {
    /// HTTP or HTTPS URL to download
    pub url: String,

    /// Destination file (replaced if it exists)
    pub dest: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/flashfetch/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum attempts, including the first (1-100)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_retries: Option<u32>,

    /// RAM staging buffer size in bytes
    #[arg(long, value_name = "BYTES")]
    pub buffer_capacity: Option<usize>,

    /// Read timeout in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub read_timeout_ms: Option<u64>,

    /// Backoff before the first retry in milliseconds; doubles per retry
    #[arg(long, value_name = "MS")]
    pub backoff_base_ms: Option<u64>,

    /// Emulated partition size in bytes for free-space checks
    #[arg(long, value_name = "BYTES", value_parser = clap::value_parser!(u64).range(1..))]
    pub partition_size: Option<u64>,
}
