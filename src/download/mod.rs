//! Resilient download of one HTTP resource into flash-backed storage.
//!
//! Bytes arriving from the network are staged in a fixed RAM [`WriteBuffer`]
//! and committed to a [`StorageSink`] in buffer-sized writes. The
//! [`TransferEventDispatcher`] turns transport events into buffer operations
//! and guards every chunk with a free-space check. The
//! [`DownloadOrchestrator`] retries transport failures with exponential
//! backoff and aborts immediately on storage failures.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use flashfetch_core::download::{DownloadConfig, DownloadOrchestrator, FileStorage, HttpTransport};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut orchestrator =
//!     DownloadOrchestrator::new(HttpTransport::new(), FileStorage::new(), DownloadConfig::default())?;
//! let report = orchestrator.download("http://example.com/sample.txt", Path::new("./sample.txt"))?;
//! println!("{} bytes", report.bytes_written);
//! # Ok(())
//! # }
//! ```

mod buffer;
mod client;
mod config;
mod constants;
mod dispatcher;
mod error;
mod orchestrator;
mod retry;
mod sink;
mod transport;

pub use buffer::WriteBuffer;
pub use client::{HttpClient, HttpTransport, default_user_agent};
pub use config::{ConfigError, DownloadConfig, SpaceCheck};
pub use constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BUFFER_CAPACITY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS,
    DEFAULT_MAX_RETRIES, DEFAULT_MIN_SPEED_BPS, DEFAULT_READ_TIMEOUT, MAX_BUFFER_CAPACITY,
    MIN_BUFFER_CAPACITY,
};
pub use dispatcher::{DownloadSession, TransferEventDispatcher};
pub use error::{DownloadError, StorageError, TransportFailure, TransportInitError};
pub use orchestrator::{DownloadOrchestrator, DownloadReport, Sleeper, ThreadSleeper};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
pub use sink::{FileSink, FileStorage, SpaceInfo, Storage, StorageSink};
pub use transport::{
    Transport, TransportClient, TransportConfig, TransportEvent, TransportEventHandler,
};

// Module-local Result aliases are not defined; signatures spell out
// `Result<T, DownloadError>`.
