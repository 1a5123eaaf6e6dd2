//! Constants for the download module (buffer sizing, timeouts, retry budget).

use std::time::Duration;

/// Default maximum number of transfer attempts (including the first one).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default RAM staging buffer size in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32 * 1024;

/// Throughput below this rate (bytes/sec) is reported with a warning.
pub const DEFAULT_MIN_SPEED_BPS: u64 = 400 * 1024;

/// Default per-read timeout (5 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default base delay for exponential backoff (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Default redirect hop limit handed to the transport.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Smallest accepted staging buffer.
pub const MIN_BUFFER_CAPACITY: usize = 512;

/// Largest accepted staging buffer (1 MiB).
pub const MAX_BUFFER_CAPACITY: usize = 1024 * 1024;
