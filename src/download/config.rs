//! Operational parameters for a download.

use std::path::PathBuf;
use std::time::Duration;

use super::constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BUFFER_CAPACITY, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_RETRIES, DEFAULT_MIN_SPEED_BPS, DEFAULT_READ_TIMEOUT,
    MAX_BUFFER_CAPACITY, MIN_BUFFER_CAPACITY,
};

/// When the free-space snapshot guarding each data chunk is refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpaceCheck {
    /// Query the medium for every incoming chunk.
    #[default]
    PerChunk,
    /// Query once, then again only after each flush. Bytes staged since the
    /// snapshot count against it.
    PerFlush,
}

impl SpaceCheck {
    /// Returns the stable label used in config files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerChunk => "per_chunk",
            Self::PerFlush => "per_flush",
        }
    }
}

/// Invalid [`DownloadConfig`] value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `max_retries` must allow at least one attempt.
    #[error("invalid max_retries {value}: must be at least 1")]
    InvalidMaxRetries {
        /// The rejected value.
        value: u32,
    },

    /// Buffer capacity outside the supported range.
    #[error(
        "invalid buffer_capacity {value}: must be between {MIN_BUFFER_CAPACITY} and {MAX_BUFFER_CAPACITY}"
    )]
    InvalidBufferCapacity {
        /// The rejected value.
        value: usize,
    },

    /// A timeout of zero would fail every transfer immediately.
    #[error("invalid {field}: must be greater than zero")]
    ZeroTimeout {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Download tuning, fixed for the lifetime of an orchestrator.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `min_speed_bps`: 400 KiB/s
/// - `read_timeout`: 5 seconds
/// - `connect_timeout`: 10 seconds
/// - `backoff_base`: 1 second
/// - `buffer_capacity`: 32 KiB
/// - `max_redirects`: 10
/// - `space_check`: per chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Maximum attempts, including the first.
    pub max_retries: u32,
    /// Throughput below this (bytes/sec) logs a warning.
    pub min_speed_bps: u64,
    /// Transport read timeout.
    pub read_timeout: Duration,
    /// Transport connect timeout.
    pub connect_timeout: Duration,
    /// Backoff before the first retry; doubles for each further retry.
    pub backoff_base: Duration,
    /// RAM staging buffer size in bytes.
    pub buffer_capacity: usize,
    /// Redirect hops the transport may follow.
    pub max_redirects: usize,
    /// Free-space refresh cadence.
    pub space_check: SpaceCheck,
    /// Extra PEM trust anchors for TLS.
    pub ca_bundle: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_speed_bps: DEFAULT_MIN_SPEED_BPS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            space_check: SpaceCheck::default(),
            ca_bundle: None,
        }
    }
}

impl DownloadConfig {
    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the staging buffer size.
    #[must_use]
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    /// Sets the base backoff delay.
    #[must_use]
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Sets the slow-download warning threshold.
    #[must_use]
    pub fn with_min_speed_bps(mut self, min_speed_bps: u64) -> Self {
        self.min_speed_bps = min_speed_bps;
        self
    }

    /// Sets the free-space refresh cadence.
    #[must_use]
    pub fn with_space_check(mut self, space_check: SpaceCheck) -> Self {
        self.space_check = space_check;
        self
    }

    /// Checks values the orchestrator cannot work with.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries {
                value: self.max_retries,
            });
        }
        if !(MIN_BUFFER_CAPACITY..=MAX_BUFFER_CAPACITY).contains(&self.buffer_capacity) {
            return Err(ConfigError::InvalidBufferCapacity {
                value: self.buffer_capacity,
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "read_timeout",
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "connect_timeout",
            });
        }
        Ok(())
    }
}
