//! Retry policy with exponential backoff for failed transfer attempts.
//!
//! When an attempt fails, the resulting error is classified into a
//! [`FailureType`]:
//! - [`FailureType::Transient`] - transport failures; the next attempt may work
//! - [`FailureType::Permanent`] - storage and init failures; retrying cannot help
//!
//! The [`RetryPolicy`] then decides whether another attempt is made and how
//! long to wait before it.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use flashfetch_core::download::{
//!     DownloadError, FailureType, RetryDecision, RetryPolicy, TransportFailure, classify_error,
//! };
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(1));
//! let error = DownloadError::transport("https://example.com/fw.bin", 1, TransportFailure::Timeout);
//! let failure_type = classify_error(&error);
//!
//! match policy.should_retry(failure_type, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES};

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: read timeout, connection refused, 5xx responses.
    Transient,

    /// Failure that would repeat on every attempt.
    ///
    /// Examples: out of storage space, short write, destination cannot be opened.
    Permanent,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Attempt budget and backoff schedule.
///
/// # Delay Calculation
///
/// ```text
/// delay = base_delay * 2^(attempt - 1)
/// ```
///
/// where `attempt` is the 1-indexed attempt that just failed. With defaults the
/// delays are 1s then 2s before the third and final attempt. No jitter is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Delay before the first retry.
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Delay before the first retry
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using the default base delay.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Delay to wait after `attempt` (1-indexed) failed.
    ///
    /// Saturates at [`Duration::MAX`] instead of overflowing.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .map_or(Duration::MAX, |factor| self.base_delay.saturating_mul(factor))
    }
}

/// Classifies a download error for retry decisions.
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | Transport | Transient | Network may recover |
/// | StorageWrite | Permanent | Space/flash faults do not heal within the retry window |
/// | StorageOpen | Permanent | Destination path or filesystem problem |
/// | ClientInit | Permanent | Configuration problem |
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Transport { .. } => FailureType::Transient,
        DownloadError::StorageWrite { .. }
        | DownloadError::StorageOpen { .. }
        | DownloadError::ClientInit { .. } => FailureType::Permanent,
    }
}
