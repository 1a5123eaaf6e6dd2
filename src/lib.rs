//! Flashfetch core library
//!
//! Downloads a single HTTP(S) resource into space-constrained flash storage,
//! buffering writes in RAM and retrying network failures with exponential
//! backoff.
//!
//! # Architecture
//!
//! Everything lives under [`download`]:
//! - [`download::WriteBuffer`] - fixed RAM staging area, flushed when full
//! - [`download::StorageSink`] - destination writes and free-space queries
//! - [`download::TransferEventDispatcher`] - transport events to buffer operations
//! - [`download::DownloadOrchestrator`] - attempt loop with backoff

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;

// Re-export commonly used types
pub use download::{
    DownloadConfig, DownloadError, DownloadOrchestrator, DownloadReport, FailureType,
    FileStorage, HttpTransport, RetryDecision, RetryPolicy, SpaceCheck, classify_error,
};
