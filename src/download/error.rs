//! Error types for the download module.
//!
//! Storage failures end the whole operation; transport failures are retried
//! until the attempt budget runs out.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while persisting buffered bytes to the storage sink.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The medium reported less free space than the incoming chunk needs.
    #[error("out of storage space: {requested} bytes incoming, {available} bytes free")]
    OutOfSpace {
        /// Size of the chunk that did not fit.
        requested: u64,
        /// Free space reported by the medium.
        available: u64,
    },

    /// The sink accepted fewer bytes than were handed to it.
    #[error("short write: requested {requested} bytes, sink wrote {written}")]
    ShortWrite {
        /// Bytes handed to the sink.
        requested: usize,
        /// Bytes the sink reported as written.
        written: usize,
    },

    /// The sink returned an IO error.
    #[error("storage IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A chunk arrived after an earlier write failure and was refused.
    #[error("storage already failed, {len} bytes rejected")]
    Rejected {
        /// Size of the refused chunk.
        len: usize,
    },
}

impl StorageError {
    /// Creates an out-of-space error.
    pub fn out_of_space(requested: u64, available: u64) -> Self {
        Self::OutOfSpace {
            requested,
            available,
        }
    }

    /// Creates a short-write error.
    pub fn short_write(requested: usize, written: usize) -> Self {
        Self::ShortWrite { requested, written }
    }

    /// Wraps an IO error from the sink.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io { source }
    }

    /// Creates an error for a chunk refused after an earlier failure.
    pub fn rejected(len: usize) -> Self {
        Self::Rejected { len }
    }
}

/// Transport client could not be constructed for an attempt.
#[derive(Debug, Error)]
pub enum TransportInitError {
    /// The target URL does not parse or uses an unsupported scheme.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The TLS trust bundle could not be loaded.
    #[error("failed to load CA bundle {}: {reason}", path.display())]
    TlsConfig {
        /// Path of the PEM bundle.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The client or its runtime could not be built.
    #[error("failed to build transport client: {reason}")]
    Build {
        /// What went wrong.
        reason: String,
    },
}

/// Non-success terminal status of a transport perform call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// No data arrived within the read timeout (or connect timed out).
    #[error("transfer timed out")]
    Timeout,

    /// Connection could not be established.
    #[error("connection failed: {message}")]
    Connect {
        /// Transport-provided description.
        message: String,
    },

    /// Server answered with a non-success status.
    #[error("server returned HTTP {status}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
    },

    /// The body stream broke off mid-transfer.
    #[error("stream interrupted: {message}")]
    Stream {
        /// Transport-provided description.
        message: String,
    },

    /// Any other transport-level failure.
    #[error("transport error: {message}")]
    Other {
        /// Transport-provided description.
        message: String,
    },
}

/// Terminal errors of a download operation.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Transport client could not be initialized; no attempt was made.
    #[error("failed to initialize transport for {url}: {source}")]
    ClientInit {
        /// The URL being downloaded.
        url: String,
        /// The underlying init error.
        #[source]
        source: TransportInitError,
    },

    /// Destination could not be opened for writing.
    #[error("failed to open {} for writing: {source}", path.display())]
    StorageOpen {
        /// The destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Persisting received bytes failed; the operation is not retried.
    #[error("storage failure writing {} on attempt {attempt}: {source}", path.display())]
    StorageWrite {
        /// The destination path.
        path: PathBuf,
        /// The attempt during which storage failed (1-indexed).
        attempt: u32,
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// Every attempt failed at the transport level.
    #[error("download of {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        /// The URL being downloaded.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Failure of the last attempt.
        #[source]
        source: TransportFailure,
    },
}

impl DownloadError {
    /// Creates a client init error.
    pub fn client_init(url: impl Into<String>, source: TransportInitError) -> Self {
        Self::ClientInit {
            url: url.into(),
            source,
        }
    }

    /// Creates a storage open error.
    pub fn storage_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageOpen {
            path: path.into(),
            source,
        }
    }

    /// Creates a storage write error.
    pub fn storage_write(path: impl Into<PathBuf>, attempt: u32, source: StorageError) -> Self {
        Self::StorageWrite {
            path: path.into(),
            attempt,
            source,
        }
    }

    /// Creates a transport error for an exhausted retry budget.
    pub fn transport(url: impl Into<String>, attempts: u32, source: TransportFailure) -> Self {
        Self::Transport {
            url: url.into(),
            attempts,
            source,
        }
    }
}

// No `From<std::io::Error>` impls: every variant needs a url or path that the
// source error does not carry. Use the constructors above.
