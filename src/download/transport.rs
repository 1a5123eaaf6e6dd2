//! Transport collaborator interface.
//!
//! A [`Transport`] builds one [`TransportClient`] per attempt from a
//! [`TransportConfig`]. The client's [`perform`](TransportClient::perform)
//! call blocks until the transfer ends and reports progress by invoking a
//! [`TransportEventHandler`] synchronously on the calling thread. Dropping
//! the client releases it.

use std::path::PathBuf;
use std::time::Duration;

use super::error::{TransportFailure, TransportInitError};

/// One notification from a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent<'a> {
    /// Connection to the server is established.
    Connected,
    /// Request headers were sent.
    HeaderSent,
    /// One response header.
    Header {
        /// Header name.
        key: &'a str,
        /// Header value.
        value: &'a str,
    },
    /// A chunk of the response body.
    Data(&'a [u8]),
    /// The body has been fully received.
    Finished,
    /// The connection was closed.
    Disconnected,
    /// The request was redirected.
    Redirect {
        /// Location the transport was sent to.
        target: &'a str,
    },
    /// The transport hit an error. The terminal status comes from `perform`.
    Error {
        /// Transport-provided description.
        message: &'a str,
    },
}

/// Receiver of transport events.
pub trait TransportEventHandler {
    /// Called for every event, in order, on the thread running `perform`.
    fn on_event(&mut self, event: TransportEvent<'_>);
}

/// Per-attempt transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Resource to fetch.
    pub url: String,
    /// Maximum idle time waiting for the next piece of data.
    pub read_timeout: Duration,
    /// Maximum time to establish the connection.
    pub connect_timeout: Duration,
    /// Redirect hops the transport may follow on its own.
    pub max_redirects: usize,
    /// Extra PEM trust anchors for TLS.
    pub ca_bundle: Option<PathBuf>,
}

/// Factory for per-attempt clients.
pub trait Transport {
    /// Client type for one attempt.
    type Client: TransportClient;

    /// Initializes a client for one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TransportInitError`] if the client cannot be constructed.
    fn init(&mut self, config: &TransportConfig) -> Result<Self::Client, TransportInitError>;
}

/// A client ready to run exactly one transfer.
pub trait TransportClient {
    /// Runs the transfer to completion, delivering events to `handler`.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportFailure`] that ended the transfer.
    fn perform(&mut self, handler: &mut dyn TransportEventHandler)
    -> Result<(), TransportFailure>;
}
