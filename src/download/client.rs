//! HTTP transport built on reqwest.
//!
//! Each attempt gets a fresh [`HttpClient`] owning its own reqwest client and
//! a current-thread tokio runtime. [`perform`](TransportClient::perform)
//! drives the response stream with `block_on`, so events reach the handler
//! synchronously on the caller's thread.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::{Certificate, Client, redirect};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, instrument};
use url::Url;

use super::error::{TransportFailure, TransportInitError};
use super::transport::{
    Transport, TransportClient, TransportConfig, TransportEvent, TransportEventHandler,
};

/// Default User-Agent sent with every request.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("flashfetch/{version}")
}

/// [`Transport`] that fetches over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    user_agent: String,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Creates a transport sending the default User-Agent.
    #[must_use]
    pub fn new() -> Self {
        Self::with_user_agent(default_user_agent())
    }

    /// Creates a transport sending `user_agent`.
    #[must_use]
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl Transport for HttpTransport {
    type Client = HttpClient;

    #[instrument(level = "debug", skip(self, config), fields(url = %config.url))]
    fn init(&mut self, config: &TransportConfig) -> Result<HttpClient, TransportInitError> {
        let url = parse_url(&config.url)?;
        let client = build_client(config, &self.user_agent)?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportInitError::Build {
                reason: e.to_string(),
            })?;
        debug!("transport client ready");
        Ok(HttpClient {
            client,
            runtime,
            url,
        })
    }
}

/// One-attempt HTTP client. Dropping it releases the connection pool and
/// the runtime.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    runtime: Runtime,
    url: Url,
}

impl HttpClient {
    /// The URL this client fetches.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl TransportClient for HttpClient {
    fn perform(
        &mut self,
        handler: &mut dyn TransportEventHandler,
    ) -> Result<(), TransportFailure> {
        let Self {
            client,
            runtime,
            url,
        } = self;
        runtime.block_on(stream_events(client, url, handler))
    }
}

async fn stream_events(
    client: &Client,
    url: &Url,
    handler: &mut dyn TransportEventHandler,
) -> Result<(), TransportFailure> {
    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            handler.on_event(TransportEvent::Error {
                message: &e.to_string(),
            });
            return Err(map_request_error(&e));
        }
    };

    handler.on_event(TransportEvent::Connected);
    handler.on_event(TransportEvent::HeaderSent);
    if response.url() != url {
        handler.on_event(TransportEvent::Redirect {
            target: response.url().as_str(),
        });
    }
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            handler.on_event(TransportEvent::Header {
                key: name.as_str(),
                value,
            });
        }
    }

    let status = response.status();
    if !status.is_success() {
        let message = format!("server returned HTTP {}", status.as_u16());
        handler.on_event(TransportEvent::Error { message: &message });
        handler.on_event(TransportEvent::Disconnected);
        return Err(TransportFailure::HttpStatus {
            status: status.as_u16(),
        });
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) if bytes.is_empty() => {}
            Ok(bytes) => handler.on_event(TransportEvent::Data(&bytes)),
            Err(e) => {
                handler.on_event(TransportEvent::Error {
                    message: &e.to_string(),
                });
                handler.on_event(TransportEvent::Disconnected);
                return Err(map_stream_error(&e));
            }
        }
    }

    handler.on_event(TransportEvent::Finished);
    handler.on_event(TransportEvent::Disconnected);
    Ok(())
}

fn parse_url(raw: &str) -> Result<Url, TransportInitError> {
    let url = Url::parse(raw).map_err(|e| TransportInitError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TransportInitError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn build_client(config: &TransportConfig, user_agent: &str) -> Result<Client, TransportInitError> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .redirect(redirect::Policy::limited(config.max_redirects))
        .gzip(true)
        .user_agent(user_agent);
    if let Some(path) = &config.ca_bundle {
        builder = builder.add_root_certificate(load_certificate(path)?);
    }
    builder.build().map_err(|e| TransportInitError::Build {
        reason: e.to_string(),
    })
}

fn load_certificate(path: &Path) -> Result<Certificate, TransportInitError> {
    let tls_error = |reason: String| TransportInitError::TlsConfig {
        path: path.to_path_buf(),
        reason,
    };
    let pem = std::fs::read(path).map_err(|e| tls_error(e.to_string()))?;
    Certificate::from_pem(&pem).map_err(|e| tls_error(e.to_string()))
}

fn map_request_error(error: &reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        TransportFailure::Timeout
    } else if error.is_connect() {
        TransportFailure::Connect {
            message: error.to_string(),
        }
    } else {
        TransportFailure::Other {
            message: error.to_string(),
        }
    }
}

fn map_stream_error(error: &reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        TransportFailure::Timeout
    } else {
        TransportFailure::Stream {
            message: error.to_string(),
        }
    }
}
