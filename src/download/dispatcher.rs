//! Per-attempt session state and the transport event dispatcher.
//!
//! The orchestrator creates a fresh [`DownloadSession`] for every attempt and
//! lends it, together with the write buffer and the sink, to a
//! [`TransferEventDispatcher`]. The dispatcher is the event handler passed to
//! the transport; it never fails outright. Storage problems are latched in
//! the session and inspected once `perform` returns.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use super::buffer::WriteBuffer;
use super::config::SpaceCheck;
use super::error::StorageError;
use super::sink::StorageSink;
use super::transport::{TransportEvent, TransportEventHandler};

/// Counters and the storage-error latch for one attempt.
#[derive(Debug)]
pub struct DownloadSession {
    attempt: u32,
    bytes_written: u64,
    started_at: Instant,
    finished_at: Option<Instant>,
    storage_error: Option<StorageError>,
}

impl DownloadSession {
    /// Starts the clock for attempt number `attempt` (1-indexed).
    #[must_use]
    pub fn start(attempt: u32) -> Self {
        Self {
            attempt,
            bytes_written: 0,
            started_at: Instant::now(),
            finished_at: None,
            storage_error: None,
        }
    }

    /// Attempt number, 1-indexed.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Bytes committed to storage in this attempt.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Returns true once a storage error has been latched.
    #[must_use]
    pub fn has_storage_error(&self) -> bool {
        self.storage_error.is_some()
    }

    /// The latched storage error, if any.
    #[must_use]
    pub fn storage_error(&self) -> Option<&StorageError> {
        self.storage_error.as_ref()
    }

    /// Moves the latched storage error out of the session.
    pub fn take_storage_error(&mut self) -> Option<StorageError> {
        self.storage_error.take()
    }

    /// Stops the clock and returns the attempt's duration.
    pub fn finish(&mut self) -> Duration {
        let end = *self.finished_at.get_or_insert_with(Instant::now);
        end.duration_since(self.started_at)
    }

    /// Time since the attempt started, or its total duration once finished.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }

    /// Latches `err` unless an earlier error is already latched.
    pub(crate) fn latch(&mut self, err: StorageError) {
        if self.storage_error.is_none() {
            self.storage_error = Some(err);
        }
    }

    fn record_committed(&mut self, bytes: u64) {
        self.bytes_written = self.bytes_written.saturating_add(bytes);
    }
}

/// Routes transport events into the write buffer for one attempt.
#[derive(Debug)]
pub struct TransferEventDispatcher<'a, S: StorageSink> {
    session: &'a mut DownloadSession,
    buffer: &'a mut WriteBuffer,
    sink: &'a mut S,
    space_check: SpaceCheck,
    free_snapshot: Option<u64>,
}

impl<'a, S: StorageSink> TransferEventDispatcher<'a, S> {
    /// Binds the dispatcher to one attempt's state.
    pub fn new(
        session: &'a mut DownloadSession,
        buffer: &'a mut WriteBuffer,
        sink: &'a mut S,
        space_check: SpaceCheck,
    ) -> Self {
        Self {
            session,
            buffer,
            sink,
            space_check,
            free_snapshot: None,
        }
    }

    /// Writes out whatever is staged. Failures latch in the session.
    ///
    /// Does nothing once a storage error is latched; staged bytes from a
    /// failed attempt never reach the sink.
    pub fn flush(&mut self) {
        if self.session.has_storage_error() {
            trace!(staged = self.buffer.len(), "skipping flush after storage error");
            return;
        }
        match self.buffer.flush(self.sink) {
            Ok(committed) => self.committed(committed),
            Err(e) => self.session.latch(e),
        }
    }

    fn committed(&mut self, bytes: u64) {
        if bytes > 0 {
            self.session.record_committed(bytes);
            self.free_snapshot = None;
        }
    }

    fn on_data(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        if self.session.has_storage_error() {
            trace!(len = chunk.len(), "dropping data after storage error");
            return;
        }

        let requested = chunk.len() as u64;
        if let Some(available) = self.available_space()
            && available < requested
        {
            error!(requested, available, "out of storage space, aborting transfer");
            self.session
                .latch(StorageError::out_of_space(requested, available));
            return;
        }

        match self.buffer.append(chunk, self.sink) {
            Ok(committed) => self.committed(committed),
            Err(e) => self.session.latch(e),
        }
    }

    /// Free space to compare the next chunk against, or `None` when the
    /// medium cannot report it.
    fn available_space(&mut self) -> Option<u64> {
        let staged = self.buffer.len() as u64;
        match self.space_check {
            SpaceCheck::PerChunk => self.query_free(),
            SpaceCheck::PerFlush => {
                if self.free_snapshot.is_none() {
                    self.free_snapshot = self.query_free();
                }
                self.free_snapshot.map(|free| free.saturating_sub(staged))
            }
        }
    }

    fn query_free(&self) -> Option<u64> {
        match self.sink.space() {
            Ok(info) => Some(info.free()),
            Err(e) => {
                debug!(error = %e, "free space query failed, skipping check");
                None
            }
        }
    }
}

impl<S: StorageSink> TransportEventHandler for TransferEventDispatcher<'_, S> {
    fn on_event(&mut self, event: TransportEvent<'_>) {
        match event {
            TransportEvent::Data(chunk) => self.on_data(chunk),
            TransportEvent::Finished => {
                info!(attempt = self.session.attempt(), "transfer finished");
                self.flush();
            }
            TransportEvent::Connected => info!("connected"),
            TransportEvent::HeaderSent => debug!("request headers sent"),
            TransportEvent::Header { key, value } => debug!(key, value, "response header"),
            TransportEvent::Redirect { target } => warn!(location = target, "redirected"),
            TransportEvent::Disconnected => warn!("disconnected"),
            TransportEvent::Error { message } => warn!(error = message, "transport error event"),
        }
    }
}
