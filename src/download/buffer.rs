//! Fixed-capacity RAM staging buffer in front of a [`StorageSink`].
//!
//! Flash media wear per write and pay a large fixed cost per call, so
//! incoming chunks are copied into one buffer and written out in bulk: once
//! whenever the buffer fills, and once more when the stream ends.
//!
//! The first flush failure latches. After that, [`WriteBuffer::flush`] is a
//! no-op and [`WriteBuffer::append`] refuses new bytes until
//! [`WriteBuffer::reset`] is called at the start of the next attempt.

use tracing::{error, trace};

use super::error::StorageError;
use super::sink::StorageSink;

/// Fixed-capacity staging buffer.
#[derive(Debug)]
pub struct WriteBuffer {
    data: Box<[u8]>,
    offset: usize,
    latched: bool,
}

impl WriteBuffer {
    /// Allocates a buffer of `capacity` bytes. The capacity never changes.
    ///
    /// A zero capacity is bumped to one byte.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            offset: 0,
            latched: false,
        }
    }

    /// Total buffer size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently staged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offset
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Returns true once a flush has failed in this attempt.
    #[must_use]
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Drops staged bytes and clears the failure latch.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.latched = false;
    }

    /// Stages `chunk`, flushing to `sink` each time the buffer fills.
    ///
    /// Returns the number of bytes committed to the sink during this call
    /// (zero when everything fit without a flush).
    ///
    /// # Errors
    ///
    /// Returns the first flush failure. Bytes of `chunk` not yet copied at
    /// that point are not accepted. Until [`reset`](Self::reset), every later
    /// call fails with [`StorageError::Rejected`].
    pub fn append<S: StorageSink>(
        &mut self,
        chunk: &[u8],
        sink: &mut S,
    ) -> Result<u64, StorageError> {
        if self.latched {
            return Err(StorageError::rejected(chunk.len()));
        }

        let mut committed = 0u64;
        let mut rest = chunk;

        while !rest.is_empty() {
            let space_left = self.capacity() - self.offset;
            let take = rest.len().min(space_left);
            self.data[self.offset..self.offset + take].copy_from_slice(&rest[..take]);
            self.offset += take;
            rest = &rest[take..];

            if self.offset == self.capacity() {
                committed += self.flush(sink)?;
            }
        }

        Ok(committed)
    }

    /// Writes all staged bytes to `sink` in a single call.
    ///
    /// Returns the number of bytes written; zero when the buffer is empty or
    /// a previous flush already failed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the sink errors, or
    /// [`StorageError::ShortWrite`] if it reports fewer bytes than requested.
    /// Either one latches the buffer.
    pub fn flush<S: StorageSink>(&mut self, sink: &mut S) -> Result<u64, StorageError> {
        if self.offset == 0 || self.latched {
            return Ok(0);
        }

        let requested = self.offset;
        let result = sink.write(&self.data[..requested]);
        // Staged bytes are discarded either way; a failed attempt is never
        // resumed from the buffer.
        self.offset = 0;

        match result {
            Ok(written) if written == requested => {
                trace!(bytes = written, "flushed write buffer");
                Ok(written as u64)
            }
            Ok(written) => {
                error!(requested, written, "short write to storage");
                self.latched = true;
                Err(StorageError::short_write(requested, written))
            }
            Err(e) => {
                error!(error = %e, requested, "storage write failed");
                self.latched = true;
                Err(StorageError::io(e))
            }
        }
    }
}
