//! Retry loop around single transfer attempts.
//!
//! The [`DownloadOrchestrator`] runs up to `max_retries` attempts of one
//! logical download. Each attempt is a full transport round trip:
//!
//! 1. initialize a transport client (failure is fatal, nothing is retried)
//! 2. unlink the destination and open a fresh sink (failure is fatal)
//! 3. start a new [`DownloadSession`] and reset the write buffer
//! 4. run the blocking `perform` call with a [`TransferEventDispatcher`]
//! 5. flush the buffer once more, then close the sink
//! 6. decide: success, abort on storage error, or back off and retry
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use flashfetch_core::download::{DownloadConfig, DownloadOrchestrator, FileStorage, HttpTransport};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut orchestrator = DownloadOrchestrator::new(
//!     HttpTransport::new(),
//!     FileStorage::with_partition_size(960 * 1024),
//!     DownloadConfig::default(),
//! )?;
//! let report = orchestrator.download("https://example.com/sample.txt", Path::new("/spiffs/sample.txt"))?;
//! println!("{} bytes in {} attempt(s)", report.bytes_written, report.attempts);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use super::buffer::WriteBuffer;
use super::config::{ConfigError, DownloadConfig};
use super::dispatcher::{DownloadSession, TransferEventDispatcher};
use super::error::{DownloadError, StorageError};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::sink::{Storage, StorageSink};
use super::transport::{Transport, TransportClient, TransportConfig};

/// Blocking delay between attempts.
pub trait Sleeper {
    /// Blocks the current thread for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// [`Sleeper`] that parks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Outcome of a successful download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReport {
    /// Bytes committed to the destination by the successful attempt.
    pub bytes_written: u64,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Duration of the successful attempt.
    pub elapsed: Duration,
    /// Average throughput of the successful attempt in KiB/s.
    pub throughput_kbps: f64,
    /// Whether throughput fell below the configured minimum.
    pub below_min_speed: bool,
}

impl DownloadReport {
    fn new(bytes_written: u64, attempts: u32, elapsed: Duration, min_speed_bps: u64) -> Self {
        let secs = elapsed.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let kib = bytes_written as f64 / 1024.0;
        let throughput_kbps = if secs > 0.0 { kib / secs } else { f64::INFINITY };
        #[allow(clippy::cast_precision_loss)]
        let min_kbps = min_speed_bps as f64 / 1024.0;
        Self {
            bytes_written,
            attempts,
            elapsed,
            throughput_kbps,
            below_min_speed: throughput_kbps < min_kbps,
        }
    }
}

/// Runs attempts of one download until success, a fatal error, or the
/// attempt budget is spent.
#[derive(Debug)]
pub struct DownloadOrchestrator<T, S, Z = ThreadSleeper> {
    transport: T,
    storage: S,
    sleeper: Z,
    config: DownloadConfig,
    retry_policy: RetryPolicy,
    buffer: WriteBuffer,
}

impl<T: Transport, S: Storage> DownloadOrchestrator<T, S, ThreadSleeper> {
    /// Creates an orchestrator that sleeps the calling thread between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(transport: T, storage: S, config: DownloadConfig) -> Result<Self, ConfigError> {
        Self::with_sleeper(transport, storage, ThreadSleeper, config)
    }
}

impl<T: Transport, S: Storage, Z: Sleeper> DownloadOrchestrator<T, S, Z> {
    /// Creates an orchestrator with a custom backoff [`Sleeper`].
    ///
    /// The write buffer is allocated here, once, and reused by every attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn with_sleeper(
        transport: T,
        storage: S,
        sleeper: Z,
        config: DownloadConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport,
            storage,
            sleeper,
            retry_policy: RetryPolicy::new(config.max_retries, config.backoff_base),
            buffer: WriteBuffer::with_capacity(config.buffer_capacity),
            config,
        })
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// The transport factory.
    #[cfg(test)]
    fn transport(&self) -> &T {
        &self.transport
    }

    /// The backoff sleeper.
    #[cfg(test)]
    fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    /// Bytes left staged in the write buffer.
    #[cfg(test)]
    fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn transport_config(&self, url: &str) -> TransportConfig {
        TransportConfig {
            url: url.to_string(),
            read_timeout: self.config.read_timeout,
            connect_timeout: self.config.connect_timeout,
            max_redirects: self.config.max_redirects,
            ca_bundle: self.config.ca_bundle.clone(),
        }
    }

    /// Downloads `url` into `dest`, retrying transport failures with
    /// exponential backoff.
    ///
    /// On success `dest` holds exactly [`DownloadReport::bytes_written`]
    /// bytes. On failure its content is unspecified.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::ClientInit`] if the transport client cannot be built
    /// - [`DownloadError::StorageOpen`] if `dest` cannot be opened
    /// - [`DownloadError::StorageWrite`] on the first storage failure
    /// - [`DownloadError::Transport`] once every attempt failed in transit
    #[instrument(skip(self, dest), fields(dest = %dest.display(), max_attempts = self.retry_policy.max_attempts()))]
    pub fn download(&mut self, url: &str, dest: &Path) -> Result<DownloadReport, DownloadError> {
        let transport_config = self.transport_config(url);
        let mut attempt = 1;

        loop {
            info!(attempt, "starting download attempt");

            let mut client = self.transport.init(&transport_config).map_err(|e| {
                error!(error = %e, "failed to initialize transport client");
                DownloadError::client_init(url, e)
            })?;

            // The client is dropped on this early return before anything is
            // performed.
            let mut sink = self.storage.open_truncate(dest).map_err(|e| {
                error!(error = %e, "failed to open destination for writing");
                DownloadError::storage_open(dest, e)
            })?;

            self.buffer.reset();
            let mut session = DownloadSession::start(attempt);
            let status = {
                let mut dispatcher = TransferEventDispatcher::new(
                    &mut session,
                    &mut self.buffer,
                    &mut sink,
                    self.config.space_check,
                );
                let status = client.perform(&mut dispatcher);
                // Covers transfers that ended without a Finished event.
                dispatcher.flush();
                status
            };

            if let Err(e) = sink.close() {
                error!(error = %e, "failed to close destination");
                if status.is_ok() {
                    session.latch(StorageError::io(e));
                }
            }
            let elapsed = session.finish();

            if let Some(storage_error) = session.take_storage_error() {
                error!(attempt, error = %storage_error, "aborting due to storage error");
                drop(client);
                return Err(DownloadError::storage_write(dest, attempt, storage_error));
            }

            match status {
                Ok(()) => {
                    let report = DownloadReport::new(
                        session.bytes_written(),
                        attempt,
                        elapsed,
                        self.config.min_speed_bps,
                    );
                    info!(
                        bytes = report.bytes_written,
                        elapsed_secs = elapsed.as_secs_f64(),
                        kbps = report.throughput_kbps,
                        "downloaded"
                    );
                    if report.below_min_speed {
                        warn!(
                            kbps = report.throughput_kbps,
                            min_speed_bps = self.config.min_speed_bps,
                            "download speed below minimum requirement"
                        );
                    }
                    info!(attempts = attempt, bytes = report.bytes_written, "download complete");
                    drop(client);
                    return Ok(report);
                }
                Err(failure) => {
                    error!(attempt, error = %failure, "download attempt failed");
                    let err = DownloadError::transport(url, attempt, failure);
                    match self.retry_policy.should_retry(classify_error(&err), attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                        } => {
                            warn!(delay_ms = delay.as_millis(), next_attempt = next, "retrying");
                            self.sleeper.sleep(delay);
                            drop(client);
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            error!(reason = %reason, "giving up");
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    use super::*;
    use crate::download::error::{TransportFailure, TransportInitError};
    use crate::download::sink::SpaceInfo;
    use crate::download::transport::{TransportEvent, TransportEventHandler};

    // ==================== Test Doubles ====================

    #[derive(Debug, Default)]
    struct RecordingSleeper {
        sleeps: Vec<Duration>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.sleeps.push(duration);
        }
    }

    #[derive(Debug, Clone)]
    enum Step {
        Data(usize, u8),
        Finished,
    }

    #[derive(Debug, Clone)]
    struct Script {
        steps: Vec<Step>,
        status: Result<(), TransportFailure>,
    }

    impl Script {
        fn ok(chunks: &[usize]) -> Self {
            let mut steps: Vec<Step> = chunks
                .iter()
                .enumerate()
                .map(|(i, &len)| Step::Data(len, i as u8))
                .collect();
            steps.push(Step::Finished);
            Self {
                steps,
                status: Ok(()),
            }
        }

        fn failing(chunks: &[usize]) -> Self {
            Self {
                steps: chunks.iter().map(|&len| Step::Data(len, 0xEE)).collect(),
                status: Err(TransportFailure::Timeout),
            }
        }
    }

    #[derive(Debug, Default)]
    struct ScriptedTransport {
        scripts: VecDeque<Script>,
        fail_init: bool,
        inits: u32,
        performs: Rc<RefCell<u32>>,
        urls: Vec<String>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: scripts.into(),
                ..Self::default()
            }
        }
    }

    struct ScriptedClient {
        script: Script,
        performs: Rc<RefCell<u32>>,
    }

    impl Transport for ScriptedTransport {
        type Client = ScriptedClient;

        fn init(&mut self, config: &TransportConfig) -> Result<ScriptedClient, TransportInitError> {
            self.inits += 1;
            self.urls.push(config.url.clone());
            if self.fail_init {
                return Err(TransportInitError::Build {
                    reason: "no memory for client".to_string(),
                });
            }
            let script = self
                .scripts
                .pop_front()
                .unwrap_or_else(|| Script::failing(&[]));
            Ok(ScriptedClient {
                script,
                performs: Rc::clone(&self.performs),
            })
        }
    }

    impl TransportClient for ScriptedClient {
        fn perform(
            &mut self,
            handler: &mut dyn TransportEventHandler,
        ) -> Result<(), TransportFailure> {
            *self.performs.borrow_mut() += 1;
            handler.on_event(TransportEvent::Connected);
            for step in &self.script.steps {
                match step {
                    Step::Data(len, byte) => handler.on_event(TransportEvent::Data(&vec![*byte; *len])),
                    Step::Finished => handler.on_event(TransportEvent::Finished),
                }
            }
            handler.on_event(TransportEvent::Disconnected);
            self.script.status.clone()
        }
    }

    #[derive(Debug, Default)]
    struct MemoryState {
        contents: Vec<u8>,
        writes: Vec<usize>,
        opens: u32,
        closes: u32,
        fail_open: bool,
        fail_close: bool,
        space: Option<SpaceInfo>,
    }

    #[derive(Debug, Clone, Default)]
    struct MemoryStorage(Rc<RefCell<MemoryState>>);

    struct MemorySink(Rc<RefCell<MemoryState>>);

    impl Storage for MemoryStorage {
        type Sink = MemorySink;

        fn open_truncate(&self, _path: &Path) -> io::Result<MemorySink> {
            let mut state = self.0.borrow_mut();
            state.opens += 1;
            if state.fail_open {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            state.contents.clear();
            Ok(MemorySink(Rc::clone(&self.0)))
        }
    }

    impl StorageSink for MemorySink {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            let mut state = self.0.borrow_mut();
            state.contents.extend_from_slice(bytes);
            state.writes.push(bytes.len());
            Ok(bytes.len())
        }

        fn space(&self) -> io::Result<SpaceInfo> {
            let state = self.0.borrow();
            state
                .space
                .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "no space info"))
        }

        fn close(self) -> io::Result<()> {
            let mut state = self.0.borrow_mut();
            state.closes += 1;
            if state.fail_close {
                return Err(io::Error::other("flush failed"));
            }
            Ok(())
        }
    }

    type TestOrchestrator = DownloadOrchestrator<ScriptedTransport, MemoryStorage, RecordingSleeper>;

    fn orchestrator(
        transport: ScriptedTransport,
        storage: &MemoryStorage,
        config: DownloadConfig,
    ) -> TestOrchestrator {
        DownloadOrchestrator::with_sleeper(
            transport,
            storage.clone(),
            RecordingSleeper::default(),
            config,
        )
        .unwrap()
    }

    fn dest() -> &'static Path {
        Path::new("/spiffs/sample.txt")
    }

    const URL: &str = "https://example.com/sample.txt";

    // ==================== Construction ====================

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = DownloadOrchestrator::new(
            ScriptedTransport::default(),
            MemoryStorage::default(),
            DownloadConfig::default().with_max_retries(0),
        );
        assert!(matches!(result, Err(ConfigError::InvalidMaxRetries { .. })));
    }

    #[test]
    fn test_transport_config_carries_url_and_timeouts() {
        let config = DownloadConfig::default().with_read_timeout(Duration::from_millis(750));
        let orchestrator = orchestrator(ScriptedTransport::default(), &MemoryStorage::default(), config);
        let transport_config = orchestrator.transport_config(URL);
        assert_eq!(transport_config.url, URL);
        assert_eq!(transport_config.read_timeout, Duration::from_millis(750));
        assert_eq!(transport_config.max_redirects, 10);
    }

    // ==================== Success Path ====================

    #[test]
    fn test_success_first_attempt() {
        let storage = MemoryStorage::default();
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![Script::ok(&[20000, 20000])]),
            &storage,
            DownloadConfig::default().with_min_speed_bps(0),
        );

        let report = orchestrator.download(URL, dest()).unwrap();

        assert_eq!(report.bytes_written, 40000);
        assert_eq!(report.attempts, 1);
        assert!(!report.below_min_speed);
        let state = storage.0.borrow();
        assert_eq!(state.writes, vec![32768, 7232]);
        assert_eq!(state.contents.len(), 40000);
        assert_eq!(state.closes, 1);
        assert!(orchestrator.sleeper().sleeps.is_empty());
        assert_eq!(orchestrator.transport().urls, vec![URL.to_string()]);
    }

    #[test]
    fn test_two_transport_failures_then_success() {
        let storage = MemoryStorage::default();
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![
                Script::failing(&[5000]),
                Script::failing(&[]),
                Script::ok(&[20000, 20000]),
            ]),
            &storage,
            DownloadConfig::default(),
        );

        let report = orchestrator.download(URL, dest()).unwrap();

        assert_eq!(report.bytes_written, 40000);
        assert_eq!(report.attempts, 3);
        assert_eq!(
            orchestrator.sleeper().sleeps,
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
        let state = storage.0.borrow();
        assert_eq!(state.opens, 3);
        assert_eq!(state.closes, 3);
        // Only the final attempt's bytes survive.
        assert_eq!(state.contents.len(), 40000);
        assert!(state.contents.iter().all(|&b| b != 0xEE));
    }

    #[test]
    fn test_slow_download_is_still_success() {
        let storage = MemoryStorage::default();
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![Script::ok(&[100])]),
            &storage,
            DownloadConfig::default().with_min_speed_bps(u64::MAX),
        );

        let report = orchestrator.download(URL, dest()).unwrap();

        assert_eq!(report.bytes_written, 100);
        // A zero-length clock reading reports infinite throughput instead.
        if report.throughput_kbps.is_finite() {
            assert!(report.below_min_speed);
        }
    }

    #[test]
    fn test_missing_finished_event_still_flushes_tail() {
        let storage = MemoryStorage::default();
        let script = Script {
            steps: vec![Step::Data(700, 1)],
            status: Ok(()),
        };
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![script]),
            &storage,
            DownloadConfig::default(),
        );

        let report = orchestrator.download(URL, dest()).unwrap();

        assert_eq!(report.bytes_written, 700);
        assert_eq!(storage.0.borrow().writes, vec![700]);
    }

    #[test]
    fn test_report_throughput_math() {
        let report = DownloadReport::new(2048 * 10, 1, Duration::from_secs(10), 4 * 1024);
        assert!((report.throughput_kbps - 2.0).abs() < 1e-9);
        assert!(report.below_min_speed);

        let report = DownloadReport::new(1024, 1, Duration::ZERO, u64::MAX);
        assert!(report.throughput_kbps.is_infinite());
        assert!(!report.below_min_speed);
    }

    // ==================== Fatal Paths ====================

    #[test]
    fn test_open_failure_makes_no_transport_attempt() {
        let storage = MemoryStorage::default();
        storage.0.borrow_mut().fail_open = true;
        let transport = ScriptedTransport::new(vec![Script::ok(&[10])]);
        let performs = Rc::clone(&transport.performs);
        let mut orchestrator = orchestrator(transport, &storage, DownloadConfig::default());

        let err = orchestrator.download(URL, dest()).unwrap_err();

        assert!(matches!(err, DownloadError::StorageOpen { .. }));
        assert_eq!(*performs.borrow(), 0);
        assert!(orchestrator.sleeper().sleeps.is_empty());
        assert_eq!(storage.0.borrow().opens, 1);
    }

    #[test]
    fn test_client_init_failure_is_fatal() {
        let storage = MemoryStorage::default();
        let transport = ScriptedTransport {
            fail_init: true,
            ..ScriptedTransport::default()
        };
        let mut orchestrator = orchestrator(transport, &storage, DownloadConfig::default());

        let err = orchestrator.download(URL, dest()).unwrap_err();

        assert!(matches!(err, DownloadError::ClientInit { .. }));
        assert_eq!(orchestrator.transport().inits, 1);
        assert_eq!(storage.0.borrow().opens, 0);
        assert!(orchestrator.sleeper().sleeps.is_empty());
    }

    #[test]
    fn test_out_of_space_aborts_without_retry() {
        let storage = MemoryStorage::default();
        storage.0.borrow_mut().space = Some(SpaceInfo {
            total: 1000,
            used: 0,
        });
        let transport = ScriptedTransport::new(vec![
            Script::ok(&[2000]),
            Script::ok(&[10]),
            Script::ok(&[10]),
        ]);
        let performs = Rc::clone(&transport.performs);
        let mut orchestrator = orchestrator(
            transport,
            &storage,
            DownloadConfig::default().with_max_retries(3),
        );

        let err = orchestrator.download(URL, dest()).unwrap_err();

        match err {
            DownloadError::StorageWrite {
                attempt,
                source:
                    StorageError::OutOfSpace {
                        requested,
                        available,
                    },
                ..
            } => {
                assert_eq!(attempt, 1);
                assert_eq!(requested, 2000);
                assert_eq!(available, 1000);
            }
            other => panic!("expected out-of-space storage error, got {other:?}"),
        }
        assert_eq!(*performs.borrow(), 1);
        assert!(orchestrator.sleeper().sleeps.is_empty());
        assert!(storage.0.borrow().writes.is_empty());
        assert_eq!(storage.0.borrow().closes, 1);
    }

    #[test]
    fn test_out_of_space_discards_staged_bytes() {
        let storage = MemoryStorage::default();
        storage.0.borrow_mut().space = Some(SpaceInfo {
            total: 1000,
            used: 0,
        });
        let transport = ScriptedTransport::new(vec![Script::ok(&[500, 2000])]);
        let performs = Rc::clone(&transport.performs);
        let mut orchestrator = orchestrator(
            transport,
            &storage,
            DownloadConfig::default().with_max_retries(3),
        );

        let err = orchestrator.download(URL, dest()).unwrap_err();

        assert!(matches!(
            err,
            DownloadError::StorageWrite {
                attempt: 1,
                source: StorageError::OutOfSpace {
                    requested: 2000,
                    available: 1000
                },
                ..
            }
        ));
        assert_eq!(*performs.borrow(), 1);
        assert!(orchestrator.sleeper().sleeps.is_empty());
        assert!(storage.0.borrow().writes.is_empty());
        assert!(storage.0.borrow().contents.is_empty());
        assert_eq!(storage.0.borrow().closes, 1);
    }

    #[test]
    fn test_storage_error_wins_over_transport_failure() {
        let storage = MemoryStorage::default();
        storage.0.borrow_mut().space = Some(SpaceInfo {
            total: 1000,
            used: 900,
        });
        let transport = ScriptedTransport::new(vec![Script::failing(&[500]), Script::ok(&[10])]);
        let performs = Rc::clone(&transport.performs);
        let mut orchestrator = orchestrator(transport, &storage, DownloadConfig::default());

        let err = orchestrator.download(URL, dest()).unwrap_err();

        assert!(matches!(err, DownloadError::StorageWrite { .. }));
        assert_eq!(*performs.borrow(), 1);
        assert!(orchestrator.sleeper().sleeps.is_empty());
    }

    #[test]
    fn test_close_failure_is_storage_error() {
        let storage = MemoryStorage::default();
        storage.0.borrow_mut().fail_close = true;
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![Script::ok(&[10]), Script::ok(&[10])]),
            &storage,
            DownloadConfig::default(),
        );

        let err = orchestrator.download(URL, dest()).unwrap_err();

        assert!(matches!(
            err,
            DownloadError::StorageWrite {
                source: StorageError::Io { .. },
                ..
            }
        ));
        assert_eq!(orchestrator.transport().inits, 1);
    }

    #[test]
    fn test_close_failure_after_transport_failure_still_retries() {
        let storage = MemoryStorage::default();
        storage.0.borrow_mut().fail_close = true;
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![Script::failing(&[10]), Script::ok(&[10])]),
            &storage,
            DownloadConfig::default(),
        );

        let err = orchestrator.download(URL, dest()).unwrap_err();

        assert!(matches!(err, DownloadError::StorageWrite { attempt: 2, .. }));
        assert_eq!(orchestrator.sleeper().sleeps, vec![Duration::from_millis(1000)]);
    }

    // ==================== Retry Exhaustion ====================

    #[test]
    fn test_exhaustion_after_max_retries() {
        let storage = MemoryStorage::default();
        let transport = ScriptedTransport::new(vec![
            Script::failing(&[]),
            Script::failing(&[]),
            Script::failing(&[]),
            Script::ok(&[10]),
        ]);
        let performs = Rc::clone(&transport.performs);
        let mut orchestrator = orchestrator(transport, &storage, DownloadConfig::default());

        let err = orchestrator.download(URL, dest()).unwrap_err();

        match err {
            DownloadError::Transport {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(source, TransportFailure::Timeout);
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(*performs.borrow(), 3);
        // No sleep after the final attempt.
        assert_eq!(
            orchestrator.sleeper().sleeps,
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[test]
    fn test_backoff_schedule_with_custom_base() {
        let storage = MemoryStorage::default();
        let scripts = (0..5).map(|_| Script::failing(&[])).collect();
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(scripts),
            &storage,
            DownloadConfig::default()
                .with_max_retries(5)
                .with_backoff_base(Duration::from_millis(250)),
        );

        assert!(orchestrator.download(URL, dest()).is_err());

        let expected: Vec<Duration> = [250, 500, 1000, 2000]
            .iter()
            .map(|&ms| Duration::from_millis(ms))
            .collect();
        assert_eq!(orchestrator.sleeper().sleeps, expected);
    }

    #[test]
    fn test_single_attempt_budget_never_sleeps() {
        let storage = MemoryStorage::default();
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![Script::failing(&[])]),
            &storage,
            DownloadConfig::default().with_max_retries(1),
        );

        let err = orchestrator.download(URL, dest()).unwrap_err();

        assert!(matches!(err, DownloadError::Transport { attempts: 1, .. }));
        assert!(orchestrator.sleeper().sleeps.is_empty());
    }

    // ==================== Attempt Isolation ====================

    #[test]
    fn test_partial_buffer_flushed_on_failure_and_not_carried_over() {
        let storage = MemoryStorage::default();
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![Script::failing(&[600]), Script::ok(&[300])]),
            &storage,
            DownloadConfig::default().with_buffer_capacity(1024),
        );

        let report = orchestrator.download(URL, dest()).unwrap();

        assert_eq!(report.bytes_written, 300);
        assert_eq!(orchestrator.buffered_bytes(), 0);
        let state = storage.0.borrow();
        // Attempt 1 flushed its 600-byte tail before closing; attempt 2 wrote 300.
        assert_eq!(state.writes, vec![600, 300]);
        assert_eq!(state.contents.len(), 300);
    }

    #[test]
    fn test_buffer_empty_after_failed_attempts() {
        let storage = MemoryStorage::default();
        let mut orchestrator = orchestrator(
            ScriptedTransport::new(vec![Script::failing(&[1500]), Script::failing(&[10])]),
            &storage,
            DownloadConfig::default()
                .with_max_retries(2)
                .with_buffer_capacity(1024),
        );

        assert!(orchestrator.download(URL, dest()).is_err());
        assert_eq!(orchestrator.buffered_bytes(), 0);
    }
}
