//! Shared helpers for socket-bound integration tests.
//!
//! The download core is blocking and builds its own runtime per attempt, so
//! mock servers run on a separate multi-thread runtime owned by [`MockHost`]
//! while the test body stays on the plain test thread.

#![allow(dead_code)]

use std::net::TcpListener;
use std::panic::Location;

use tokio::runtime::{Builder, Runtime};
use wiremock::{Mock, MockServer};

#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var("FLASHFETCH_REQUIRE_SOCKET_TESTS")
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "[socket-bound-test] cannot bind localhost socket at {}:{}; wiremock-based test cannot run in this environment",
        location.file(),
        location.line()
    );
    if socket_tests_required() {
        panic!("{message}. Set FLASHFETCH_REQUIRE_SOCKET_TESTS=0 to allow local skip behavior.");
    }

    eprintln!(
        "{message}. Skipping test. Set FLASHFETCH_REQUIRE_SOCKET_TESTS=1 to fail-fast instead."
    );
    true
}

/// A wiremock server together with the runtime serving it.
pub struct MockHost {
    // Dropped before the runtime.
    pub server: MockServer,
    pub runtime: Runtime,
}

impl MockHost {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn request_count(&self) -> usize {
        self.runtime
            .block_on(self.server.received_requests())
            .map_or(0, |requests| requests.len())
    }
}

#[track_caller]
pub fn start_mock_host_or_skip() -> Option<MockHost> {
    if should_skip_socket_bound_test() {
        return None;
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build mock server runtime");
    let server = runtime.block_on(MockServer::start());
    Some(MockHost { server, runtime })
}

/// Returns a localhost URL nothing is listening on.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind scratch socket");
    let port = listener.local_addr().expect("scratch socket address").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/sample.txt")
}

/// Deterministic body of `len` bytes.
pub fn patterned_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
