//! Shared test utilities and fixtures
//!
//! The demo drives its own current-thread runtime, so tests are plain `#[test]`
//! functions. Anything async on the test side (the mock HTTP server) gets a
//! separate multi-thread runtime from [`MockHttp`].

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use phaseloop_core::{Clock, DemoOptions, SharedBuffer, Stamper, demo};
use phaseloop_engine::LoopError;
use phaseloop_types::TraceLine;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An address nothing is listening on.
pub fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn demo_options(source_path: &Path) -> DemoOptions {
    DemoOptions {
        fetch: None,
        refused_addr: closed_port(),
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        source_path: source_path.to_path_buf(),
    }
}

/// Run the demo to completion and parse everything it printed.
pub fn run_demo(options: DemoOptions) -> (Result<(), LoopError>, Vec<TraceLine>) {
    let buffer = SharedBuffer::new();
    let stamper = Rc::new(Stamper::new(Clock::start(), buffer.clone()));
    let result = demo::run(options, &stamper);
    (result, parse_trace(&buffer.contents()))
}

pub fn parse_trace(output: &str) -> Vec<TraceLine> {
    output
        .lines()
        .map(|line| TraceLine::parse(line).unwrap_or_else(|err| panic!("{line:?}: {err}")))
        .collect()
}

/// Index of the first line whose message starts with `prefix`.
pub fn position(lines: &[TraceLine], prefix: &str) -> usize {
    lines
        .iter()
        .position(|line| line.message.starts_with(prefix))
        .unwrap_or_else(|| panic!("no line starting with {prefix:?} in {lines:#?}"))
}

pub fn count(lines: &[TraceLine], prefix: &str) -> usize {
    lines
        .iter()
        .filter(|line| line.message.starts_with(prefix))
        .count()
}

/// A wiremock server kept alive on its own runtime.
pub struct MockHttp {
    pub server: MockServer,
    runtime: Runtime,
}

impl MockHttp {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    /// Answer `GET /csrf` with `body` after `delay`.
    pub fn mount_csrf(&self, body: &str, delay: Duration) {
        self.runtime.block_on(
            Mock::given(method("GET"))
                .and(path("/csrf"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(body)
                        .set_delay(delay),
                )
                .mount(&self.server),
        );
    }

    pub fn csrf_url(&self) -> url::Url {
        url::Url::parse(&format!("{}/csrf", self.server.uri())).unwrap()
    }

    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
