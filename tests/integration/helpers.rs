//! Test helpers and utilities

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use tokio_sentry::core::{self, Finalize, Request, ResponseHead};
use tokio_sentry::telemetry::{Event, EventId, Scope, TelemetryClient, TelemetryError, Transaction};
use tokio_sentry::{Handler, Server, ServerConfig};

/// Observable side effect, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Capture,
    Flush,
    SetHttpStatus(u16),
    Finish(String),
    End { status: u16, body: String },
}

/// Shared, ordered record of calls.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Call>>>);

#[allow(dead_code)]
impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn count_finish(&self) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Finish(_)))
            .count()
    }
}

/// How [`RecordingClient::flush`] behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushBehavior {
    Succeed,
    Fail,
    Hang,
    /// Succeeds after the delay; the call is recorded once it completes.
    Slow(Duration),
}

/// Telemetry client that records every call.
pub struct RecordingClient {
    log: Log,
    events: Mutex<Vec<Event>>,
    flush: FlushBehavior,
    has_scope: bool,
}

#[allow(dead_code)]
impl RecordingClient {
    pub fn new(log: &Log) -> Arc<Self> {
        Self::build(log, FlushBehavior::Succeed, true)
    }

    pub fn with_flush(log: &Log, flush: FlushBehavior) -> Arc<Self> {
        Self::build(log, flush, true)
    }

    pub fn without_scope(log: &Log) -> Arc<Self> {
        Self::build(log, FlushBehavior::Succeed, false)
    }

    fn build(log: &Log, flush: FlushBehavior, has_scope: bool) -> Arc<Self> {
        Arc::new(Self {
            log: log.clone(),
            events: Mutex::new(Vec::new()),
            flush,
            has_scope,
        })
    }

    /// Events accepted so far, after scope processing.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetryClient for RecordingClient {
    fn current_scope(&self) -> Option<Scope> {
        self.has_scope.then(Scope::new)
    }

    fn capture_event(&self, event: Event, scope: &Scope) -> Option<EventId> {
        self.log.push(Call::Capture);
        let event = scope.apply_to_event(event)?;
        let id = event.event_id;
        self.events.lock().unwrap().push(event);
        Some(id)
    }

    async fn flush(&self, _timeout: Duration) -> Result<bool, TelemetryError> {
        if let FlushBehavior::Slow(delay) = self.flush {
            tokio::time::sleep(delay).await;
        }
        self.log.push(Call::Flush);
        match self.flush {
            FlushBehavior::Succeed | FlushBehavior::Slow(_) => Ok(true),
            FlushBehavior::Fail => Err(TelemetryError::Transport(
                "connect ECONNREFUSED 127.0.0.1:443".into(),
            )),
            FlushBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(true)
            }
        }
    }
}

/// Transaction that records status updates and finish.
pub struct FakeTransaction {
    name: String,
    log: Log,
}

impl FakeTransaction {
    pub fn new(name: impl Into<String>, log: &Log) -> Box<Self> {
        Box::new(Self {
            name: name.into(),
            log: log.clone(),
        })
    }
}

impl Transaction for FakeTransaction {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_http_status(&mut self, status: StatusCode) {
        self.log.push(Call::SetHttpStatus(status.as_u16()));
    }

    fn finish(self: Box<Self>) {
        self.log.push(Call::Finish(self.name.clone()));
    }
}

/// Host finalize operation that records the response it was given.
pub struct RecordingFinalize(pub Log);

#[async_trait]
impl Finalize for RecordingFinalize {
    async fn finalize(&self, head: ResponseHead, body: Bytes) -> core::Result<()> {
        self.0.push(Call::End {
            status: head.status().as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        Ok(())
    }
}

/// Build a bodyless request.
#[allow(dead_code)]
pub fn request(method: &str, path: &str) -> Request {
    Request::from(
        http::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "api.example.com")
            .body(Bytes::new())
            .unwrap(),
    )
}

/// Error whose identity can be checked after it crosses the wrapper.
#[derive(Debug, Clone)]
pub struct Boom(pub Arc<str>);

impl Boom {
    pub fn new(msg: &str) -> Self {
        Self(Arc::from(msg))
    }

    pub fn is_same(&self, other: &Boom) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Display for Boom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Boom {}

/// Running test server bound to an ephemeral port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

#[allow(dead_code)]
impl TestServer {
    /// Serve `server` on 127.0.0.1 with a random port.
    pub async fn start<H: Handler>(server: Server<H>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve_until(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            addr,
            client,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn config() -> ServerConfig {
        ServerConfig {
            drain_timeout: Duration::from_millis(200),
            ..ServerConfig::with_addr("127.0.0.1:0".parse().unwrap())
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle
            .await
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Poll `check` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}

/// Assert that response has expected status
#[allow(dead_code)]
pub fn assert_status(response: &reqwest::Response, expected: reqwest::StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}
