//! End-to-end HTTP tests: wrapped handler behind the hyper host adapter.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::helpers::*;
use tokio_sentry::core::{self, ResponseWriter};
use tokio_sentry::observability::Metrics;
use tokio_sentry::{Request, Server, ServerConfig, Telemetry};

async fn routes(req: Request, mut res: ResponseWriter) -> Result<(), core::Error> {
    match req.path() {
        "/" => {
            res.set_header("content-type", "text/plain");
            res.end("ok").await
        }
        "/fail" => Err(core::Error::Custom("database unavailable".into())),
        "/silent" => Ok(()),
        "/late-fail" => {
            res.end("accepted").await?;
            Err(core::Error::Custom("post-response failure".into()))
        }
        _ => {
            res.set_status(StatusCode::NOT_FOUND);
            res.end("not found").await
        }
    }
}

fn start_server(log: &Log, client: Arc<RecordingClient>) -> (Server<impl tokio_sentry::Handler>, Arc<Metrics>) {
    start_server_with(TestServer::config(), log, client)
}

fn start_server_with(
    config: ServerConfig,
    log: &Log,
    client: Arc<RecordingClient>,
) -> (Server<impl tokio_sentry::Handler>, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new().unwrap());
    let telemetry = Telemetry::new(client).with_metrics(Arc::clone(&metrics));
    let txn_log = log.clone();
    let server = Server::new(config, telemetry.wrap(routes)).with_transactions(
        move |req| FakeTransaction::new(format!("{} {}", req.method(), req.path()), &txn_log),
    );
    (server, metrics)
}

/// GET / returns the handler's body and finishes the transaction
#[tokio::test]
async fn test_get_ok() {
    let log = Log::new();
    let (server, metrics) = start_server(&log, RecordingClient::new(&log));
    let server = TestServer::start(server).await;

    let resp = server.get("/").await;
    assert_status(&resp, StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/plain");
    assert_eq!(resp.text().await.unwrap(), "ok");

    assert!(eventually(Duration::from_secs(2), || async { log.count(&Call::Flush) == 2 }).await);
    assert_eq!(log.count(&Call::SetHttpStatus(200)), 1);
    assert_eq!(log.count(&Call::Finish("GET /".into())), 1);
    assert_eq!(metrics.transactions_finished_total.get() as u64, 1);

    server.stop().await;
}

/// Handler-set status reaches both the client and the transaction
#[tokio::test]
async fn test_not_found() {
    let log = Log::new();
    let (server, _) = start_server(&log, RecordingClient::new(&log));
    let server = TestServer::start(server).await;

    let resp = server.get("/missing").await;
    assert_status(&resp, StatusCode::NOT_FOUND);
    assert_eq!(resp.text().await.unwrap(), "not found");
    assert_eq!(log.count(&Call::SetHttpStatus(404)), 1);

    server.stop().await;
}

/// A failing handler is captured and the client gets a 500
#[tokio::test]
async fn test_handler_error_is_reported() {
    let log = Log::new();
    let client = RecordingClient::new(&log);
    let (server, metrics) = start_server(&log, client.clone());
    let server = TestServer::start(server).await;

    let resp = server.get("/fail?retry=1").await;
    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);

    assert!(eventually(Duration::from_secs(2), || async { log.count(&Call::Flush) == 1 }).await);
    let events = client.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].primary_exception().unwrap().value, "database unavailable");
    assert_eq!(events[0].transaction.as_deref(), Some("GET /fail"));

    let request = events[0].request.as_ref().unwrap();
    assert_eq!(request.query_string.as_deref(), Some("retry=1"));
    // Client address is PII
    assert!(request.client_ip.is_none());

    // The transaction was never finished: the response was never ended.
    assert_eq!(log.count_finish(), 0);
    assert_eq!(metrics.exceptions_captured_total.get() as u64, 1);

    server.stop().await;
}

/// Returning without ending the response yields a 500, not a hang
#[tokio::test]
async fn test_silent_handler_gets_500() {
    let log = Log::new();
    let (server, _) = start_server(&log, RecordingClient::new(&log));
    let server = TestServer::start(server).await;

    let resp = server.get("/silent").await;
    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(log.count(&Call::Capture), 0);

    server.stop().await;
}

/// Flush failures never reach the HTTP client
#[tokio::test]
async fn test_failing_flush_still_responds() {
    let log = Log::new();
    let (server, metrics) = start_server(&log, RecordingClient::with_flush(&log, FlushBehavior::Fail));
    let server = TestServer::start(server).await;

    let resp = server.get("/").await;
    assert_status(&resp, StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    assert!(eventually(Duration::from_secs(2), || async { log.count(&Call::Flush) == 2 }).await);
    assert!(
        eventually(Duration::from_secs(2), || async {
            metrics.flush_count("handler", "failed") == 1
        })
        .await
    );
    assert_eq!(metrics.flush_count("finalize", "failed"), 1);

    server.stop().await;
}

/// The 500 for a failed handler is sent only after the failure was captured and flushed
#[tokio::test]
async fn test_error_flushed_before_response() {
    let log = Log::new();
    let client = RecordingClient::with_flush(&log, FlushBehavior::Slow(Duration::from_millis(300)));
    let (server, _) = start_server(&log, client.clone());
    let server = TestServer::start(server).await;

    let resp = server.get("/fail").await;
    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);

    // No polling: both must already have happened when the client sees the 500.
    assert_eq!(client.events().len(), 1);
    assert_eq!(log.count(&Call::Flush), 1);
    assert_eq!(log.calls(), vec![Call::Capture, Call::Flush]);

    server.stop().await;
}

/// Graceful shutdown waits for handler work that continues after the response
#[tokio::test]
async fn test_shutdown_waits_for_post_response_flush() {
    let log = Log::new();
    let client = RecordingClient::with_flush(&log, FlushBehavior::Slow(Duration::from_millis(200)));
    let config = ServerConfig {
        drain_timeout: Duration::from_secs(5),
        ..TestServer::config()
    };
    let (server, _) = start_server_with(config, &log, client.clone());
    let server = TestServer::start(server).await;

    // No idle pooling, so the connection closes as soon as the response is read.
    let http = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    let resp = http.get(server.url("/late-fail")).send().await.unwrap();
    assert_status(&resp, StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "accepted");
    drop(http);

    // Only the finalize-site flush has run so far.
    assert_eq!(log.count(&Call::Flush), 1);

    server.stop().await;

    assert_eq!(client.events().len(), 1);
    assert_eq!(log.count(&Call::Flush), 2);
}
