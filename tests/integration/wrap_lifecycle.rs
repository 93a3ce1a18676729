//! Wrapper lifecycle: transparency, re-throw, transaction finishing and flush isolation.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use http::StatusCode;

use crate::helpers::*;
use tokio_sentry::core::{self, ResponseWriter};
use tokio_sentry::telemetry::Level;
use tokio_sentry::{wrap, Handler, Request, Telemetry};

fn writer(log: &Log) -> ResponseWriter {
    ResponseWriter::new(RecordingFinalize(log.clone()))
}

/// Successful handler: value passes through, nothing captured, one flush.
#[tokio::test]
async fn test_success_passes_through() {
    let log = Log::new();
    let client = RecordingClient::new(&log);
    let wrapped = wrap(
        &Telemetry::new(client.clone()),
        |_req: Request, _res: ResponseWriter| async { Ok::<_, core::Error>("ok") },
    );

    let value = wrapped.call(request("GET", "/"), writer(&log)).await;

    assert_eq!(value.unwrap(), "ok");
    assert_eq!(log.calls(), vec![Call::Flush]);
    assert!(client.events().is_empty());
}

/// Failing handler: the very same error comes back after capture and flush.
#[tokio::test]
async fn test_error_is_rethrown_unchanged() {
    let log = Log::new();
    let client = RecordingClient::new(&log);
    let boom = Boom::new("boom");
    let thrown = boom.clone();
    let wrapped = Telemetry::new(client.clone()).wrap(move |_req: Request, _res: ResponseWriter| {
        let err = thrown.clone();
        async move { Err::<(), _>(err) }
    });

    let err = wrapped
        .call(request("POST", "/checkout?step=2"), writer(&log))
        .await
        .unwrap_err();

    assert!(err.is_same(&boom));
    assert_eq!(log.calls(), vec![Call::Capture, Call::Flush]);

    let events = client.events();
    assert_eq!(events.len(), 1);
    let exception = events[0].primary_exception().unwrap();
    assert_eq!(exception.value, "boom");
    let mechanism = exception.mechanism.as_ref().unwrap();
    assert_eq!(mechanism.handled, Some(false));
    assert_eq!(mechanism.ty.as_deref(), Some("generic"));

    let request = events[0].request.as_ref().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.url, "http://api.example.com/checkout?step=2");
    assert_eq!(request.query_string.as_deref(), Some("step=2"));
    assert_eq!(events[0].transaction.as_deref(), Some("POST /checkout"));
}

/// Transaction gets the status, finishes, flushes, and only then is the response sent.
#[tokio::test]
async fn test_end_finishes_transaction_before_sending() {
    let log = Log::new();
    let client = RecordingClient::new(&log);
    let txn_log = log.clone();
    let wrapped = Telemetry::new(client).wrap(move |_req: Request, mut res: ResponseWriter| {
        let log = txn_log.clone();
        async move {
            res.attach_transaction(FakeTransaction::new("GET /gone", &log));
            res.set_status(StatusCode::NOT_FOUND);
            res.end("").await
        }
    });

    wrapped.call(request("GET", "/gone"), writer(&log)).await.unwrap();

    assert_eq!(
        log.calls(),
        vec![
            Call::SetHttpStatus(404),
            Call::Finish("GET /gone".into()),
            Call::Flush,
            Call::End {
                status: 404,
                body: String::new()
            },
            Call::Flush,
        ]
    );
}

/// The status recorded is the one in effect when `end` runs.
#[tokio::test]
async fn test_status_read_at_finalize_time() {
    let log = Log::new();
    let txn_log = log.clone();
    let wrapped = Telemetry::new(RecordingClient::new(&log)).wrap(
        move |_req: Request, mut res: ResponseWriter| {
            let log = txn_log.clone();
            async move {
                res.attach_transaction(FakeTransaction::new("txn", &log));
                res.set_status(StatusCode::CREATED);
                res.set_status(StatusCode::ACCEPTED);
                res.end("queued").await
            }
        },
    );

    wrapped.call(request("POST", "/jobs"), writer(&log)).await.unwrap();

    assert_eq!(log.count(&Call::SetHttpStatus(202)), 1);
    assert_eq!(log.count(&Call::SetHttpStatus(201)), 0);
    assert_eq!(log.count_finish(), 1);
}

/// Without `end`, an attached transaction is never finished.
#[tokio::test]
async fn test_no_finish_without_end() {
    let log = Log::new();
    let txn_log = log.clone();
    let wrapped = Telemetry::new(RecordingClient::new(&log)).wrap(
        move |_req: Request, mut res: ResponseWriter| {
            let log = txn_log.clone();
            async move {
                res.attach_transaction(FakeTransaction::new("abandoned", &log));
                Err::<(), _>(Boom::new("gave up"))
            }
        },
    );

    let _ = wrapped.call(request("GET", "/"), writer(&log)).await;

    assert_eq!(log.count_finish(), 0);
    assert_eq!(log.calls(), vec![Call::Capture, Call::Flush]);
}

/// A rejecting flush inside the interceptor does not stop the response.
#[tokio::test]
async fn test_flush_failure_does_not_block_end() {
    let log = Log::new();
    let client = RecordingClient::with_flush(&log, FlushBehavior::Fail);
    let txn_log = log.clone();
    let wrapped = Telemetry::new(client).wrap(move |_req: Request, mut res: ResponseWriter| {
        let log = txn_log.clone();
        async move {
            res.attach_transaction(FakeTransaction::new("GET /", &log));
            res.end("body").await?;
            Ok::<_, core::Error>(())
        }
    });

    let result = wrapped.call(request("GET", "/"), writer(&log)).await;

    assert!(result.is_ok());
    assert_eq!(
        log.count(&Call::End {
            status: 200,
            body: "body".into()
        }),
        1
    );
    assert_eq!(log.count(&Call::Flush), 2);
}

/// A flush that never resolves is abandoned after its budget.
#[tokio::test(start_paused = true)]
async fn test_hanging_flush_is_bounded() {
    let log = Log::new();
    let client = RecordingClient::with_flush(&log, FlushBehavior::Hang);
    let telemetry = Telemetry::new(client).with_flush_timeout(Duration::from_millis(500));
    let wrapped = telemetry.wrap(|_req: Request, res: ResponseWriter| async move {
        res.end("late").await
    });

    let result = wrapped.call(request("GET", "/"), writer(&log)).await;

    assert!(result.is_ok());
    assert_eq!(
        log.count(&Call::End {
            status: 200,
            body: "late".into()
        }),
        1
    );
}

/// Each invocation gets its own interceptor; nothing leaks between calls.
#[tokio::test]
async fn test_invocations_are_independent() {
    let log = Log::new();
    let txn_log = log.clone();
    let wrapped = Telemetry::new(RecordingClient::new(&log)).wrap(
        move |req: Request, mut res: ResponseWriter| {
            let log = txn_log.clone();
            async move {
                if req.path() == "/first" {
                    res.attach_transaction(FakeTransaction::new("first", &log));
                }
                res.end(req.path().to_string()).await
            }
        },
    );

    wrapped.call(request("GET", "/first"), writer(&log)).await.unwrap();
    wrapped.call(request("GET", "/second"), writer(&log)).await.unwrap();

    assert_eq!(log.count_finish(), 1);
    assert_eq!(log.count(&Call::Flush), 4);
    assert_eq!(
        log.calls()[5..],
        [
            Call::Flush,
            Call::End {
                status: 200,
                body: "/second".into()
            },
            Call::Flush,
        ]
    );
}

/// Concurrent failures each carry their own request data.
#[tokio::test]
async fn test_concurrent_captures_are_isolated() {
    let log = Log::new();
    let client = RecordingClient::new(&log);
    let wrapped = Telemetry::new(client.clone()).wrap(|req: Request, _res: ResponseWriter| async move {
        tokio::task::yield_now().await;
        Err::<(), _>(Boom::new(&format!("failed {}", req.path())))
    });

    let (a, b) = tokio::join!(
        wrapped.call(request("GET", "/a"), writer(&log)),
        wrapped.call(request("DELETE", "/b"), writer(&log)),
    );
    assert!(a.is_err() && b.is_err());

    let mut names: Vec<_> = client
        .events()
        .into_iter()
        .map(|e| (e.transaction.unwrap(), e.exception[0].value.clone()))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            ("DELETE /b".to_string(), "failed /b".to_string()),
            ("GET /a".to_string(), "failed /a".to_string()),
        ]
    );
}

/// Panics are reported as fatal unhandled exceptions and then resumed.
#[tokio::test]
async fn test_panic_is_captured_then_resumed() {
    let log = Log::new();
    let client = RecordingClient::new(&log);
    let wrapped = Telemetry::new(client.clone()).wrap(|req: Request, _res: ResponseWriter| async move {
        if req.path() == "/explode" {
            panic!("index out of range");
        }
        Ok::<_, core::Error>(())
    });

    let outcome = AssertUnwindSafe(wrapped.call(request("GET", "/explode"), writer(&log)))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert_eq!(log.calls(), vec![Call::Capture, Call::Flush]);
    let events = client.events();
    assert_eq!(events[0].level, Level::Fatal);
    assert_eq!(
        events[0].primary_exception().unwrap().mechanism.as_ref().unwrap().handled,
        Some(false)
    );
}

/// No bound scope: capture is skipped, the error still propagates and flush still runs.
#[tokio::test]
async fn test_missing_scope_skips_capture() {
    let log = Log::new();
    let client = RecordingClient::without_scope(&log);
    let wrapped = Telemetry::new(client.clone()).wrap(|_req: Request, _res: ResponseWriter| async {
        Err::<(), _>(Boom::new("unseen"))
    });

    let err = wrapped.call(request("GET", "/"), writer(&log)).await.unwrap_err();

    assert_eq!(err.to_string(), "unseen");
    assert_eq!(log.calls(), vec![Call::Flush]);
    assert!(client.events().is_empty());
}
