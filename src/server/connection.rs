//! Per-connection HTTP handling.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::body::Incoming as IncomingBody;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use super::finalizer::{plain_response, ChannelFinalizer, HttpResponse};
use super::TransactionFactory;
use crate::core::{Request, ResponseWriter};
use crate::wrapper::Handler;

/// Check if an error is a common connection reset or timeout.
#[inline]
fn is_connection_error(err_str: &str) -> bool {
    err_str.contains("connection reset")
        || err_str.contains("broken pipe")
        || err_str.contains("Connection reset")
        || err_str.contains("os error 104")
        || err_str.contains("os error 32")
        || err_str.contains("timed out")
        || err_str.contains("HeaderTimeout")
}

/// Connection handler context, shared by every connection of a server.
pub(crate) struct ConnectionContext<H> {
    pub handler: Arc<H>,
    pub transactions: Option<TransactionFactory>,
    pub active_connections: Arc<AtomicUsize>,
    /// Handler tasks, which may outlive their connection.
    pub handler_tasks: TaskTracker,
    /// Header read timeout (HEADER_TIMEOUT_SECS, default: 5s).
    pub header_timeout: Duration,
}

impl<H: Handler> ConnectionContext<H> {
    /// Serve one TCP connection until the peer closes it.
    pub async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote_addr: SocketAddr) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);

        let ctx = Arc::clone(&self);
        let service = service_fn(move |req| {
            let ctx = Arc::clone(&ctx);
            async move { ctx.handle_request(req, remote_addr).await }
        });

        let io = TokioIo::new(stream);
        if let Err(err) = auto::Builder::new(TokioExecutor::new())
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(Some(self.header_timeout))
            .keep_alive(true)
            .serve_connection(io, service)
            .await
        {
            let err_str = format!("{:?}", err);
            if is_connection_error(&err_str) {
                debug!("Connection closed: {:?}", err);
            } else {
                warn!(remote = %remote_addr, "Connection error: {:?}", err);
            }
        }

        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    async fn handle_request(
        &self,
        req: hyper::Request<IncomingBody>,
        remote_addr: SocketAddr,
    ) -> Result<HttpResponse, Infallible> {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(error = %e, "failed to read request body");
                return Ok(plain_response(StatusCode::BAD_REQUEST));
            }
        };

        let request =
            Request::from(http::Request::from_parts(parts, body)).with_remote_addr(remote_addr);
        let method = request.method().clone();
        let path = request.path().to_string();

        let (tx, rx) = oneshot::channel();
        let mut writer = ResponseWriter::new(ChannelFinalizer::new(tx));
        if let Some(ref start) = self.transactions {
            writer.attach_transaction(start(&request));
        }

        // The handler keeps running after `end` (flush); the response goes out as soon as it is sent.
        let handler = Arc::clone(&self.handler);
        let task_path = path.clone();
        let task_method = method.clone();
        let task = self.handler_tasks.spawn(async move {
            if let Err(e) = handler.call(request, writer).await {
                error!(method = %task_method, path = %task_path, error = %e, "handler failed");
            }
        });

        match rx.await {
            Ok(response) => Ok(response),
            Err(_) => {
                // Writer dropped without `end`: let capture and flush finish before answering.
                if let Err(e) = task.await {
                    error!(method = %method, path = %path, error = %e, "handler task aborted");
                } else {
                    warn!(method = %method, path = %path, "handler finished without sending a response");
                }
                Ok(plain_response(StatusCode::INTERNAL_SERVER_ERROR))
            }
        }
    }
}
