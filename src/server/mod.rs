//! HTTP host adapter for wrapped handlers.
//!
//! Accepts TCP connections, serves them with hyper (HTTP/1.1 and HTTP/2 via
//! `hyper_util::server::conn::auto`) and runs the handler for each request in
//! its own task. The hyper service waits only until the handler calls
//! [`ResponseWriter::end`](crate::core::ResponseWriter::end); work the handler
//! does afterwards (such as the post-handler telemetry flush) no longer
//! delays the client.
//!
//! # Graceful Shutdown
//!
//! ```rust,ignore
//! let server = Server::new(config.server, telemetry.wrap(handler));
//! server.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```
//!
//! After the shutdown future resolves the accept loop stops. In-flight
//! connections and handler tasks (including their post-response flush) get up
//! to `drain_timeout` to finish.

mod connection;
mod finalizer;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub use finalizer::{into_response, plain_response, ChannelFinalizer, HttpResponse};

pub use crate::config::ServerConfig;
use crate::core::Request;
use crate::telemetry::Transaction;
use crate::wrapper::Handler;

use connection::ConnectionContext;

/// Starts a transaction for an incoming request.
pub type TransactionFactory = Arc<dyn Fn(&Request) -> Box<dyn Transaction> + Send + Sync>;

/// HTTP server running one handler.
pub struct Server<H> {
    config: ServerConfig,
    handler: Arc<H>,
    transactions: Option<TransactionFactory>,
    active_connections: Arc<AtomicUsize>,
    handler_tasks: TaskTracker,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl<H: Handler> Server<H> {
    /// Create a new server with the given configuration and handler.
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            handler: Arc::new(handler),
            transactions: None,
            active_connections: Arc::new(AtomicUsize::new(0)),
            handler_tasks: TaskTracker::new(),
            shutdown_tx,
            shutdown_rx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach a transaction started by `factory` to every response.
    pub fn with_transactions<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Request) -> Box<dyn Transaction> + Send + Sync + 'static,
    {
        self.transactions = Some(Arc::new(factory));
        self
    }

    /// Bind the configured address and serve until [`trigger_shutdown`](Self::trigger_shutdown).
    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Bind the configured address and serve until `shutdown` resolves, then drain.
    pub async fn run_until<F>(&self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` resolves, then drain.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let serve = self.serve(listener);
        tokio::pin!(serve);
        tokio::pin!(shutdown);

        tokio::select! {
            result = &mut serve => return result,
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping accept loop");
                self.trigger_shutdown();
            }
        }

        serve.await?;

        if self.wait_for_drain(self.config.drain_timeout).await {
            info!("All connections drained");
        }
        Ok(())
    }

    /// Accept connections on `listener` until shutdown is triggered.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Listening on http://{}", local_addr);

        let ctx = Arc::new(ConnectionContext {
            handler: Arc::clone(&self.handler),
            transactions: self.transactions.clone(),
            active_connections: Arc::clone(&self.active_connections),
            handler_tasks: self.handler_tasks.clone(),
            header_timeout: self.config.header_timeout,
        });

        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept error: {}", e);
                            continue;
                        }
                    };

                    let _ = stream.set_nodelay(true);

                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        ctx.handle_connection(stream, remote_addr).await;
                    });
                }
                _ = shutdown_rx.changed() => {
                    debug!("Accept loop received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Trigger graceful shutdown.
    /// Signals the accept loop to stop accepting new connections.
    pub fn trigger_shutdown(&self) {
        if self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Number of handler tasks still running, including those whose response was already sent.
    pub fn pending_handlers(&self) -> usize {
        self.handler_tasks.len()
    }

    /// Configured listen address.
    pub fn listen_addr(&self) -> SocketAddr {
        self.config.listen_addr
    }

    /// Wait for all active connections and handler tasks to drain.
    /// Returns true if drained successfully, false if timeout was reached.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        let check_interval = Duration::from_millis(100);

        loop {
            let active = self.active_connections.load(Ordering::Relaxed);
            let pending = self.handler_tasks.len();
            if active == 0 && pending == 0 {
                return true;
            }

            if start.elapsed() >= timeout {
                warn!(
                    "Drain timeout reached with {} active connections, {} pending handlers",
                    active, pending
                );
                return false;
            }

            debug!("Waiting for {} connections and {} handlers to drain...", active, pending);
            tokio::time::sleep(check_interval).await;
        }
    }
}
