//! Response finalize interceptor.

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use tracing::{debug, warn};

use super::{FlushSite, Telemetry};
use crate::core::{Finalize, ResponseHead, Result};
use crate::telemetry::Transaction;

/// Closes the request transaction and flushes before the response goes out.
///
/// Runs, in order: record the response status on the attached transaction,
/// finish it on the next scheduler turn, flush (failures swallowed), then
/// delegate to the wrapped finalize operation exactly once.
pub struct FinalizeInterceptor {
    inner: Box<dyn Finalize>,
    telemetry: Telemetry,
}

impl FinalizeInterceptor {
    pub fn new(inner: Box<dyn Finalize>, telemetry: Telemetry) -> Self {
        Self { inner, telemetry }
    }
}

#[async_trait]
impl Finalize for FinalizeInterceptor {
    async fn finalize(&self, mut head: ResponseHead, body: Bytes) -> Result<()> {
        if let Some(transaction) = head.take_transaction() {
            self.finish_transaction(transaction, head.status()).await;
        }

        self.telemetry.flush(FlushSite::Finalize).await;

        self.inner.finalize(head, body).await
    }
}

impl FinalizeInterceptor {
    async fn finish_transaction(&self, mut transaction: Box<dyn Transaction>, status: StatusCode) {
        transaction.set_http_status(status);
        let name = transaction.name().to_string();

        // Spans still open in the current turn get to close before the
        // transaction does.
        match tokio::spawn(async move { transaction.finish() }).await {
            Ok(()) => {
                debug!(
                    transaction = %name,
                    status = status.as_u16(),
                    "transaction finished"
                );
                if let Some(metrics) = self.telemetry.metrics() {
                    metrics.transactions_finished_total.inc();
                }
            }
            Err(e) => {
                warn!(transaction = %name, error = %e, "transaction finish failed");
            }
        }
    }
}
