//! Response writer owned by the host and lent to a handler for one request.
//!
//! The writer carries the response head (status, headers) plus an optional
//! request [`Transaction`] attached upstream. Sending the response goes
//! through a [`Finalize`] implementation supplied by the host; wrappers may
//! decorate it with [`ResponseWriter::decorate`] before the handler runs.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};

use super::Result;
use crate::telemetry::Transaction;

/// Status, headers and transaction attachment of a response being written.
pub struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
    transaction: Option<Box<dyn Transaction>>,
}

impl ResponseHead {
    #[inline]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            transaction: None,
        }
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Whether a transaction is currently attached.
    #[inline]
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Detach the transaction, leaving `None` behind.
    #[inline]
    pub fn take_transaction(&mut self) -> Option<Box<dyn Transaction>> {
        self.transaction.take()
    }

    /// Split into status and headers for the wire.
    pub fn into_parts(self) -> (StatusCode, HeaderMap) {
        (self.status, self.headers)
    }
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHead")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("transaction", &self.transaction.as_ref().map(|t| t.name()))
            .finish()
    }
}

/// The operation that marks a response as fully sent.
///
/// Hosts implement this to hand the finished response to their transport.
/// Decorators wrap another `Finalize` and must call it exactly once.
#[async_trait]
pub trait Finalize: Send + Sync {
    async fn finalize(&self, head: ResponseHead, body: Bytes) -> Result<()>;
}

/// Mutable response handle passed to handlers.
///
/// `end` consumes the writer, so a response is finalized at most once.
pub struct ResponseWriter {
    head: ResponseHead,
    finalizer: Box<dyn Finalize>,
}

impl ResponseWriter {
    /// Create a writer that finalizes through `finalizer`.
    pub fn new(finalizer: impl Finalize + 'static) -> Self {
        Self {
            head: ResponseHead::new(),
            finalizer: Box::new(finalizer),
        }
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    #[inline]
    pub fn set_status(&mut self, status: StatusCode) {
        self.head.set_status(status);
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.head.headers_mut()
    }

    /// Set a header by string name and value. Invalid names or values are ignored.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.head.headers_mut().insert(name, value);
        }
    }

    /// Attach the request transaction, returning any previously attached one.
    pub fn attach_transaction(
        &mut self,
        transaction: Box<dyn Transaction>,
    ) -> Option<Box<dyn Transaction>> {
        self.head.transaction.replace(transaction)
    }

    #[inline]
    pub fn has_transaction(&self) -> bool {
        self.head.has_transaction()
    }

    /// Replace the finalize operation with a decorated one.
    ///
    /// `decorator` receives the current operation and returns its replacement.
    pub fn decorate<F>(mut self, decorator: F) -> Self
    where
        F: FnOnce(Box<dyn Finalize>) -> Box<dyn Finalize>,
    {
        self.finalizer = decorator(self.finalizer);
        self
    }

    /// Finish the response with `body`.
    pub async fn end(self, body: impl Into<Bytes>) -> Result<()> {
        let Self { head, finalizer } = self;
        finalizer.finalize(head, body.into()).await
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}
