//! Hand-off from a handler's `end` call to the waiting hyper service.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use tokio::sync::oneshot;

use crate::core::{Error, Finalize, ResponseHead, Result};

/// Response type produced by the host adapter.
pub type HttpResponse = Response<Full<Bytes>>;

/// Sends the finished response over a oneshot channel.
///
/// Dropping the finalizer without calling it drops the sender, which the
/// service observes as "handler never responded".
pub struct ChannelFinalizer {
    tx: Mutex<Option<oneshot::Sender<HttpResponse>>>,
}

impl ChannelFinalizer {
    pub fn new(tx: oneshot::Sender<HttpResponse>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }
}

#[async_trait]
impl Finalize for ChannelFinalizer {
    async fn finalize(&self, head: ResponseHead, body: Bytes) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| Error::Custom("response channel poisoned".into()))?
            .take()
            .ok_or(Error::ResponseDropped)?;

        tx.send(into_response(head, body))
            .map_err(|_| Error::ResponseDropped)
    }
}

/// Build the wire response from a finished head and body.
pub fn into_response(head: ResponseHead, body: Bytes) -> HttpResponse {
    let (status, headers) = head.into_parts();
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Plain-text response for failures the handler never reported itself.
pub fn plain_response(status: StatusCode) -> HttpResponse {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(Full::new(Bytes::from(reason)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
