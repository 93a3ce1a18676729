//! OpenTelemetry span as a request [`Transaction`].

use http::StatusCode;
use opentelemetry::global::{self, BoxedSpan};
use opentelemetry::trace::{Span, SpanKind, Status, Tracer};
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::trace::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, URL_PATH,
};

use super::{SpanStatus, Transaction};
use crate::core::Request;

/// Server span covering one request.
pub struct OtelTransaction {
    name: String,
    span: BoxedSpan,
}

/// Start a server span for `request` on the global tracer provider.
pub fn start_http_transaction(request: &Request) -> OtelTransaction {
    let tracer = global::tracer("tokio_sentry");
    let name = format!("{} {}", request.method(), request.path());

    let span = tracer
        .span_builder(name.clone())
        .with_kind(SpanKind::Server)
        .with_attributes(vec![
            KeyValue::new(HTTP_REQUEST_METHOD, request.method().to_string()),
            KeyValue::new(URL_PATH, request.path().to_string()),
        ])
        .start(&tracer);

    OtelTransaction { name, span }
}

impl Transaction for OtelTransaction {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_http_status(&mut self, status: StatusCode) {
        self.span.set_attribute(KeyValue::new(
            HTTP_RESPONSE_STATUS_CODE,
            i64::from(status.as_u16()),
        ));
        // Client errors are not span errors per OpenTelemetry conventions.
        if status.is_server_error() {
            self.span
                .set_status(Status::error(SpanStatus::from_http(status).as_str()));
        } else {
            self.span.set_status(Status::Ok);
        }
    }

    fn finish(mut self: Box<Self>) {
        self.span.end();
    }
}
