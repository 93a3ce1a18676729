//! The instrumented handler and unhandled-exception capture.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, warn};

use super::{FinalizeInterceptor, FlushSite, Handler, Telemetry};
use crate::core::{Request, ResponseWriter};
use crate::telemetry::{
    add_exception_mechanism, parse_request, with_scope, Event, EventId, Mechanism, RequestData,
};

/// A handler wrapped by [`Telemetry::wrap`].
///
/// Same inputs, output and error type as the inner handler. Cheap to share:
/// the inner handler sits behind an `Arc`.
pub struct Instrumented<H> {
    handler: Arc<H>,
    telemetry: Telemetry,
}

impl<H: Handler> Instrumented<H> {
    pub(crate) fn new(handler: H, telemetry: Telemetry) -> Self {
        Self {
            handler: Arc::new(handler),
            telemetry,
        }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn inner(&self) -> &H {
        &self.handler
    }
}

impl<H> Clone for Instrumented<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            telemetry: self.telemetry.clone(),
        }
    }
}

impl<H: Handler> Handler for Instrumented<H> {
    type Output = H::Output;
    type Error = H::Error;

    fn call(
        &self,
        req: Request,
        res: ResponseWriter,
    ) -> BoxFuture<'static, Result<Self::Output, Self::Error>> {
        let handler = Arc::clone(&self.handler);
        let telemetry = self.telemetry.clone();

        Box::pin(async move {
            // The handler owns the request; keep what enrichment needs.
            let request = RequestData::from_request(&req, telemetry.send_default_pii());

            let interceptor = telemetry.clone();
            let res = res.decorate(move |inner| Box::new(FinalizeInterceptor::new(inner, interceptor)));

            let outcome = AssertUnwindSafe(handler.call(req, res))
                .catch_unwind()
                .await;

            match &outcome {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    telemetry.capture_unhandled(Event::from_error(err), &request);
                }
                Err(payload) => {
                    telemetry.capture_unhandled(Event::from_panic(&**payload), &request);
                }
            }

            telemetry.flush(FlushSite::Handler).await;

            match outcome {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            }
        })
    }
}

impl Telemetry {
    /// Capture `event` as an unhandled exception in a fresh scope.
    ///
    /// The scope gets one processor that marks the exception unhandled and
    /// attaches `request`. Never panics and never fails: problems inside the
    /// client are logged and the capture is skipped.
    pub fn capture_unhandled(&self, event: Event, request: &RequestData) -> Option<EventId> {
        let request = request.clone();
        let client = self.client.as_ref();

        let captured = panic::catch_unwind(AssertUnwindSafe(move || {
            with_scope(client, move |scope, client| {
                scope.add_event_processor(move |mut event| {
                    add_exception_mechanism(&mut event, Mechanism::unhandled());
                    Some(parse_request(event, &request))
                });
                client.capture_event(event, scope)
            })
        }));

        let event_id = match captured {
            Ok(Some(Some(event_id))) => {
                debug!(%event_id, "captured unhandled exception");
                Some(event_id)
            }
            Ok(Some(None)) => {
                debug!("exception event dropped by scope processor");
                None
            }
            Ok(None) => {
                debug!("no telemetry scope bound, skipping capture");
                None
            }
            Err(_) => {
                warn!("telemetry client panicked during capture");
                None
            }
        };

        if let Some(metrics) = &self.metrics {
            match event_id {
                Some(_) => metrics.exceptions_captured_total.inc(),
                None => metrics.captures_skipped_total.inc(),
            }
        }

        event_id
    }
}
