//! Telemetry client that reports events through the application log.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use super::{Event, EventId, Scope, TelemetryClient, TelemetryError};

/// Log target used for reported events.
pub const TELEMETRY_TARGET: &str = "telemetry";

/// Queues captured events and writes them as structured log records on flush.
///
/// Useful where no collector is configured: events still end up in the log
/// pipeline, and flush keeps the same "send before the process may exit"
/// contract as a network client.
pub struct LogClient {
    scope: Scope,
    queue: Mutex<Vec<Event>>,
}

impl LogClient {
    /// Create a client whose ambient scope is `scope`.
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Number of events captured but not yet flushed.
    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn drain(&self) -> Result<Vec<Event>, TelemetryError> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| TelemetryError::Flush("event queue poisoned".to_string()))?;
        Ok(std::mem::take(&mut *queue))
    }
}

#[async_trait]
impl TelemetryClient for LogClient {
    fn current_scope(&self) -> Option<Scope> {
        Some(self.scope.clone())
    }

    fn capture_event(&self, event: Event, scope: &Scope) -> Option<EventId> {
        let event = scope.apply_to_event(event)?;
        let event_id = event.event_id;
        match self.queue.lock() {
            Ok(mut queue) => queue.push(event),
            Err(_) => {
                debug!(%event_id, "event queue poisoned, dropping event");
                return None;
            }
        }
        Some(event_id)
    }

    async fn flush(&self, _timeout: Duration) -> Result<bool, TelemetryError> {
        for event in self.drain()? {
            let payload = serde_json::to_string(&event)
                .map_err(|e| TelemetryError::Flush(e.to_string()))?;
            error!(
                target: TELEMETRY_TARGET,
                event_id = %event.event_id,
                transaction = event.transaction.as_deref().unwrap_or(""),
                payload = %payload,
                "captured exception"
            );
        }
        Ok(true)
    }
}
