//! Enrichment scope applied to events before they are sent.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::Event;

/// Maps an event before send. Returning `None` drops the event.
pub type EventProcessor = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

/// Tags and processors applied to every event captured under this scope.
///
/// Scopes are cheap to clone; clients hand out forks so that per-capture
/// changes never leak into the ambient scope.
#[derive(Clone, Default)]
pub struct Scope {
    tags: BTreeMap<String, String>,
    processors: Vec<EventProcessor>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Register a processor. Processors run in registration order.
    pub fn add_event_processor<F>(&mut self, processor: F)
    where
        F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
    {
        self.processors.push(Arc::new(processor));
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Apply tags, then processors. Tags already on the event win.
    pub fn apply_to_event(&self, mut event: Event) -> Option<Event> {
        for (key, value) in &self.tags {
            event
                .tags
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        self.processors
            .iter()
            .try_fold(event, |event, processor| processor(event))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("tags", &self.tags)
            .field("processors", &self.processors.len())
            .finish()
    }
}
