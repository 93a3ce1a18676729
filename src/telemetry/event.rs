//! Error events and exception mechanism tagging.

use std::any::Any;
use std::collections::BTreeMap;
use std::error::Error as StdError;

use serde::Serialize;
use uuid::Uuid;

use super::RequestData;
use crate::timestamp::Timestamp;

/// Identifier assigned to a captured event.
pub type EventId = Uuid;

/// Mechanism type used when none was recorded.
const DEFAULT_MECHANISM: &str = "generic";

/// Event severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

/// How an exception reached the collector.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Mechanism {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handled: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl Mechanism {
    /// Mechanism for an exception that escaped the request handler.
    pub fn unhandled() -> Self {
        Self {
            ty: Some(DEFAULT_MECHANISM.to_string()),
            handled: Some(false),
            data: BTreeMap::new(),
        }
    }
}

/// One exception in a causal chain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExceptionValue {
    #[serde(rename = "type")]
    pub ty: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,
}

/// An error event on its way to the collector.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub event_id: EventId,
    pub timestamp: Timestamp,
    pub level: Level,
    /// Outermost exception first, followed by its sources.
    pub exception: Vec<ExceptionValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Event {
    /// Empty error-level event with a fresh id.
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Timestamp::now(),
            level: Level::Error,
            exception: Vec::new(),
            request: None,
            transaction: None,
            tags: BTreeMap::new(),
        }
    }

    /// Event for `err` and every error in its `source()` chain.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut event = Self::new();
        let mut current = Some(err);
        while let Some(e) = current {
            event.exception.push(ExceptionValue {
                ty: type_from_debug(e),
                value: e.to_string(),
                mechanism: None,
            });
            current = e.source();
        }
        event
    }

    /// Event for a panic payload caught while polling a handler.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let value = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };

        let mut event = Self::new();
        event.level = Level::Fatal;
        event.exception.push(ExceptionValue {
            ty: "panic".to_string(),
            value,
            mechanism: None,
        });
        event
    }

    /// The top-level exception, if any.
    pub fn primary_exception(&self) -> Option<&ExceptionValue> {
        self.exception.first()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `mechanism` into the event's top-level exception.
///
/// Precedence: defaults (`generic`, handled) < existing mechanism < `mechanism`.
/// Data maps are merged key by key. Events without exceptions are left alone.
pub fn add_exception_mechanism(event: &mut Event, mechanism: Mechanism) {
    let Some(exception) = event.exception.first_mut() else {
        return;
    };

    let current = exception.mechanism.take().unwrap_or_default();
    let mut data = current.data;
    data.extend(mechanism.data);

    exception.mechanism = Some(Mechanism {
        ty: mechanism
            .ty
            .or(current.ty)
            .or_else(|| Some(DEFAULT_MECHANISM.to_string())),
        handled: mechanism.handled.or(current.handled).or(Some(true)),
        data,
    });
}

/// Best-effort type name from an error's `Debug` output.
///
/// `Custom("x")` yields `Custom`, `Error { kind: .. }` yields `Error`.
fn type_from_debug(err: &dyn StdError) -> String {
    let debug = format!("{:?}", err);
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if name.is_empty() {
        "Error".to_string()
    } else {
        name
    }
}
