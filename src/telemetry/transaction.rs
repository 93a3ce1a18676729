//! Request transactions and their HTTP status mapping.

use std::fmt;

use http::StatusCode;

/// Span covering a whole request, opened before the handler runs.
///
/// `finish` consumes the transaction, so it can run at most once.
pub trait Transaction: Send {
    /// Transaction name, typically `METHOD /route`.
    fn name(&self) -> &str;

    /// Record the HTTP status the response is sent with.
    fn set_http_status(&mut self, status: StatusCode);

    /// Close the transaction and hand it to the collector.
    fn finish(self: Box<Self>);
}

/// Canonical span status derived from an HTTP status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    ResourceExhausted,
    InvalidArgument,
    Unimplemented,
    Unavailable,
    DeadlineExceeded,
    InternalError,
    UnknownError,
}

impl SpanStatus {
    pub fn from_http(status: StatusCode) -> Self {
        match status.as_u16() {
            100..=399 => SpanStatus::Ok,
            401 => SpanStatus::Unauthenticated,
            403 => SpanStatus::PermissionDenied,
            404 => SpanStatus::NotFound,
            409 => SpanStatus::AlreadyExists,
            413 => SpanStatus::FailedPrecondition,
            429 => SpanStatus::ResourceExhausted,
            400..=499 => SpanStatus::InvalidArgument,
            501 => SpanStatus::Unimplemented,
            503 => SpanStatus::Unavailable,
            504 => SpanStatus::DeadlineExceeded,
            500..=599 => SpanStatus::InternalError,
            _ => SpanStatus::UnknownError,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Ok => "ok",
            SpanStatus::Unauthenticated => "unauthenticated",
            SpanStatus::PermissionDenied => "permission_denied",
            SpanStatus::NotFound => "not_found",
            SpanStatus::AlreadyExists => "already_exists",
            SpanStatus::FailedPrecondition => "failed_precondition",
            SpanStatus::ResourceExhausted => "resource_exhausted",
            SpanStatus::InvalidArgument => "invalid_argument",
            SpanStatus::Unimplemented => "unimplemented",
            SpanStatus::Unavailable => "unavailable",
            SpanStatus::DeadlineExceeded => "deadline_exceeded",
            SpanStatus::InternalError => "internal_error",
            SpanStatus::UnknownError => "unknown_error",
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, SpanStatus::Ok)
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
