//! Core types for the request lifecycle.
//!
//! - [`Request`] - HTTP request handed to handlers
//! - [`ResponseWriter`] - response handle with a pluggable [`Finalize`] operation
//! - [`ResponseHead`] - status, headers and transaction attachment
//! - [`Error`] - core error types
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_sentry::core::{Request, ResponseWriter};
//! use http::StatusCode;
//!
//! async fn handler(req: Request, mut res: ResponseWriter) -> tokio_sentry::core::Result<()> {
//!     res.set_status(StatusCode::OK);
//!     res.end(format!("hello from {}", req.path())).await
//! }
//! ```

mod error;
mod request;
mod response;

pub use error::{Error, Result};
pub use request::Request;
pub use response::{Finalize, ResponseHead, ResponseWriter};
