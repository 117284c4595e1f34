//! Collaborator contracts.
//!
//! lintel does not ship storage backends, a template engine or HTML error
//! pages. It talks to them through the traits below, always by resolving a
//! handle out of the [`Container`](crate::Container):
//!
//! ```rust,ignore
//! let cache = container.resolve::<Arc<dyn Store>>()?;
//! ```
//!
//! The handles implement [`Injectable`] without a constructor, so resolving
//! one that nobody bound fails with `NotInstantiable` rather than silently
//! falling back to something.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde_json::{Value, json};

use crate::config::Config;
use crate::container::{Container, Injectable};
use crate::error::{ContainerError, Error, Result};
use crate::response::Response;

/// Key/value storage: sessions, cache, rate-limit counters.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value`, optionally expiring after `ttl`. Returns whether the
    /// write succeeded.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool;

    /// Removes `key`. Returns whether it existed.
    fn forget(&self, key: &str) -> bool;

    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }
}

impl Injectable for Arc<dyn Store> {}

/// Turns a named view and its data into bytes.
pub trait ViewRenderer: Send + Sync {
    /// Fails with [`Error::Render`] when `view` does not exist.
    fn render(&self, view: &str, data: &Value) -> Result<Vec<u8>>;
}

impl Injectable for Arc<dyn ViewRenderer> {}

// ── Error pages ───────────────────────────────────────────────────────────────

/// What went wrong, as handed to an [`ErrorPages`] renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        Self { status: err.status(), kind: err.kind(), message: err.to_string() }
    }
}

/// Builds the response for a request that failed.
///
/// Must not fail itself: it runs at the dispatch boundary, after everything
/// else already has.
pub trait ErrorPages: Send + Sync {
    fn render(&self, failure: &Failure) -> Response;
}

/// Resolves to [`DefaultErrorPages`] unless an application binds its own.
impl Injectable for Arc<dyn ErrorPages> {
    fn build(c: &Container) -> Result<Self, ContainerError> {
        let config = c.resolve::<Config>()?;
        Ok(Arc::new(DefaultErrorPages::new(config.debug)))
    }
}

/// JSON error bodies for 403, 404, 405 and 500, with a generic shape for
/// every other status. With `debug` set the underlying error message is
/// included; otherwise server errors stay opaque.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorPages {
    debug: bool,
}

impl DefaultErrorPages {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl ErrorPages for DefaultErrorPages {
    fn render(&self, failure: &Failure) -> Response {
        let title = match failure.status {
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::METHOD_NOT_ALLOWED => "Method Not Allowed",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            other => other.canonical_reason().unwrap_or("Error"),
        };

        let mut body = json!({ "error": title, "status": failure.status.as_u16() });
        if self.debug {
            body["kind"] = json!(failure.kind);
            body["message"] = json!(failure.message);
        }
        Response::json(&body).with_status(failure.status)
    }
}
