//! Unified error types.
//!
//! Three layers, from the inside out:
//!
//! - [`ContainerError`]: the container could not build something.
//! - [`RouteError`]: no route for the request. Always recovered by the
//!   dispatcher into a 404 / 405 response, never surfaced to the transport.
//! - [`Error`]: everything a handler, a middleware or the server can fail
//!   with. [`Error::status`] gives the HTTP status hint used when the
//!   dispatcher turns it into an error page.

use http::StatusCode;

use crate::method::Method;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures raised while resolving something out of the
/// [`Container`](crate::Container).
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// A constructor parameter could not be satisfied: no registered value and
    /// no declared default.
    #[error("cannot resolve parameter `{parameter}` of `{target}`")]
    DependencyResolution { target: String, parameter: String },

    /// The identifier names something that cannot be constructed on its own:
    /// a trait-object handle or a string key nobody registered.
    #[error("`{target}` is not instantiable")]
    NotInstantiable { target: String },

    /// A handler argument could not be produced from the call context.
    #[error("cannot resolve handler parameter `{parameter}`: {reason}")]
    UnresolvableParameter { parameter: String, reason: String },

    /// `target` was requested again while it was still being built.
    #[error("circular dependency while resolving `{target}` ({chain})")]
    CircularDependency { target: String, chain: String },

    /// A binding produced a value of a different type than the caller asked for.
    #[error("`{key}` does not hold a `{expected}`")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Why the route table could not produce a route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no route matches {method} {path}")]
    NotFound { method: Method, path: String },

    /// `allowed` lists the methods whose routes do match the path. It is empty
    /// when the request's method has no routes registered at all.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

/// The error type returned by lintel's fallible operations.
///
/// Application-level refusals (401, 403, 422, ...) are expressed as
/// [`Response`](crate::Response) values returned by middleware or handlers,
/// not as `Error`s. This type carries configuration defects and
/// infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Route(#[from] RouteError),

    /// The route action is neither a handler nor a registered controller method.
    #[error("invalid route action `{action}`")]
    InvalidAction { action: String },

    #[error("cannot render view `{view}`: {reason}")]
    Render { view: String, reason: String },

    /// Anything a handler bubbles up with `?`.
    #[error("handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Wraps an arbitrary error raised inside a handler.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Route(e) => e.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind, used in logs and error pages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Container(ContainerError::DependencyResolution { .. }) => "dependency_resolution",
            Self::Container(ContainerError::NotInstantiable { .. }) => "not_instantiable",
            Self::Container(ContainerError::UnresolvableParameter { .. }) => "unresolvable_parameter",
            Self::Container(ContainerError::CircularDependency { .. }) => "circular_dependency",
            Self::Container(ContainerError::TypeMismatch { .. }) => "type_mismatch",
            Self::Route(RouteError::NotFound { .. }) => "route_not_found",
            Self::Route(RouteError::MethodNotAllowed { .. }) => "method_not_allowed",
            Self::InvalidAction { .. } => "invalid_action",
            Self::Render { .. } => "render",
            Self::Handler(_) => "handler",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_errors_carry_their_status() {
        let not_found = Error::from(RouteError::NotFound { method: Method::Get, path: "/x".into() });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let not_allowed = Error::from(RouteError::MethodNotAllowed {
            method: Method::Delete,
            path: "/x".into(),
            allowed: vec![Method::Get],
        });
        assert_eq!(not_allowed.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn container_errors_are_server_errors() {
        let err = Error::from(ContainerError::DependencyResolution {
            target: "Mailer".into(),
            parameter: "smtp_host".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "dependency_resolution");
        assert_eq!(err.to_string(), "cannot resolve parameter `smtp_host` of `Mailer`");
    }
}
