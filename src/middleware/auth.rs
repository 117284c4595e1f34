use async_trait::async_trait;
use http::StatusCode;
use serde_json::json;
use tracing::debug;

use super::{Middleware, Next};
use crate::container::{Container, Injectable};
use crate::error::{ContainerError, Result};
use crate::request::Request;
use crate::response::{Reply, Response};

/// Requires an `Authorization: Bearer <token>` header.
///
/// Only the presence of a token is checked. Applications that validate
/// tokens register their own middleware under `auth`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthMiddleware;

impl Injectable for AuthMiddleware {
    fn build(_: &Container) -> Result<Self, ContainerError> {
        Ok(Self)
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(&self, req: Request, next: Next) -> Result<Reply> {
        if req.bearer_token().is_none_or(str::is_empty) {
            debug!(path = req.path(), "missing bearer token");
            return Ok(Response::json(&json!({ "error": "Unauthorized" }))
                .with_status(StatusCode::UNAUTHORIZED)
                .into());
        }
        next.run(req).await
    }
}
