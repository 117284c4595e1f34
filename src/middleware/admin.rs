use async_trait::async_trait;
use http::StatusCode;
use serde_json::json;
use tracing::debug;

use super::{Middleware, Next};
use crate::config::Config;
use crate::container::{Container, Injectable};
use crate::error::{ContainerError, Result};
use crate::request::Request;
use crate::response::{Reply, Response};

/// Requires the configured admin token, sent either as an `X-Admin-Token`
/// header or as an `admin_token` input.
#[derive(Debug, Clone)]
pub struct AdminMiddleware {
    token: String,
}

impl AdminMiddleware {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Injectable for AdminMiddleware {
    fn build(c: &Container) -> Result<Self, ContainerError> {
        Ok(Self::new(c.resolve::<Config>()?.admin_token.clone()))
    }
}

#[async_trait]
impl Middleware for AdminMiddleware {
    async fn handle(&self, req: Request, next: Next) -> Result<Reply> {
        let token = req.header("x-admin-token").or_else(|| req.input("admin_token"));

        if token.is_none_or(|t| t.is_empty() || t != self.token) {
            debug!(path = req.path(), ip = %req.ip(), "admin token rejected");
            return Ok(Response::json(&json!({
                "error": "Unauthorized",
                "message": "Admin token required",
            }))
            .with_status(StatusCode::UNAUTHORIZED)
            .into());
        }
        next.run(req).await
    }
}
