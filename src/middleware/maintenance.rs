use async_trait::async_trait;
use http::StatusCode;
use serde_json::json;
use tracing::debug;

use super::{Middleware, Next};
use crate::config::{Config, MaintenanceConfig};
use crate::container::{Container, Injectable};
use crate::error::{ContainerError, Result};
use crate::request::Request;
use crate::response::{Reply, Response};

/// While maintenance mode is on, answers `503` to every client whose IP is
/// not whitelisted.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceMiddleware {
    config: MaintenanceConfig,
}

impl MaintenanceMiddleware {
    pub fn new(config: MaintenanceConfig) -> Self {
        Self { config }
    }
}

impl Injectable for MaintenanceMiddleware {
    fn build(c: &Container) -> Result<Self, ContainerError> {
        Ok(Self::new(c.resolve::<Config>()?.maintenance.clone()))
    }
}

#[async_trait]
impl Middleware for MaintenanceMiddleware {
    async fn handle(&self, req: Request, next: Next) -> Result<Reply> {
        if !self.config.enabled {
            return next.run(req).await;
        }

        let ip = req.ip();
        if self.config.whitelisted_ips.iter().any(|allowed| *allowed == ip) {
            return next.run(req).await;
        }

        debug!(%ip, path = req.path(), "refused during maintenance");
        Ok(Response::json(&json!({
            "error": "Service Unavailable",
            "message": self.config.message,
        }))
        .with_status(StatusCode::SERVICE_UNAVAILABLE)
        .into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::method::Method;
    use crate::middleware::Pipeline;

    async fn run(enabled: bool, ip: &str) -> Response {
        let config = MaintenanceConfig { enabled, ..MaintenanceConfig::default() };
        let pipeline = Pipeline::new(vec![Arc::new(MaintenanceMiddleware::new(config))]);
        let req = Request::builder(Method::Get, "/")
            .remote_addr(format!("{ip}:4000").parse().unwrap())
            .build();
        pipeline.run(req, super::super::ok_endpoint()).await.unwrap().into_response()
    }

    #[tokio::test]
    async fn disabled_mode_lets_everyone_through() {
        assert_eq!(run(false, "10.0.0.7").await.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn only_whitelisted_ips_pass_during_maintenance() {
        assert_eq!(run(true, "127.0.0.1").await.status_code(), StatusCode::OK);

        let res = run(true, "10.0.0.7").await;
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.json_body().unwrap()["error"], "Service Unavailable");
    }
}
