use async_trait::async_trait;
use http::StatusCode;

use super::{Middleware, Next};
use crate::config::{Config, CorsConfig};
use crate::container::{Container, Injectable};
use crate::error::{ContainerError, Result};
use crate::method::Method;
use crate::request::Request;
use crate::response::Reply;

/// Adds `Access-Control-Allow-*` headers to whatever the rest of the chain
/// returns. Preflight `OPTIONS` requests are answered with `200`.
#[derive(Debug, Clone, Default)]
pub struct CorsMiddleware {
    config: CorsConfig,
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }
}

impl Injectable for CorsMiddleware {
    fn build(c: &Container) -> Result<Self, ContainerError> {
        Ok(Self::new(c.resolve::<Config>()?.cors.clone()))
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, req: Request, next: Next) -> Result<Reply> {
        let preflight = req.is_method(Method::Options);
        let mut res = next.run(req).await?.into_response();

        res.set_header("Access-Control-Allow-Origin", &self.config.allow_origin)
            .set_header("Access-Control-Allow-Methods", &self.config.allow_methods)
            .set_header("Access-Control-Allow-Headers", &self.config.allow_headers);
        if preflight {
            res.set_status_code(StatusCode::OK);
        }
        Ok(res.into())
    }
}
