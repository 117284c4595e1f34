use std::time::Instant;

use async_trait::async_trait;
use tracing::{Instrument, info, info_span, warn};

use super::{Middleware, Next};
use crate::container::{Container, Injectable};
use crate::error::{ContainerError, Result};
use crate::request::Request;
use crate::response::Reply;

/// Runs the rest of the chain inside a `request` span and logs method, path,
/// status and latency once it completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceMiddleware;

impl Injectable for TraceMiddleware {
    fn build(_: &Container) -> Result<Self, ContainerError> {
        Ok(Self)
    }
}

#[async_trait]
impl Middleware for TraceMiddleware {
    async fn handle(&self, req: Request, next: Next) -> Result<Reply> {
        let span = info_span!("request", method = %req.method(), path = req.path(), ip = %req.ip());
        let started = Instant::now();

        let reply = next.run(req).instrument(span.clone()).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        span.in_scope(|| match &reply {
            Ok(reply) => info!(status = reply.status().as_u16(), latency_ms, "request completed"),
            Err(e) => warn!(kind = e.kind(), latency_ms, "request failed: {e}"),
        });
        reply
    }
}
