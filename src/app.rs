//! The application: container, routes and configuration, plus the request
//! dispatcher that ties them together.
//!
//! Dispatching one request goes through these states:
//!
//! ```text
//! Routing ─┬─> Matched ──> PipelineBuilt ──> Executing ──> Responded
//!          ├─> NotFound ──────────────────────────────────> Responded (404)
//!          └─> MethodNotAllowed ──────────────────────────> Responded (405)
//! ```
//!
//! [`App::dispatch`] never fails: routing misses and every error raised along
//! the way become an error page from the container's
//! [`ErrorPages`](crate::services::ErrorPages).

use std::sync::Arc;

use tracing::{debug, error};

use crate::config::Config;
use crate::container::Container;
use crate::error::{Error, Result, RouteError};
use crate::handler::BoxedHandler;
use crate::inject::CallContext;
use crate::middleware::{
    AdminMiddleware, AuthMiddleware, CorsMiddleware, Endpoint, MaintenanceMiddleware, Pipeline, TraceMiddleware,
};
use crate::request::Request;
use crate::response::{Reply, Response};
use crate::route::{Action, Route};
use crate::router::Router;
use crate::services::{DefaultErrorPages, ErrorPages, Failure};

/// Assembles an [`App`].
///
/// The configuration is registered in the container as an instance, and the
/// built-in middleware under their names (`auth`, `admin`, `cors`,
/// `maintenance`, `trace`). Registering another middleware under one of those
/// names replaces the built-in one.
pub struct AppBuilder {
    container: Container,
    router: Router,
    config: Arc<Config>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        let mut container = Container::new();
        container
            .instance(config.clone())
            .middleware("auth", |c| c.build::<AuthMiddleware>())
            .middleware("admin", |c| c.build::<AdminMiddleware>())
            .middleware("cors", |c| c.build::<CorsMiddleware>())
            .middleware("maintenance", |c| c.build::<MaintenanceMiddleware>())
            .middleware("trace", |c| c.build::<TraceMiddleware>());

        Self { container, router: Router::new(), config: Arc::new(config) }
    }

    /// The container, for registering services and middleware.
    pub fn container(&mut self) -> &mut Container {
        &mut self.container
    }

    /// The router, for registering routes and controller methods.
    pub fn router(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn services(mut self, register: impl FnOnce(&mut Container)) -> Self {
        register(&mut self.container);
        self
    }

    pub fn routes(mut self, register: impl FnOnce(&mut Router)) -> Self {
        register(&mut self.router);
        self
    }

    pub fn build(self) -> App {
        debug!(
            name = %self.config.name,
            bindings = self.container.count(),
            "application built"
        );
        App {
            container: Arc::new(self.container),
            router: Arc::new(self.router),
            config: self.config,
        }
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// A built application. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct App {
    container: Arc<Container>,
    router: Arc<Router>,
    config: Arc<Config>,
}

impl App {
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Routes `req`, runs the route's middleware and action, and normalizes
    /// the result into a [`Response`].
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let method = req.method();
        let path = req.path().to_owned();

        let matched = match self.router.lookup(method, &path) {
            Ok(matched) => matched,
            Err(e) => {
                debug!(%method, path = %path, status = e.status().as_u16(), "{e}");
                return self.route_failure(e);
            }
        };
        req.set_params(matched.params);

        match self.execute(matched.route, req).await {
            Ok(reply) => reply.into_response(),
            Err(e) => {
                error!(%method, path = %path, kind = e.kind(), "request failed: {e}");
                self.error_page(&e)
            }
        }
    }

    /// Builds the whole pipeline, then runs it.
    async fn execute(&self, route: &Route, req: Request) -> Result<Reply> {
        let pipeline = Pipeline::resolve(&self.container, route.middleware_ids())?;
        let handler = self.endpoint(route.action())?;

        let container = Arc::clone(&self.container);
        let endpoint: Endpoint = Box::new(move |req| handler.call(CallContext::new(container, req)));
        pipeline.run(req, endpoint).await
    }

    fn endpoint(&self, action: &Action) -> Result<BoxedHandler> {
        match action {
            Action::Handler(handler) => Ok(Arc::clone(handler)),
            Action::Controller { controller, method } => self
                .router
                .controller_method(controller, method)
                .ok_or_else(|| Error::InvalidAction { action: action.to_string() }),
        }
    }

    fn route_failure(&self, e: RouteError) -> Response {
        let allow = match &e {
            RouteError::MethodNotAllowed { allowed, .. } if !allowed.is_empty() => Some(
                allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", "),
            ),
            _ => None,
        };

        let mut res = self.error_page(&Error::Route(e));
        if let Some(allow) = allow {
            res.set_header("Allow", &allow);
        }
        res
    }

    fn error_page(&self, e: &Error) -> Response {
        let failure = Failure::from(e);
        match self.container.resolve::<Arc<dyn ErrorPages>>() {
            Ok(pages) => pages.render(&failure),
            Err(resolve) => {
                error!(kind = e.kind(), "error pages unavailable: {resolve}");
                DefaultErrorPages::new(self.config.debug).render(&failure)
            }
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("container", &self.container)
            .field("router", &self.router)
            .field("config", &self.config)
            .finish()
    }
}
