//! Middleware layer.
//!
//! A middleware sees the request before the route action does, and the reply
//! after it. It either calls [`Next::run`] to continue the chain or returns a
//! reply of its own, which short-circuits everything after it:
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Middleware for RequireJson {
//!     async fn handle(&self, req: Request, next: Next) -> Result<Reply> {
//!         if !req.is_json() {
//!             return Ok(Response::status(StatusCode::UNSUPPORTED_MEDIA_TYPE).into());
//!         }
//!         next.run(req).await
//!     }
//! }
//! ```
//!
//! Routes refer to middleware by name. Names are resolved through the
//! [`Container`], so a middleware is registered like any other service:
//!
//! ```rust,ignore
//! container.middleware("json", |_| Ok(RequireJson));
//! router.post("/items", create).middleware("json");
//! ```
//!
//! Built in, and registered by [`AppBuilder`](crate::AppBuilder):
//!
//! | Name | Type |
//! |---|---|
//! | `auth` | [`AuthMiddleware`] |
//! | `admin` | [`AdminMiddleware`] |
//! | `cors` | [`CorsMiddleware`] |
//! | `maintenance` | [`MaintenanceMiddleware`] |
//! | `trace` | [`TraceMiddleware`] |

mod admin;
mod auth;
mod cors;
mod maintenance;
mod trace;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::container::{Container, Key};
use crate::error::{ContainerError, Result};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::{IntoReply, Reply};

pub use admin::AdminMiddleware;
pub use auth::AuthMiddleware;
pub use cors::CorsMiddleware;
pub use maintenance::MaintenanceMiddleware;
pub use trace::TraceMiddleware;

/// Processes a request on its way to the route action.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next) -> Result<Reply>;
}

/// The innermost step of a chain: the route action.
pub type Endpoint = Box<dyn FnOnce(Request) -> BoxFuture<Result<Reply>> + Send>;

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// An ordered list of middleware, outermost first.
#[derive(Clone, Default)]
pub struct Pipeline {
    layers: Arc<[Arc<dyn Middleware>]>,
}

impl Pipeline {
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Self {
        Self { layers: layers.into() }
    }

    /// Resolves every identifier through `container`, in order. Nothing runs
    /// unless the whole chain could be built.
    pub fn resolve(container: &Container, ids: &[String]) -> Result<Self, ContainerError> {
        let layers = ids
            .iter()
            .map(|id| container.resolve_middleware(id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(layers))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs `req` through every layer and finally `endpoint`.
    ///
    /// The first layer sees the request first and the reply last:
    /// `m1 → m2 → endpoint → m2 → m1`.
    pub fn run(&self, req: Request, endpoint: Endpoint) -> BoxFuture<Result<Reply>> {
        Next { layers: Arc::clone(&self.layers), index: 0, endpoint }.run(req)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("layers", &self.layers.len()).finish()
    }
}

/// The rest of the chain, handed to each middleware.
///
/// Consumed by [`run`](Next::run), so it can be continued at most once.
pub struct Next {
    layers: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: Endpoint,
}

impl Next {
    /// Continues with the next middleware, or the route action once the
    /// chain is exhausted.
    pub fn run(self, req: Request) -> BoxFuture<Result<Reply>> {
        let layer = self.layers.get(self.index).cloned();
        match layer {
            None => (self.endpoint)(req),
            Some(layer) => {
                let next = Next { index: self.index + 1, ..self };
                Box::pin(async move { layer.handle(req, next).await })
            }
        }
    }
}

// ── Closures ──────────────────────────────────────────────────────────────────

/// Middleware from an async closure.
///
/// ```rust,ignore
/// container.middleware("stamp", |_| Ok(from_fn(|req, next: Next| async move {
///     let mut res = next.run(req).await?.into_response();
///     res.set_header("X-Stamp", "1");
///     Ok::<_, lintel::Error>(res)
/// })));
/// ```
pub fn from_fn<F, Fut, R>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
#[derive(Clone)]
pub struct FromFn<F>(F);

#[async_trait]
impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    async fn handle(&self, req: Request, next: Next) -> Result<Reply> {
        (self.0)(req, next).await.into_reply()
    }
}

// ── Registration ──────────────────────────────────────────────────────────────

impl Container {
    /// Registers a middleware under `name`. The factory runs once per
    /// request that passes through it.
    pub fn middleware<M, F>(&mut self, name: impl Into<Key>, factory: F) -> &mut Self
    where
        M: Middleware,
        F: Fn(&Container) -> Result<M, ContainerError> + Send + Sync + 'static,
    {
        self.bind_named(name, move |c| Ok(Arc::new(factory(c)?) as Arc<dyn Middleware>), false)
    }

    /// Registers one middleware value shared by every request.
    pub fn middleware_instance(&mut self, name: impl Into<Key>, middleware: impl Middleware) -> &mut Self {
        self.instance_named(name, Arc::new(middleware) as Arc<dyn Middleware>)
    }

    /// Builds the middleware registered under `name`.
    pub fn resolve_middleware(&self, name: &str) -> Result<Arc<dyn Middleware>, ContainerError> {
        let handle = self.resolve_named::<Arc<dyn Middleware>>(Key::from(name.to_owned()))?;
        Ok(Arc::clone(&handle))
    }
}

/// An endpoint that answers `"ok"`.
#[cfg(test)]
pub(crate) fn ok_endpoint() -> Endpoint {
    Box::new(|_| Box::pin(async { Ok(Reply::Text("ok".to_owned())) }))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::*;
    use crate::method::Method;
    use crate::response::Response;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Record {
        name: &'static str,
        log: Log,
    }

    #[async_trait]
    impl Middleware for Record {
        async fn handle(&self, req: Request, next: Next) -> Result<Reply> {
            self.log.lock().unwrap().push(format!("{}-before", self.name));
            let reply = next.run(req).await;
            self.log.lock().unwrap().push(format!("{}-after", self.name));
            reply
        }
    }

    struct Deny;

    #[async_trait]
    impl Middleware for Deny {
        async fn handle(&self, _req: Request, _next: Next) -> Result<Reply> {
            Ok(Response::status(StatusCode::FORBIDDEN).into())
        }
    }

    fn endpoint(log: Log) -> Endpoint {
        Box::new(move |_req| {
            Box::pin(async move {
                log.lock().unwrap().push("handler".to_owned());
                Ok(Reply::Text("done".to_owned()))
            })
        })
    }

    fn request() -> Request {
        Request::builder(Method::Get, "/").build()
    }

    #[tokio::test]
    async fn layers_wrap_the_endpoint_in_order() {
        let log = Log::default();
        let pipeline = Pipeline::new(vec![
            Arc::new(Record { name: "m1", log: log.clone() }),
            Arc::new(Record { name: "m2", log: log.clone() }),
        ]);

        let reply = pipeline.run(request(), endpoint(log.clone())).await.unwrap();

        assert_eq!(reply, Reply::Text("done".to_owned()));
        assert_eq!(*log.lock().unwrap(), ["m1-before", "m2-before", "handler", "m2-after", "m1-after"]);
    }

    #[tokio::test]
    async fn a_layer_that_does_not_continue_short_circuits() {
        let log = Log::default();
        let pipeline = Pipeline::new(vec![
            Arc::new(Record { name: "m1", log: log.clone() }),
            Arc::new(Deny),
            Arc::new(Record { name: "m3", log: log.clone() }),
        ]);

        let reply = pipeline.run(request(), endpoint(log.clone())).await.unwrap();

        assert_eq!(reply.status(), StatusCode::FORBIDDEN);
        assert_eq!(*log.lock().unwrap(), ["m1-before", "m1-after"]);
    }

    #[tokio::test]
    async fn empty_pipeline_calls_the_endpoint() {
        let log = Log::default();
        Pipeline::default().run(request(), endpoint(log.clone())).await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["handler"]);
    }

    #[tokio::test]
    async fn closures_can_rewrite_the_reply() {
        let stamp = from_fn(|req, next: Next| async move {
            let mut res = next.run(req).await?.into_response();
            res.set_header("X-Stamp", "1");
            Ok::<_, crate::Error>(res)
        });
        let pipeline = Pipeline::new(vec![Arc::new(stamp)]);

        let res = pipeline.run(request(), endpoint(Log::default())).await.unwrap().into_response();
        assert_eq!(res.header("x-stamp"), Some("1"));
        assert_eq!(res.content(), b"done");
    }

    #[test]
    fn names_resolve_through_the_container() {
        let mut c = Container::new();
        c.middleware("deny", |_| Ok(Deny));

        let pipeline = Pipeline::resolve(&c, &["deny".to_owned()]).unwrap();
        assert_eq!(pipeline.len(), 1);

        assert!(matches!(
            Pipeline::resolve(&c, &["deny".to_owned(), "missing".to_owned()]),
            Err(ContainerError::NotInstantiable { target }) if target == "missing"
        ));
    }
}
