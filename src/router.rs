//! The route table.
//!
//! Routes live in one `Vec` per HTTP method, in registration order. Lookup
//! walks that list and takes the **first** route whose pattern matches. There
//! is no specificity ranking: a `/users/{id}` registered before `/users/me`
//! shadows it. Register literal routes first.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::RouteError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::route::{IntoAction, Route};

/// Options for [`Router::group`].
#[derive(Debug, Clone, Default)]
pub struct Group {
    prefix: String,
    middleware: Vec<String>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepended to every pattern registered inside the group.
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_owned();
        self
    }

    /// Appended to every route registered inside the group, after the
    /// route's own middleware.
    pub fn middleware(mut self, id: impl Into<String>) -> Self {
        self.middleware.push(id.into());
        self
    }
}

/// A route that matched, with its placeholder values.
#[derive(Debug)]
pub struct Matched<'r> {
    pub route: &'r Route,
    pub params: Vec<(String, String)>,
}

/// The application router.
///
/// ```rust,no_run
/// use lintel::{Group, Path, Router};
///
/// async fn hi(Path(name): Path<String>) -> String { format!("Hello, {name}!") }
/// async fn dashboard() -> &'static str { "admin" }
///
/// let mut router = Router::new();
/// router.get("/hi/{name}", hi);
/// router.group(Group::new().prefix("/admin").middleware("admin"), |r| {
///     r.get("/dashboard", dashboard).middleware("trace");
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
    controllers: HashMap<(Cow<'static, str>, Cow<'static, str>), BoxedHandler>,
    prefix: String,
    middleware: Vec<String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route and returns it so middleware can be appended.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid route pattern (adjacent or
    /// duplicate placeholders, unbalanced braces). Route tables are built at
    /// startup; a malformed pattern is a programming error.
    pub fn add_route<M>(&mut self, method: Method, pattern: &str, action: impl IntoAction<M>) -> &mut Route {
        let full = format!("{}{pattern}", self.prefix);
        let route = Route::new(method, &full, action.into_action())
            .unwrap_or_else(|e| panic!("invalid route `{full}`: {e}"));

        debug!(%method, pattern = %full, action = %route.action(), "route registered");
        let routes = self.routes.entry(method).or_default();
        routes.push(route);
        let last = routes.len() - 1;
        &mut routes[last]
    }

    pub fn get<M>(&mut self, pattern: &str, action: impl IntoAction<M>) -> &mut Route {
        self.add_route(Method::Get, pattern, action)
    }

    pub fn post<M>(&mut self, pattern: &str, action: impl IntoAction<M>) -> &mut Route {
        self.add_route(Method::Post, pattern, action)
    }

    pub fn put<M>(&mut self, pattern: &str, action: impl IntoAction<M>) -> &mut Route {
        self.add_route(Method::Put, pattern, action)
    }

    pub fn patch<M>(&mut self, pattern: &str, action: impl IntoAction<M>) -> &mut Route {
        self.add_route(Method::Patch, pattern, action)
    }

    pub fn delete<M>(&mut self, pattern: &str, action: impl IntoAction<M>) -> &mut Route {
        self.add_route(Method::Delete, pattern, action)
    }

    /// Registers the same action for GET, POST, PUT, PATCH and DELETE.
    /// Middleware given to `configure` is applied to all five routes.
    pub fn any<M>(&mut self, pattern: &str, action: impl IntoAction<M>, configure: impl Fn(&mut Route)) {
        let action = action.into_action();
        for method in Method::ROUTABLE {
            configure(self.add_route(method, pattern, action.clone()));
        }
    }

    /// Registers routes inside `builder` with the group's prefix and
    /// middleware. Groups nest: prefixes and middleware concatenate, outer
    /// first. The surrounding prefix and middleware are restored afterwards.
    ///
    /// Group middleware lands after whatever the route declared itself, so
    /// `group(auth, |r| r.get(..).middleware("cors"))` runs `cors` outside
    /// `auth`.
    pub fn group(&mut self, group: Group, builder: impl FnOnce(&mut Router)) {
        let previous_prefix = self.prefix.clone();
        let previous_middleware = self.middleware.len();
        let registered: HashMap<Method, usize> =
            self.routes.iter().map(|(method, routes)| (*method, routes.len())).collect();

        self.prefix.push_str(&group.prefix);
        self.middleware.extend(group.middleware);
        trace!(prefix = %self.prefix, middleware = ?self.middleware, "entering route group");

        builder(self);

        // The innermost group sees the whole stack; outer groups skip routes
        // it already handled.
        for (method, routes) in &mut self.routes {
            let start = registered.get(method).copied().unwrap_or(0);
            for route in &mut routes[start..] {
                route.apply_group_middleware(&self.middleware);
            }
        }

        self.prefix = previous_prefix;
        self.middleware.truncate(previous_middleware);
    }

    /// Registers a controller method, addressable from routes as
    /// `"controller@method"`.
    ///
    /// Controller methods are ordinary handlers; the controller instance is
    /// usually their first argument, resolved from the container:
    ///
    /// ```rust,ignore
    /// impl HomeController {
    ///     async fn show(self: Arc<Self>, Path(id): Path<u64>) -> Json<Value> { .. }
    /// }
    ///
    /// router.controller("HomeController", "show", HomeController::show);
    /// router.get("/home/{id}", "HomeController@show");
    /// ```
    pub fn controller<H, Args>(
        &mut self,
        controller: impl Into<Cow<'static, str>>,
        method: impl Into<Cow<'static, str>>,
        handler: H,
    ) -> &mut Self
    where
        H: Handler<Args>,
    {
        let key = (controller.into(), method.into());
        debug!(controller = %key.0, method = %key.1, "controller method registered");
        self.controllers.insert(key, handler.into_boxed_handler());
        self
    }

    /// The handler behind a controller reference, if registered.
    pub(crate) fn controller_method(&self, controller: &str, method: &str) -> Option<BoxedHandler> {
        self.controllers
            .get(&(Cow::Borrowed(controller), Cow::Borrowed(method)))
            .cloned()
    }

    /// The current group prefix, empty outside groups.
    pub fn current_prefix(&self) -> &str {
        &self.prefix
    }

    /// The current group middleware, empty outside groups.
    pub fn current_middleware(&self) -> &[String] {
        &self.middleware
    }

    /// Routes registered for `method`, in registration order.
    pub fn routes(&self, method: Method) -> &[Route] {
        self.routes.get(&method).map_or(&[], Vec::as_slice)
    }

    /// Finds the first route for `method` whose pattern matches `path`.
    ///
    /// - the method has no routes at all → `MethodNotAllowed`
    /// - none of its routes match, but another method's do → `MethodNotAllowed`
    ///   listing those methods
    /// - nothing matches anywhere → `NotFound`
    pub fn lookup(&self, method: Method, path: &str) -> Result<Matched<'_>, RouteError> {
        let Some(routes) = self.routes.get(&method) else {
            trace!(%method, path, "no routes for method");
            return Err(RouteError::MethodNotAllowed {
                method,
                path: path.to_owned(),
                allowed: self.allowed_methods(path),
            });
        };

        for route in routes {
            if let Some(params) = route.matches(path) {
                trace!(%method, path, pattern = route.pattern(), "route matched");
                return Ok(Matched { route, params });
            }
        }

        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            Err(RouteError::NotFound { method, path: path.to_owned() })
        } else {
            Err(RouteError::MethodNotAllowed { method, path: path.to_owned(), allowed })
        }
    }

    fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut allowed: Vec<Method> = self.routes
            .iter()
            .filter(|(_, routes)| routes.iter().any(|r| r.matches(path).is_some()))
            .map(|(method, _)| *method)
            .collect();
        allowed.sort();
        allowed
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
