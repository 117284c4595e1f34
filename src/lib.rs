//! # lintel
//!
//! A small request-processing kernel: a first-match route table, named
//! middleware pipelines, and a dependency container that builds both the
//! middleware and the handlers' arguments.
//!
//! ## The flow
//!
//! ```text
//! Request ─> Router::lookup ─> Route { params, middleware ids, action }
//!         ─> Container builds every middleware by name
//!         ─> m1 ─> m2 ─> action(injected args) ─> m2 ─> m1
//!         ─> Reply normalized into a Response
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use lintel::{App, Config, Group, Json, Path, Server};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> lintel::Result<()> {
//!     let app = App::builder(Config::default().with_env_overrides())
//!         .routes(|r| {
//!             r.get("/hi/{name}", hi);
//!             r.group(Group::new().prefix("/admin").middleware("admin"), |r| {
//!                 r.get("/stats", stats).middleware("trace");
//!             });
//!         })
//!         .build();
//!
//!     Server::from_config(&app)?.serve(app).await
//! }
//!
//! async fn hi(Path(name): Path<String>) -> Json<Value> {
//!     Json(json!({ "success": true, "message": format!("Hello, {name}!") }))
//! }
//!
//! async fn stats() -> &'static str {
//!     "all good"
//! }
//! ```
//!
//! ## Routing is first-match
//!
//! Routes are tried in registration order and the first match wins. A
//! parameterized route registered before a literal one shadows it.
//!
//! ## Services
//!
//! Anything that implements [`Injectable`] can be a handler argument
//! (`Arc<T>`), and the container builds its own dependencies in
//! [`Injectable::build`]. Storage, views and error pages are reached through
//! the traits in [`services`].

mod app;
mod config;
mod container;
mod error;
mod handler;
mod inject;
mod method;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod middleware;
pub mod services;

pub use app::{App, AppBuilder};
pub use config::{Config, CorsConfig, MaintenanceConfig};
pub use container::{Container, Injectable, Key};
pub use error::{ContainerError, Error, Result, RouteError};
pub use handler::{BoxFuture, Handler};
pub use inject::{CallContext, FromCall, Params, Path, Query};
pub use method::{Method, UnknownMethod};
pub use request::{Request, RequestBuilder, UploadedFile};
pub use response::{CookieOptions, IntoReply, Json, Reply, Response};
pub use route::{Action, IntoAction, PatternError, Route};
pub use router::{Group, Matched, Router};
pub use server::Server;
