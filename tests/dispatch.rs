use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;
use lintel::middleware::{Middleware, Next, from_fn};
use lintel::{
    App, AppBuilder, Config, Container, ContainerError, Group, Injectable, Json, Method, Path, Reply, Request,
    Response, Result,
};
use serde_json::{Value, json};

type Log = Arc<Mutex<Vec<String>>>;

fn get(path: &str) -> Request {
    Request::builder(Method::Get, path).build()
}

fn recorder(name: &'static str, log: Log) -> impl Middleware {
    from_fn(move |req, next: Next| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(format!("{name}-before"));
            let reply = next.run(req).await;
            log.lock().unwrap().push(format!("{name}-after"));
            reply
        }
    })
}

struct Forbid;

#[async_trait]
impl Middleware for Forbid {
    async fn handle(&self, _req: Request, _next: Next) -> Result<Reply> {
        Ok(Response::json(&json!({ "error": "Forbidden" })).with_status(StatusCode::FORBIDDEN).into())
    }
}

async fn hi(Path(name): Path<String>) -> Json<Value> {
    Json(json!({ "success": true, "message": format!("Hello, {name}!") }))
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn greets_by_path_parameter() {
    let app = AppBuilder::default().routes(|r| {
        r.get("/hi/{name}", hi);
    }).build();

    let res = app.dispatch(get("/hi/Ada")).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(res.json_body(), Some(json!({ "success": true, "message": "Hello, Ada!" })));
}

#[tokio::test]
async fn wrong_method_is_405_and_unknown_path_is_404() {
    let app = AppBuilder::default().routes(|r| {
        r.get("/missing", || async { "here" });
        r.post("/items", || async { "created" });
    }).build();

    let res = app.dispatch(Request::builder(Method::Delete, "/missing").build()).await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.header("allow"), Some("GET"));

    let res = app.dispatch(Request::builder(Method::Post, "/missing").build()).await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);

    let res = app.dispatch(get("/nowhere")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.json_body().unwrap()["error"], "Not Found");
}

#[tokio::test]
async fn earlier_routes_shadow_later_ones() {
    let app = AppBuilder::default().routes(|r| {
        r.get("/users/{id}", |Path(id): Path<String>| async move { format!("user {id}") });
        r.get("/users/me", || async { "me" });
    }).build();

    assert_eq!(app.dispatch(get("/users/me")).await.content(), b"user me");
}

// ── Middleware ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn middleware_wraps_the_handler_route_first_then_group() {
    let log = Log::default();
    let handler_log = log.clone();

    let app = AppBuilder::default()
        .services(|c| {
            c.middleware_instance("m1", recorder("m1", log.clone()));
            c.middleware_instance("m2", recorder("m2", log.clone()));
        })
        .routes(|r| {
            r.group(Group::new().middleware("m1"), |r| {
                r.get("/x", move || {
                    let log = handler_log.clone();
                    async move {
                        log.lock().unwrap().push("handler".to_owned());
                        "done"
                    }
                })
                .middleware("m2");
            });
        })
        .build();

    let res = app.dispatch(get("/x")).await;

    assert_eq!(res.content(), b"done");
    assert_eq!(*log.lock().unwrap(), ["m2-before", "m1-before", "handler", "m1-after", "m2-after"]);
}

#[tokio::test]
async fn a_refusing_middleware_skips_the_rest() {
    let log = Log::default();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = AppBuilder::default()
        .services(|c| {
            c.middleware_instance("m1", recorder("m1", log.clone()));
            c.middleware_instance("m3", recorder("m3", log.clone()));
            c.middleware("forbid", |_| Ok(Forbid));
        })
        .routes(|r| {
            r.get("/x", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "unreachable" }
            })
            .middlewares(["m1", "forbid", "m3"]);
        })
        .build();

    let res = app.dispatch(get("/x")).await;

    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(*log.lock().unwrap(), ["m1-before", "m1-after"]);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn middleware_can_rewrite_the_request_before_the_handler() {
    let app = AppBuilder::default()
        .services(|c| {
            c.middleware_instance("stamp", from_fn(|mut req: Request, next: Next| async move {
                req.set_header("X-User", "ada").merge_input("role", "admin");
                next.run(req).await
            }));
        })
        .routes(|r| {
            r.get("/whoami", |req: Request| async move {
                format!("{} {}", req.header("x-user").unwrap_or("-"), req.input("role").unwrap_or("-"))
            })
            .middleware("stamp");
        })
        .build();

    assert_eq!(app.dispatch(get("/whoami")).await.content(), b"ada admin");
}

#[tokio::test]
async fn missing_bearer_token_is_401_without_calling_the_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let app = AppBuilder::default().routes(|r| {
        r.group(Group::new().prefix("/api").middleware("auth"), |r| {
            r.get("/me", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "me" }
            });
        });
    }).build();

    let res = app.dispatch(get("/api/me")).await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.json_body(), Some(json!({ "error": "Unauthorized" })));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let authed = Request::builder(Method::Get, "/api/me").header("Authorization", "Bearer abc").build();
    assert_eq!(app.dispatch(authed).await.status_code(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn route_cors_wraps_a_group_auth_refusal() {
    let app = AppBuilder::default().routes(|r| {
        r.group(Group::new().middleware("auth"), |r| {
            r.get("/x", || async { "secret" }).middleware("cors");
        });
    }).build();

    let res = app.dispatch(get("/x")).await;

    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.header("access-control-allow-origin"), Some("*"));
}

#[tokio::test]
async fn admin_token_comes_from_config() {
    let config = Config { admin_token: "t0k".to_owned(), ..Config::default() };
    let app = App::builder(config).routes(|r| {
        r.get("/admin", || async { "welcome" }).middleware("admin");
    }).build();

    let ok = Request::builder(Method::Get, "/admin").header("X-Admin-Token", "t0k").build();
    assert_eq!(app.dispatch(ok).await.status_code(), StatusCode::OK);

    let default_token = Request::builder(Method::Get, "/admin")
        .header("X-Admin-Token", "secret-admin-token")
        .build();
    assert_eq!(app.dispatch(default_token).await.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cors_headers_are_added_on_the_way_out() {
    let app = AppBuilder::default().routes(|r| {
        r.post("/items", || async { StatusCode::CREATED }).middleware("cors");
    }).build();

    let res = app.dispatch(Request::builder(Method::Post, "/items").build()).await;

    assert_eq!(res.status_code(), StatusCode::CREATED);
    assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    assert!(res.header("access-control-allow-methods").is_some());
}

#[tokio::test]
async fn unregistered_middleware_is_a_server_error() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let config = Config { debug: true, ..Config::default() };
    let app = App::builder(config).routes(|r| {
        r.get("/x", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { "x" }
        })
        .middleware("ghost");
    }).build();

    let res = app.dispatch(get("/x")).await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json_body().unwrap()["kind"], "not_instantiable");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

// ── Actions and injection ─────────────────────────────────────────────────────

struct Greeter {
    greeting: String,
}

impl Injectable for Greeter {
    fn build(c: &Container) -> std::result::Result<Self, ContainerError> {
        Ok(Self { greeting: c.scalar("Greeter", "greeting", Some("Hello".to_owned()))? })
    }
}

impl Greeter {
    async fn greet(self: Arc<Self>, Path(name): Path<String>) -> String {
        format!("{}, {name}!", self.greeting)
    }
}

#[tokio::test]
async fn controller_references_resolve_through_the_registry() {
    let app = AppBuilder::default()
        .services(|c| {
            c.instance_named("greeting", "Howdy".to_owned());
        })
        .routes(|r| {
            r.controller("Greeter", "greet", Greeter::greet);
            r.get("/greet/{name}", "Greeter@greet");
        })
        .build();

    let res = app.dispatch(get("/greet/Ada")).await;
    assert_eq!(res.content(), b"Howdy, Ada!");
}

#[tokio::test]
async fn unknown_controller_method_is_an_invalid_action() {
    let config = Config { debug: true, ..Config::default() };
    let app = App::builder(config).routes(|r| {
        r.get("/broken", "Missing@index");
    }).build();

    let res = app.dispatch(get("/broken")).await;

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json_body().unwrap()["kind"], "invalid_action");
}

#[tokio::test]
async fn uncoercible_path_parameter_fails_the_call() {
    let app = AppBuilder::default().routes(|r| {
        r.get("/items/{id}", |Path(id): Path<u32>| async move { format!("item {id}") });
    }).build();

    assert_eq!(app.dispatch(get("/items/7")).await.content(), b"item 7");

    let res = app.dispatch(get("/items/seven")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json_body(), Some(json!({ "error": "Internal Server Error", "status": 500 })));
}

// ── Normalization ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn results_are_normalized_once() {
    let app = AppBuilder::default().routes(|r| {
        r.get("/data", || async { json!({ "a": 1 }) });
        r.get("/text", || async { String::from("plain") });
        r.get("/made", || async { Response::text("made").with_status(StatusCode::ACCEPTED) });
        r.get("/empty", || async {});
    }).build();

    let data = app.dispatch(get("/data")).await;
    assert_eq!(data.status_code(), StatusCode::OK);
    assert_eq!(data.header("content-type"), Some("application/json"));
    assert_eq!(data.json_body(), Some(json!({ "a": 1 })));

    let text = app.dispatch(get("/text")).await;
    assert_eq!(text.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(text.content(), b"plain");

    let made = app.dispatch(get("/made")).await;
    assert_eq!(made.status_code(), StatusCode::ACCEPTED);
    assert_eq!(made.content(), b"made");

    let empty = app.dispatch(get("/empty")).await;
    assert_eq!(empty.status_code(), StatusCode::OK);
    assert!(empty.content().is_empty());
}
