//! Minimal lintel example: JSON endpoints, a controller, grouped routes
//! behind middleware, and a service injected from the container.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/hi/Ada
//!   curl http://localhost:3000/posts/4/comments/9
//!   curl http://localhost:3000/api/visits                      # 401
//!   curl -H 'Authorization: Bearer abc' http://localhost:3000/api/visits
//!   curl -H 'X-Admin-Token: secret-admin-token' http://localhost:3000/admin/reset
//!   curl -X DELETE http://localhost:3000/hi/Ada                # 405

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lintel::services::Store;
use lintel::{App, Config, Container, ContainerError, Group, Injectable, Json, Path, Server};
use serde::Deserialize;
use serde_json::{Value, json};

#[tokio::main]
async fn main() -> lintel::Result<()> {
    tracing_subscriber::fmt::init();

    let app = App::builder(Config::default().with_env_overrides())
        .services(|c| {
            c.singleton(|_| Ok(Arc::new(MemoryStore::default()) as Arc<dyn Store>));
        })
        .routes(|r| {
            r.get("/hi/{name}", hi);
            r.get("/posts/{post}/comments/{comment}", "CommentController@show");
            r.controller("CommentController", "show", CommentController::show);

            r.group(Group::new().prefix("/api").middleware("trace"), |r| {
                r.get("/visits", visits).middleware("auth");
            });
            r.group(Group::new().prefix("/admin").middleware("admin"), |r| {
                r.post("/reset", reset);
                r.get("/reset", reset);
            });
        })
        .build();

    Server::from_config(&app)?.serve(app).await
}

// GET /hi/{name}
async fn hi(Path(name): Path<String>) -> Json<Value> {
    Json(json!({ "success": true, "message": format!("Hello, {name}!") }))
}

// GET /api/visits: counts calls in the shared store.
async fn visits(store: Arc<Arc<dyn Store>>) -> Value {
    let count = store.get_or("visits", json!(0)).as_u64().unwrap_or(0) + 1;
    store.set("visits", json!(count), None);
    json!({ "visits": count })
}

// /admin/reset
async fn reset(store: Arc<Arc<dyn Store>>) -> Value {
    json!({ "reset": store.forget("visits") })
}

// ── Controller ────────────────────────────────────────────────────────────────

struct CommentController {
    greeting: String,
}

impl Injectable for CommentController {
    fn build(c: &Container) -> Result<Self, ContainerError> {
        let greeting = c.scalar("CommentController", "greeting", Some("Comment".to_owned()))?;
        Ok(Self { greeting })
    }
}

#[derive(Deserialize)]
struct CommentRef {
    post: u64,
    comment: u64,
}

impl CommentController {
    async fn show(self: Arc<Self>, Path(at): Path<CommentRef>) -> Json<Value> {
        Json(json!({ "title": format!("{} {} on post {}", self.greeting, at.comment, at.post) }))
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Process-local store. Expiry is ignored.
#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value, _ttl: Option<Duration>) -> bool {
        self.entries.lock().map(|mut e| e.insert(key.to_owned(), value)).is_ok()
    }

    fn forget(&self, key: &str) -> bool {
        self.entries.lock().map(|mut e| e.remove(key).is_some()).unwrap_or(false)
    }
}
