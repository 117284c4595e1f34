//! Handler argument injection.
//!
//! Every argument of a route handler implements [`FromCall`] and is produced
//! from the [`CallContext`] right before the call:
//!
//! | Argument type | Comes from |
//! |---|---|
//! | [`Request`] | the request itself |
//! | [`Path<T>`] | route parameters, matched to `T`'s fields by name |
//! | [`Params`] | all route parameters |
//! | [`Query<T>`] | the query string |
//! | [`Json<T>`] | the JSON body |
//! | `Arc<T>` where `T: Injectable` | the [`Container`] |
//! | `Option<A>` | `A`, or `None` when `A` cannot be produced |
//!
//! Names win over types: the request and its route parameters are looked at
//! first, the container second, and `Option` supplies the default last.
//! Anything that cannot be produced fails the call with
//! [`ContainerError::UnresolvableParameter`].

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::container::{Container, Injectable};
use crate::error::{ContainerError, Result};
use crate::handler::{BoxFuture, Handler};
use crate::request::Request;
use crate::response::{Json, Reply};

/// Everything a handler call may draw its arguments from.
pub struct CallContext {
    container: Arc<Container>,
    request: Request,
}

impl CallContext {
    pub fn new(container: Arc<Container>, request: Request) -> Self {
        Self { container, request }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}

/// Produces one handler argument from a [`CallContext`].
pub trait FromCall: Sized + Send + 'static {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError>;
}

impl Container {
    /// Calls `handler`, injecting each of its arguments.
    ///
    /// The request and its route parameters act as the named overrides; the
    /// remaining arguments are resolved from this container.
    pub fn call<H, Args>(self: &Arc<Self>, handler: H, request: Request) -> BoxFuture<Result<Reply>>
    where
        H: Handler<Args>,
    {
        handler.into_boxed_handler().call(CallContext::new(Arc::clone(self), request))
    }
}

// ── Extractors ────────────────────────────────────────────────────────────────

/// Route parameters deserialized into `T`.
///
/// A struct receives parameters by field name. A single-parameter route also
/// accepts a scalar `T`, and tuples receive the parameters in pattern order.
///
/// ```rust
/// use lintel::Path;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Comment { post: u64, comment: u64 }
///
/// async fn show(Path(c): Path<Comment>) -> String {
///     format!("{}/{}", c.post, c.comment)
/// }
///
/// async fn hello(Path(name): Path<String>) -> String {
///     format!("Hello, {name}!")
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path<T>(pub T);

impl<T: DeserializeOwned + Send + 'static> FromCall for Path<T> {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError> {
        let params = cx.request.params();

        // By name. The urlencoded deserializer parses numbers and booleans
        // out of the string values.
        let encoded = serde_urlencoded::to_string(params).unwrap_or_default();
        let by_name_err = match serde_urlencoded::from_str::<T>(&encoded) {
            Ok(v) => return Ok(Self(v)),
            Err(e) => e,
        };

        let positional = match params {
            [(_, single)] => serde_json::from_value(Value::String(single.clone()))
                .or_else(|_| serde_json::from_str(single)),
            _ => {
                let strings = params.iter().map(|(_, v)| Value::String(v.clone())).collect();
                let loose = params.iter().map(|(_, v)| loose_value(v)).collect();
                serde_json::from_value(Value::Array(strings))
                    .or_else(|_| serde_json::from_value(Value::Array(loose)))
            }
        };
        positional.map(Self).map_err(|_| unresolvable::<T>(by_name_err))
    }
}

fn loose_value(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(|v| v.is_number() || v.is_boolean())
        .unwrap_or_else(|| Value::String(raw.to_owned()))
}

/// All route parameters, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(pub Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

impl FromCall for Params {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError> {
        Ok(Self(cx.request.params().to_vec()))
    }
}

/// The query string deserialized into `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<T>(pub T);

impl<T: DeserializeOwned + Send + 'static> FromCall for Query<T> {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError> {
        serde_urlencoded::from_str(cx.request.query_string())
            .map(Self)
            .map_err(unresolvable::<T>)
    }
}

impl<T: DeserializeOwned + Send + 'static> FromCall for Json<T> {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError> {
        serde_json::from_slice(cx.request.body())
            .map(Json)
            .map_err(unresolvable::<T>)
    }
}

impl FromCall for Request {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError> {
        Ok(cx.request.clone())
    }
}

impl FromCall for HashMap<String, String> {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError> {
        Ok(cx.request.all())
    }
}

impl<T: Injectable> FromCall for Arc<T> {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError> {
        cx.container.resolve::<T>()
    }
}

impl<A: FromCall> FromCall for Option<A> {
    fn from_call(cx: &CallContext) -> Result<Self, ContainerError> {
        Ok(A::from_call(cx).ok())
    }
}

fn unresolvable<T>(err: impl std::fmt::Display) -> ContainerError {
    ContainerError::UnresolvableParameter {
        parameter: type_name::<T>().to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::method::Method;

    fn cx(path: &str, params: &[(&str, &str)]) -> CallContext {
        let mut req = Request::builder(Method::Get, path).query_string("page=2&sort=name").build();
        req.set_params(params.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect());
        CallContext::new(Arc::new(Container::new()), req)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct PostComment {
        post: u32,
        comment: String,
    }

    #[test]
    fn path_struct_fields_match_by_name() {
        let cx = cx("/posts/4/comments/x", &[("post", "4"), ("comment", "x")]);
        let Path(pc) = Path::<PostComment>::from_call(&cx).unwrap();
        assert_eq!(pc, PostComment { post: 4, comment: "x".into() });
    }

    #[test]
    fn path_scalar_and_tuple() {
        let cx1 = cx("/hi/Ada", &[("name", "Ada")]);
        assert_eq!(Path::<String>::from_call(&cx1).unwrap().0, "Ada");

        let cx2 = cx("/users/42", &[("id", "42")]);
        assert_eq!(Path::<u64>::from_call(&cx2).unwrap().0, 42);

        let cx3 = cx("/a/b", &[("x", "a"), ("y", "b")]);
        assert_eq!(Path::<(String, String)>::from_call(&cx3).unwrap().0, ("a".into(), "b".into()));
    }

    #[test]
    fn missing_path_field_is_unresolvable() {
        let cx = cx("/hi/Ada", &[("name", "Ada")]);
        assert!(matches!(
            Path::<PostComment>::from_call(&cx),
            Err(ContainerError::UnresolvableParameter { .. })
        ));
    }

    #[test]
    fn query_and_option_defaults() {
        #[derive(Deserialize)]
        struct Page {
            page: u32,
        }
        #[derive(Deserialize, Debug)]
        struct Missing {
            _q: String,
        }

        let cx = cx("/", &[]);
        assert_eq!(Query::<Page>::from_call(&cx).unwrap().0.page, 2);
        assert!(Option::<Query<Missing>>::from_call(&cx).unwrap().is_none());
    }
}
