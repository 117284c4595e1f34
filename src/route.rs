//! A single route: method, URI pattern, action, middleware.
//!
//! Patterns are literal text with `{name}` placeholders. Each placeholder
//! matches one non-empty path segment (`[^/]+`); literal text is matched
//! exactly, and the whole path has to match:
//!
//! ```text
//! /posts/{post}/comments/{comment}   →   ^/posts/([^/]+)/comments/([^/]+)$
//! ```

use std::borrow::Cow;
use std::fmt;

use regex::Regex;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;

// ── Pattern compilation ───────────────────────────────────────────────────────

/// Why a URI pattern was rejected at registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("placeholder `{{{0}}}` appears more than once")]
    DuplicatePlaceholder(String),

    /// `{a}{b}`: nothing separates the two captures, so the split between
    /// them would be arbitrary.
    #[error("placeholders `{{{0}}}` and `{{{1}}}` are adjacent")]
    AdjacentPlaceholders(String, String),

    #[error("invalid placeholder at byte {0}: names are [A-Za-z0-9_]+ inside braces")]
    InvalidPlaceholder(usize),
}

fn compile(pattern: &str) -> Result<(Regex, Vec<String>), PatternError> {
    let mut regex = String::from("^");
    let mut names: Vec<String> = Vec::new();
    // Whether the last thing emitted was a capture, with no literal since.
    let mut after_capture = false;
    let mut rest = pattern;

    while let Some(open) = rest.find(['{', '}']) {
        let offset = pattern.len() - rest.len();
        if rest.as_bytes()[open] == b'}' {
            return Err(PatternError::InvalidPlaceholder(offset + open));
        }

        let literal = &rest[..open];
        if !literal.is_empty() {
            regex.push_str(&regex::escape(literal));
            after_capture = false;
        }

        let close = rest[open..].find('}').ok_or(PatternError::InvalidPlaceholder(offset + open))?;
        let name = &rest[open + 1..open + close];
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(PatternError::InvalidPlaceholder(offset + open));
        }
        if names.iter().any(|n| n == name) {
            return Err(PatternError::DuplicatePlaceholder(name.to_owned()));
        }
        if after_capture {
            let previous = names.last().cloned().unwrap_or_default();
            return Err(PatternError::AdjacentPlaceholders(previous, name.to_owned()));
        }

        regex.push_str("([^/]+)");
        names.push(name.to_owned());
        after_capture = true;
        rest = &rest[open + close + 1..];
    }

    regex.push_str(&regex::escape(rest));
    regex.push('$');

    // Escaped literals plus fixed capture groups always form a valid regex.
    let regex = Regex::new(&regex).map_err(|_| PatternError::InvalidPlaceholder(0))?;
    Ok((regex, names))
}

// ── Action ────────────────────────────────────────────────────────────────────

/// What a route runs once the middleware let the request through.
#[derive(Clone)]
pub enum Action {
    /// A handler function, type-erased.
    Handler(BoxedHandler),
    /// A method registered on the router's controller table under
    /// `controller` / `method`. Looked up per request; a missing entry is an
    /// `InvalidAction` error.
    Controller {
        controller: Cow<'static, str>,
        method: Cow<'static, str>,
    },
}

impl Action {
    pub fn handler<H: Handler<Args>, Args>(handler: H) -> Self {
        Self::Handler(handler.into_boxed_handler())
    }

    pub fn controller(controller: impl Into<Cow<'static, str>>, method: impl Into<Cow<'static, str>>) -> Self {
        Self::Controller { controller: controller.into(), method: method.into() }
    }

    /// Parses the `"Controller@method"` shorthand. A string without `@`
    /// becomes a controller reference with an empty method, which fails at
    /// dispatch.
    pub fn parse(reference: &'static str) -> Self {
        match reference.split_once('@') {
            Some((controller, method)) => Self::controller(controller, method),
            None => Self::controller(reference, ""),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Action::Handler(..)"),
            Self::Controller { controller, method } => write!(f, "Action::Controller({controller}@{method})"),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("<handler>"),
            Self::Controller { controller, method } => write!(f, "{controller}@{method}"),
        }
    }
}

/// Anything a route can be registered with: a handler function, an
/// [`Action`], or a `"Controller@method"` string.
///
/// `M` is a marker that keeps the three impls apart.
pub trait IntoAction<M> {
    fn into_action(self) -> Action;
}

#[doc(hidden)]
pub struct ViaHandler<Args>(std::marker::PhantomData<Args>);

#[doc(hidden)]
pub struct ViaReference;

#[doc(hidden)]
pub struct ViaAction;

impl<H: Handler<Args>, Args> IntoAction<ViaHandler<Args>> for H {
    fn into_action(self) -> Action {
        Action::handler(self)
    }
}

impl IntoAction<ViaReference> for &'static str {
    fn into_action(self) -> Action {
        Action::parse(self)
    }
}

impl IntoAction<ViaAction> for Action {
    fn into_action(self) -> Action {
        self
    }
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    pattern: String,
    regex: Regex,
    names: Vec<String>,
    action: Action,
    middleware: Vec<String>,
    grouped: bool,
}

impl Route {
    pub fn new(method: Method, pattern: &str, action: Action) -> Result<Self, PatternError> {
        let (regex, names) = compile(pattern)?;
        Ok(Self {
            method,
            pattern: pattern.to_owned(),
            regex,
            names,
            action,
            middleware: Vec::new(),
            grouped: false,
        })
    }

    /// Appends a middleware identifier. Returns `self` for chaining.
    pub fn middleware(&mut self, id: impl Into<String>) -> &mut Self {
        self.middleware.push(id.into());
        self
    }

    /// Appends several middleware identifiers, in order.
    pub fn middlewares<I, S>(&mut self, ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Appends the enclosing groups' middleware once; later calls are no-ops.
    pub(crate) fn apply_group_middleware(&mut self, ids: &[String]) {
        if !self.grouped {
            self.middleware.extend_from_slice(ids);
            self.grouped = true;
        }
    }

    pub fn method(&self) -> Method { self.method }
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn action(&self) -> &Action { &self.action }
    pub fn middleware_ids(&self) -> &[String] { &self.middleware }

    /// Placeholder names in pattern order.
    pub fn placeholders(&self) -> &[String] { &self.names }

    /// Matches the whole of `path`, returning the placeholder values in
    /// pattern order.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.names.iter()
                .enumerate()
                .filter_map(|(i, name)| Some((name.clone(), captures.get(i + 1)?.as_str().to_owned())))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(pattern: &str) -> Route {
        Route::new(Method::Get, pattern, Action::controller("C", "m")).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn placeholders_capture_one_segment() {
        let r = route("/posts/{post}/comments/{comment}");
        assert_eq!(r.placeholders(), ["post", "comment"]);
        assert_eq!(r.matches("/posts/4/comments/9"), Some(params(&[("post", "4"), ("comment", "9")])));
        assert_eq!(r.matches("/posts/4/comments"), None);
        assert_eq!(r.matches("/posts/a/b/comments/9"), None);
    }

    #[test]
    fn matching_is_anchored() {
        let r = route("/users");
        assert_eq!(r.matches("/users"), Some(vec![]));
        assert_eq!(r.matches("/users/1"), None);
        assert_eq!(r.matches("/api/users"), None);
    }

    #[test]
    fn trailing_slash_is_significant() {
        let r = route("/users/");
        assert!(r.matches("/users/").is_some());
        assert!(r.matches("/users").is_none());
    }

    #[test]
    fn literals_are_not_regex() {
        let r = route("/files/{name}.json");
        assert_eq!(r.matches("/files/a.json"), Some(params(&[("name", "a")])));
        assert_eq!(r.matches("/files/axjson"), None);
    }

    #[test]
    fn adjacent_and_duplicate_placeholders_are_rejected() {
        let err = |p| Route::new(Method::Get, p, Action::controller("C", "m")).unwrap_err();

        assert_eq!(err("/{a}{b}"), PatternError::AdjacentPlaceholders("a".into(), "b".into()));
        assert_eq!(err("/{id}/x/{id}"), PatternError::DuplicatePlaceholder("id".into()));
        assert!(matches!(err("/{bad-name}"), PatternError::InvalidPlaceholder(1)));
        assert!(matches!(err("/{open"), PatternError::InvalidPlaceholder(_)));
        assert!(matches!(err("/close}"), PatternError::InvalidPlaceholder(_)));
    }

    #[test]
    fn controller_references_parse() {
        assert_eq!(Action::parse("HomeController@show").to_string(), "HomeController@show");
        assert_eq!(Action::parse("HomeController").to_string(), "HomeController@");
    }
}
