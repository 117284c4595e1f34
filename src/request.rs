//! Incoming HTTP request type.
//!
//! A [`Request`] is a plain value: everything the transport captured (method,
//! path, query, form body, files, cookies, headers, raw body, peer address)
//! plus the route parameters filled in once a route matches. Middleware
//! receives it by value and may change it before passing it on.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, HeaderName, HeaderValue};
use http::HeaderMap;
use http_body_util::BodyExt;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::method::Method;

const FORM: &str = "application/x-www-form-urlencoded";

/// A file uploaded with the request.
///
/// Multipart decoding belongs to the host; lintel only carries the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// An incoming HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query_string: String,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
    cookies: HashMap<String, String>,
    headers: HeaderMap,
    params: Vec<(String, String)>,
    body: Bytes,
    json: OnceLock<Option<Value>>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn builder(method: Method, path: &str) -> RequestBuilder {
        RequestBuilder::new(method, path)
    }

    /// Collects a hyper request into a [`Request`].
    ///
    /// The method is passed in already parsed; a method lintel does not know
    /// never gets this far. Fails with [`Error::Handler`] when the body
    /// cannot be read.
    pub async fn from_http<B>(req: http::Request<B>, method: Method, remote_addr: Option<SocketAddr>) -> Result<Self>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let body = body.collect().await.map_err(|e| Error::Handler(e.into()))?.to_bytes();

        let mut builder = RequestBuilder::new(method, parts.uri.path())
            .query_string(parts.uri.query().unwrap_or(""))
            .body(body);
        builder.headers = parts.headers;
        builder.remote_addr = remote_addr;
        Ok(builder.build())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn query_string(&self) -> &str { &self.query_string }

    pub fn is_method(&self, method: Method) -> bool {
        self.method == method
    }

    /// A query-string value.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// A form-body value.
    pub fn post(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    /// A form-body value, or the query-string value when the body has none.
    pub fn input(&self, key: &str) -> Option<&str> {
        self.post(key).or_else(|| self.query(key))
    }

    /// Query and form values merged; the form wins on conflicts.
    pub fn all(&self) -> HashMap<String, String> {
        let mut all = self.query.clone();
        all.extend(self.form.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    pub fn has(&self, key: &str) -> bool {
        self.form.contains_key(key) || self.query.contains_key(key)
    }

    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.files.get(key)
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    pub fn cookie(&self, key: &str) -> Option<&str> {
        self.cookies.get(key).map(String::as_str)
    }

    /// Case-insensitive header lookup: `X-Admin-Token`, `x-admin-token` and
    /// `X-ADMIN-TOKEN` all find the same header. Values that are not visible
    /// ASCII read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The token after a literal `Bearer ` prefix in `Authorization`.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    pub fn is_json(&self) -> bool {
        self.header(CONTENT_TYPE.as_str()).is_some_and(|ct| ct.contains("application/json"))
    }

    /// The body parsed as JSON, parsed on first use and kept. `None` when
    /// the body is not valid JSON.
    pub fn json(&self) -> Option<&Value> {
        self.json.get_or_init(|| serde_json::from_slice(&self.body).ok()).as_ref()
    }

    /// A top-level key of the JSON body.
    pub fn json_value(&self, key: &str) -> Option<&Value> {
        self.json().and_then(|v| v.get(key))
    }

    /// The peer address, `0.0.0.0` when the host did not supply one.
    pub fn ip(&self) -> String {
        self.remote_addr.map_or_else(|| "0.0.0.0".to_owned(), |addr| addr.ip().to_string())
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }

    /// A route parameter. For a route `/users/{id}`, `req.param("id")` on
    /// `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Route parameters in pattern order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    // ── Mutation (middleware) ────────────────────────────────────────────────

    pub(crate) fn set_params(&mut self, params: Vec<(String, String)>) {
        self.params = params;
    }

    /// Sets a header, replacing existing values. Invalid names or values are
    /// ignored.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Adds or replaces a form input value.
    pub fn merge_input(&mut self, key: &str, value: &str) -> &mut Self {
        self.form.insert(key.to_owned(), value.to_owned());
        self
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Assembles a [`Request`] from already-parsed parts. Used by the server, by
/// other hosts embedding lintel, and by tests.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    query_string: String,
    headers: HeaderMap,
    body: Bytes,
    files: HashMap<String, UploadedFile>,
    cookies: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl RequestBuilder {
    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_owned(),
            query_string: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            files: HashMap::new(),
            cookies: HashMap::new(),
            remote_addr: None,
        }
    }

    pub fn query_string(mut self, query: &str) -> Self {
        self.query_string = query.to_owned();
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// A JSON body with the matching content type.
    pub fn json(self, value: &Value) -> Self {
        self.header(CONTENT_TYPE.as_str(), "application/json")
            .body(value.to_string())
    }

    /// A form-encoded body with the matching content type.
    pub fn form(self, pairs: &[(&str, &str)]) -> Self {
        let encoded = serde_urlencoded::to_string(pairs).unwrap_or_default();
        self.header(CONTENT_TYPE.as_str(), FORM).body(encoded)
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_owned(), value.to_owned());
        self
    }

    pub fn file(mut self, field: &str, file: UploadedFile) -> Self {
        self.files.insert(field.to_owned(), file);
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn build(self) -> Request {
        let query = parse_pairs(&self.query_string);

        let is_form = self.headers.get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(FORM));
        let form = if is_form {
            parse_pairs(&String::from_utf8_lossy(&self.body))
        } else {
            HashMap::new()
        };

        let mut cookies = parse_cookies(&self.headers);
        cookies.extend(self.cookies);

        Request {
            method: self.method,
            path: self.path,
            query_string: self.query_string,
            query,
            form,
            files: self.files,
            cookies,
            headers: self.headers,
            params: Vec::new(),
            body: self.body,
            json: OnceLock::new(),
            remote_addr: self.remote_addr,
        }
    }
}

/// Later duplicates win, like most form parsers.
fn parse_pairs(encoded: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(encoded)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers.get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn input_prefers_body_over_query() {
        let req = Request::builder(Method::Post, "/submit")
            .query_string("name=query&page=3")
            .form(&[("name", "body")])
            .build();

        assert_eq!(req.input("name"), Some("body"));
        assert_eq!(req.input("page"), Some("3"));
        assert_eq!(req.input("missing"), None);
        assert_eq!(req.all().get("name").map(String::as_str), Some("body"));
        assert!(req.has("page"));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = Request::builder(Method::Get, "/")
            .header("x-admin-token", "abc")
            .build();

        assert_eq!(req.header("X-Admin-Token"), Some("abc"));
        assert_eq!(req.header("X-ADMIN-TOKEN"), Some("abc"));
    }

    #[test]
    fn bearer_token_requires_the_prefix() {
        let with = Request::builder(Method::Get, "/").header("Authorization", "Bearer t0k").build();
        let basic = Request::builder(Method::Get, "/").header("Authorization", "Basic dTpw").build();
        let none = Request::builder(Method::Get, "/").build();

        assert_eq!(with.bearer_token(), Some("t0k"));
        assert_eq!(basic.bearer_token(), None);
        assert_eq!(none.bearer_token(), None);
    }

    #[test]
    fn json_body_is_parsed_lazily() {
        let req = Request::builder(Method::Post, "/api")
            .json(&json!({ "name": "Ada" }))
            .build();

        assert!(req.is_json());
        assert_eq!(req.json_value("name"), Some(&json!("Ada")));
        assert!(Request::builder(Method::Post, "/").body("nope").build().json().is_none());
    }

    #[test]
    fn cookies_from_header_and_builder() {
        let req = Request::builder(Method::Get, "/")
            .header("Cookie", "theme=dark; lang=en")
            .cookie("session", "s1")
            .build();

        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("lang"), Some("en"));
        assert_eq!(req.cookie("session"), Some("s1"));
    }

    #[test]
    fn ip_ajax_and_files() {
        let req = Request::builder(Method::Post, "/upload")
            .remote_addr("10.0.0.7:5555".parse().unwrap())
            .header("X-Requested-With", "XMLHttpRequest")
            .file("avatar", UploadedFile {
                filename: "me.png".into(),
                content_type: Some("image/png".into()),
                data: Bytes::from_static(b"\x89PNG"),
            })
            .build();

        assert_eq!(req.ip(), "10.0.0.7");
        assert!(req.is_ajax());
        assert_eq!(req.file("avatar").map(|f| f.filename.as_str()), Some("me.png"));
        assert!(!req.has_file("cv"));
        assert_eq!(Request::builder(Method::Get, "/").build().ip(), "0.0.0.0");
    }

    #[tokio::test]
    async fn from_http_collects_the_body() {
        let http_req = http::Request::builder()
            .method("POST")
            .uri("/users?debug=1")
            .header("content-type", FORM)
            .body(http_body_util::Full::new(Bytes::from_static(b"name=alice")))
            .unwrap();

        let req = Request::from_http(http_req, Method::Post, None).await.unwrap();
        assert_eq!(req.path(), "/users");
        assert_eq!(req.query("debug"), Some("1"));
        assert_eq!(req.input("name"), Some("alice"));
    }
}
