//! Outgoing HTTP response type, the [`Reply`] a pipeline produces, and the
//! [`IntoReply`] conversion trait.
//!
//! Handlers may return a full [`Response`], or something simpler: a string,
//! a `serde_json::Value`, a [`Json`] wrapper, a status code. Whatever comes
//! back travels through the middleware stack as a [`Reply`] and is turned
//! into a `Response` exactly once, after the whole pipeline has unwound.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::error;

use crate::error::{Error, Result};
use crate::services::ViewRenderer;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";
const HTML: &str = "text/html; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use lintel::Response;
///
/// Response::json(&serde_json::json!({ "id": 1 }));
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::redirect("/login");
///
/// let mut res = Response::make("<h1>hi</h1>");
/// res.set_status_code(StatusCode::CREATED)
///    .set_header("Location", "/users/42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub(crate) body: Vec<u8>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Default for Response {
    fn default() -> Self {
        Self { body: Vec::new(), headers: Vec::new(), status: StatusCode::OK }
    }
}

impl Response {
    /// `200 OK` with a raw body and no content type.
    pub fn make(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into(), ..Self::default() }
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_type(TEXT, body.into().into_bytes())
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::with_type(HTML, body.into().into_bytes())
    }

    /// `200 OK`, `application/json`, the payload serialized with serde_json.
    ///
    /// A payload that fails to serialize (a map with non-string keys, a
    /// failing `Serialize` impl) yields an empty `500`.
    pub fn json<T: Serialize + ?Sized>(data: &T) -> Self {
        match serde_json::to_vec(data) {
            Ok(body) => Self::with_type(JSON, body),
            Err(e) => {
                error!("response serialization failed: {e}");
                Self::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, ..Self::default() }
    }

    /// `302 Found` pointing at `url`.
    pub fn redirect(url: &str) -> Self {
        Self::redirect_with(url, StatusCode::FOUND)
    }

    /// Redirect with an explicit 3xx status.
    pub fn redirect_with(url: &str, code: StatusCode) -> Self {
        Self::status(code).with_header("Location", url)
    }

    /// Renders `view` with `data` through `renderer` into an HTML response.
    pub fn view(renderer: &dyn ViewRenderer, view: &str, data: &Value, code: StatusCode) -> Result<Self> {
        let body = renderer.render(view, data)?;
        Ok(Self::with_type(HTML, body).with_status(code))
    }

    fn with_type(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            body,
            headers: vec![("Content-Type".to_owned(), content_type.to_owned())],
            status: StatusCode::OK,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn content(&self) -> &[u8] {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup; the first value wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    pub fn set_status_code(&mut self, code: StatusCode) -> &mut Self {
        self.status = code;
        self
    }

    /// Sets a header, replacing every existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Adds a header without touching existing values (`Set-Cookie`).
    pub fn append_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn set_content(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Owned form of [`set_status_code`](Self::set_status_code), for chaining
    /// on a freshly built response.
    pub fn with_status(mut self, code: StatusCode) -> Self {
        self.set_status_code(code);
        self
    }

    /// Owned form of [`set_header`](Self::set_header).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Appends a `Set-Cookie` header.
    pub fn with_cookie(mut self, name: &str, value: &str, options: &CookieOptions) -> Self {
        self.append_header("Set-Cookie", &options.render(name, value));
        self
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Writes the response as HTTP/1.1: status line, headers, body.
    ///
    /// Takes `self` by value, so a response can only be sent once.
    pub async fn send<W: AsyncWrite + Unpin>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or(""),
            ).as_bytes(),
        ).await?;
        writer.write_all(
            format!("content-length: {}\r\n", self.body.len()).as_bytes(),
        ).await?;
        // The body length is authoritative; a stored content-length is dropped.
        for (name, value) in self.headers.iter().filter(|(k, _)| !k.eq_ignore_ascii_case("content-length")) {
            writer.write_all(format!("{name}: {value}\r\n").as_bytes()).await?;
        }
        writer.write_all(b"\r\n").await?;
        writer.write_all(&self.body).await?;
        writer.flush().await
    }

    /// Converts into the `http` type hyper serves. Header pairs that are not
    /// valid HTTP are dropped with an error log.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        for (name, value) in self.headers {
            match (
                http::HeaderName::from_bytes(name.as_bytes()),
                http::HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => error!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

// ── Cookies ───────────────────────────────────────────────────────────────────

/// Attributes of a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub max_age: Option<u64>,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            path: "/".to_owned(),
            domain: None,
            secure: false,
            http_only: true,
            same_site: Some("Lax".to_owned()),
        }
    }
}

impl CookieOptions {
    fn render(&self, name: &str, value: &str) -> String {
        let mut out = format!("{name}={value}; Path={}", self.path);
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = &self.same_site {
            out.push_str(&format!("; SameSite={same_site}"));
        }
        out
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// What a handler, and therefore the pipeline, produces before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A finished response, passed through untouched.
    Response(Response),
    /// Structured data, serialized as a JSON `200`.
    Json(Value),
    /// Anything else, sent as a plain `200`.
    Text(String),
}

impl Reply {
    /// The status the normalized response will carry.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Response(res) => res.status,
            Self::Json(_) | Self::Text(_) => StatusCode::OK,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            Self::Response(res) => res,
            Self::Json(value) => Response::json(&value),
            Self::Text(text) => Response::text(text),
        }
    }
}

impl From<Response> for Reply {
    fn from(res: Response) -> Self {
        Self::Response(res)
    }
}

// ── Json ──────────────────────────────────────────────────────────────────────

/// Serializable data as a handler result, or a JSON request body as a handler
/// argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into a [`Reply`].
///
/// `Result<T, E>` is accepted too, so handlers can use `?`; the error side
/// aborts the pipeline and is turned into an error page at the dispatch
/// boundary.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply> { Ok(self) }
}

impl IntoReply for Response {
    fn into_reply(self) -> Result<Reply> { Ok(Reply::Response(self)) }
}

impl IntoReply for StatusCode {
    fn into_reply(self) -> Result<Reply> { Ok(Reply::Response(Response::status(self))) }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply> { Ok(Reply::Text(self)) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply> { Ok(Reply::Text(self.to_owned())) }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply> { Ok(Reply::Text(String::new())) }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply> { Ok(Reply::Json(self)) }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply> {
        serde_json::to_value(&self.0).map(Reply::Json).map_err(Error::handler)
    }
}

impl<T: Serialize> IntoReply for Vec<T> {
    fn into_reply(self) -> Result<Reply> {
        Json(self).into_reply()
    }
}

impl<V: Serialize> IntoReply for HashMap<String, V> {
    fn into_reply(self) -> Result<Reply> {
        Json(self).into_reply()
    }
}

impl<V: Serialize> IntoReply for BTreeMap<String, V> {
    fn into_reply(self) -> Result<Reply> {
        Json(self).into_reply()
    }
}

impl<R: IntoReply, E: Into<Error>> IntoReply for std::result::Result<R, E> {
    fn into_reply(self) -> Result<Reply> {
        self.map_err(Into::into)?.into_reply()
    }
}
