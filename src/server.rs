//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. stops accepting connections,
//! 2. lets every in-flight connection run to completion,
//! 3. returns from [`Server::serve`].
//!
//! The server never writes a partial response: each request is converted,
//! dispatched through [`App::dispatch`], and only the finished
//! [`Response`](crate::Response) is handed to hyper.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::error::{Error, Result};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::services::{DefaultErrorPages, ErrorPages, Failure};

/// The HTTP server.
#[derive(Debug, Clone, Copy)]
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use lintel::Server;
    /// let server = Server::bind("0.0.0.0:3000")?;
    /// # Ok::<(), lintel::Error>(())
    /// ```
    pub fn bind(addr: &str) -> Result<Self> {
        let addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        Ok(Self { addr })
    }

    /// Binds to the address in the app's configuration.
    pub fn from_config(app: &App) -> Result<Self> {
        Self::bind(&app.config().addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts connections and dispatches them through `app`.
    ///
    /// Returns after a full graceful shutdown.
    pub async fn serve(self, app: App) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, name = %app.config().name, "lintel listening");

        // One task per connection; the set is drained on shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        // `select!` polls the same future on every iteration, so it has to
        // stay at one address: pin it to the stack.
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown is checked first so queued connections are not
                // accepted once it fired.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = app.clone();
                    // hyper has its own IO traits; TokioIo bridges the tokio stream.
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on this connection. Each call
                        // gets its own handle on the shared app.
                        let svc = service_fn(move |req| {
                            let app = app.clone();
                            async move { handle(app, req, remote_addr).await }
                        });

                        // The auto builder speaks HTTP/1.1 or HTTP/2, whichever
                        // the client picks.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connections so a long-lived server keeps a
                // bounded set.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: every in-flight connection finishes before we return.
        while tasks.join_next().await.is_some() {}

        info!("lintel stopped");
        Ok(())
    }
}

// ── Request conversion ────────────────────────────────────────────────────────

/// Converts one hyper request, dispatches it and converts the response back.
///
/// Never fails: unknown methods, unreadable bodies and dispatch errors all
/// become ordinary responses, so hyper only ever sees `Ok`.
async fn handle(
    app: App,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let Ok(method) = Method::try_from(req.method()) else {
        debug!(method = %req.method(), "unsupported method");
        return Ok(Response::status(http::StatusCode::METHOD_NOT_ALLOWED).into_http());
    };

    let response = match Request::from_http(req, method, Some(remote_addr)).await {
        Ok(req) => app.dispatch(req).await,
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request: {e}");
            let failure = Failure { status: http::StatusCode::BAD_REQUEST, kind: e.kind(), message: e.to_string() };
            DefaultErrorPages::new(app.config().debug).render(&failure)
        }
    };

    Ok(response.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first of SIGTERM or Ctrl-C. If a handler cannot be
/// installed, that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // Only Ctrl-C exists off Unix; this arm never fires.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_rejects_malformed_addresses() {
        assert!(matches!(Server::bind("not an address"), Err(Error::Io(_))));
        assert_eq!(Server::bind("127.0.0.1:8080").unwrap().addr().port(), 8080);
    }
}
