//! HTTP/1.1 host for a [`Router`].
//!
//! Each connection runs on its own task. Bodies are buffered per `Content-Length`, pipelined
//! requests are served in order, and keep-alive follows the request's `Connection` header.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::Router;
use crate::http::{
    Body, StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Failures that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Requests larger than this (8 MiB) are answered with 413 and the connection is closed.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// Value sent in `Strict-Transport-Security` when the router asks for HSTS.
pub const HSTS_HEADER_VALUE: &str = "max-age=63072000; includeSubDomains";

/// A bound listener waiting for a router.
///
/// ```rust,no_run
/// use autoroute::{Response, Router, Server, StatusCode, context::Context};
/// use tracing::Span;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new(Span::none(), [])?;
///     router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok).body("Hello!") })?;
///
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.serve(router).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds a listener on `addr`. Port `0` picks a free port; see [`Server::local_addr`].
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the listener cannot be created.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The bound address, with the real port when `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `router` until the process ends or the listener fails.
    ///
    /// The router is frozen from here on. When it has HSTS enabled, every response
    /// carries `Strict-Transport-Security`.
    pub async fn serve(self, router: Router) -> Result<(), ServerError> {
        let router = Arc::new(router);
        let hsts = router.hsts_enabled();
        self.run(move |req| {
            let router = Arc::clone(&router);
            async move {
                let mut response = router.serve(req).await;
                if hsts {
                    response.set_header("Strict-Transport-Security", HSTS_HEADER_VALUE);
                }
                response
            }
        })
        .await
    }

    /// Serves every request with `handler` instead of a router.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Reads, dispatches and answers requests on one connection until it closes.
///
/// Bytes left over after one request are parsed before the socket is read again.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let mut need_read = true;

    loop {
        if need_read {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }
        }

        if buf.len() > MAX_REQUEST_SIZE {
            reject_too_large(&mut stream, peer_addr).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                need_read = true;
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        let content_length = request.content_length().unwrap_or(0);
        let total_needed = match body_offset.checked_add(content_length) {
            Some(total) if total <= MAX_REQUEST_SIZE => total,
            _ => {
                reject_too_large(&mut stream, peer_addr).await?;
                break;
            }
        };
        if buf.len() < total_needed {
            need_read = true;
            continue;
        }

        let mut consumed = buf.split_to(total_needed);
        let body = consumed.split_off(body_offset).freeze();
        // Leftover bytes may already hold the next pipelined request.
        need_read = buf.is_empty();
        let request = request.with_body(Body::from_bytes(body));
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

async fn reject_too_large(stream: &mut TcpStream, peer_addr: SocketAddr) -> std::io::Result<()> {
    warn!(peer = %peer_addr, "request too large, sending 413");
    let response = Response::new(StatusCode::PayloadTooLarge)
        .body("Request entity too large")
        .keep_alive(false);
    stream.write_all(&response.into_bytes()).await
}
