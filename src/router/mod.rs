//! Request routing: map methods and paths to handlers.
//!
//! [`Router`] keeps two tables:
//!
//! | Table        | Key                              | Matched by                       |
//! |--------------|----------------------------------|----------------------------------|
//! | exact routes | method (`GET`, `DELETE`, `PATCH`, `POST`, `PUT`) + path | full path equality |
//! | star routes  | pattern containing `*`, e.g. `/static/*` | path prefix, any method |
//!
//! Dispatch runs in a fixed order: `OPTIONS` short-circuits with an empty `200`, star
//! routes are scanned in registration order (first prefix match wins), then the exact
//! table is consulted. A method with no registered routes gets `405` unless it is `GET`;
//! an unknown path falls back to the embedded assets, if any, then to `404`.
//!
//! After an exact match or a not-found response the router drains whatever is left of the
//! request body, because some reverse proxies refuse to reuse a connection whose request
//! was not fully read. Star routes and the `405`/`OPTIONS` paths leave the body alone.
//!
//! A router is configured and populated up front, then shared read-only: registration
//! takes `&mut self`, dispatch takes `&self`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{Span, debug, warn};

use crate::assets::SubAssets;
use crate::codec::{Decoder, Encoder, ErrorHandler};
use crate::context::Context;
use crate::handler::{AdaptError, Endpoint, Handler, IntoHandler, adapt};
use crate::http::Body;
use crate::middleware::MiddlewareHandler;
use crate::{Method, Request, Response, StatusCode};

mod metrics;
pub mod options;

pub use options::{ConfigError, RouterOption, default_options};

/// Marker that turns a path into a prefix pattern.
const WILDCARD: char = '*';

/// Methods accepted in the exact-route table.
const ROUTABLE_METHODS: [Method; 5] = [
    Method::Get,
    Method::Delete,
    Method::Patch,
    Method::Post,
    Method::Put,
];

/// Body of the built-in not-found response.
const NOT_FOUND_BODY: &str = "404 page not found\n";

/// Errors returned by [`Router::register`].
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("invalid http method: {0}")]
    InvalidMethod(String),

    #[error("route already registered: {method} {path}")]
    AlreadyRegistered { method: Method, path: String },

    #[error(transparent)]
    Adapt(#[from] AdaptError),
}

/// HTTP request router.
///
/// # Examples
///
/// ```rust
/// use autoroute::{Method, Request, Response, Router, StatusCode};
/// use autoroute::context::Context;
/// use tracing::Span;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut router = Router::new(Span::none(), [])?;
/// router.get("/ping", |_ctx: Context| async { Response::new(StatusCode::Ok).body("pong") })?;
///
/// let res = router.serve(Request::new(Method::Get, "/ping")).await;
/// assert_eq!(res.status(), StatusCode::Ok);
///
/// let res = router.serve(Request::new(Method::Post, "/ping")).await;
/// assert_eq!(res.status(), StatusCode::MethodNotAllowed);
/// # Ok(())
/// # }
/// ```
pub struct Router {
    routes: HashMap<Method, HashMap<String, Handler>>,
    // Registration order decides which overlapping pattern wins.
    star_routes: Vec<(String, Handler)>,

    embedded_assets: Option<SubAssets>,

    span: Span,

    enable_hsts: bool,
    enable_route_metrics: bool,

    default_encoder: Option<Arc<dyn Encoder>>,
    default_decoder: Option<Arc<dyn Decoder>>,
    default_error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl Router {
    /// Creates a router, applying [`default_options`] and then `options` in order.
    ///
    /// `span` is the router's logger: everything it records is parented on it.
    ///
    /// # Errors
    ///
    /// Returns the error of the first option that fails; later options are not applied.
    pub fn new(
        span: Span,
        options: impl IntoIterator<Item = RouterOption>,
    ) -> Result<Self, ConfigError> {
        let mut router = Self {
            routes: HashMap::new(),
            star_routes: Vec::new(),
            embedded_assets: None,
            span,
            enable_hsts: false,
            enable_route_metrics: false,
            default_encoder: None,
            default_decoder: None,
            default_error_handler: None,
        };

        for option in default_options().into_iter().chain(options) {
            option.apply(&mut router)?;
        }

        debug!(
            parent: &router.span,
            hsts = router.enable_hsts,
            route_metrics = router.enable_route_metrics,
            embedded_assets = router.embedded_assets.is_some(),
            "router configured"
        );
        Ok(router)
    }

    /// Registers `endpoint` for `method` and `path`.
    ///
    /// A path containing `*` with a [`Endpoint::Raw`] endpoint becomes a star route: the
    /// method is ignored and registering the same pattern again replaces the handler in
    /// place. Every other registration goes into the exact table, where `method` must be
    /// one of `GET`, `DELETE`, `PATCH`, `POST` or `PUT` (case-sensitive) and each
    /// (method, path) pair may be registered once. [`Endpoint::Function`] endpoints are
    /// adapted with the router's default codec and error handler plus `middlewares`.
    ///
    /// # Errors
    ///
    /// - [`RegisterError::InvalidMethod`]: `method` is not routable.
    /// - [`RegisterError::AlreadyRegistered`]: the pair already has a handler.
    /// - [`RegisterError::Adapt`]: the function could not be adapted.
    ///
    /// A failed call stores no handler.
    pub fn register(
        &mut self,
        method: &str,
        path: &str,
        endpoint: impl Into<Endpoint>,
        middlewares: Vec<MiddlewareHandler>,
    ) -> Result<(), RegisterError> {
        let endpoint = endpoint.into();

        if path.contains(WILDCARD) {
            if let Endpoint::Raw(handler) = &endpoint {
                self.insert_star_route(path, Arc::clone(handler));
                return Ok(());
            }
        }

        let parsed: Method = match method.parse() {
            Ok(parsed) => parsed,
            Err(never) => match never {},
        };
        if !ROUTABLE_METHODS.contains(&parsed) {
            return Err(RegisterError::InvalidMethod(method.to_owned()));
        }

        let table = self.routes.entry(parsed.clone()).or_default();
        if table.contains_key(path) {
            return Err(RegisterError::AlreadyRegistered {
                method: parsed,
                path: path.to_owned(),
            });
        }

        let handler = match endpoint {
            Endpoint::Raw(handler) => handler,
            Endpoint::Function(function) => adapt(
                &self.span,
                self.default_decoder.clone(),
                self.default_encoder.clone(),
                middlewares,
                self.default_error_handler.clone(),
                function,
            )?,
        };

        table.insert(path.to_owned(), handler);
        debug!(parent: &self.span, method = %parsed, path, "route registered");
        Ok(())
    }

    fn insert_star_route(&mut self, pattern: &str, handler: Handler) {
        match self.star_routes.iter_mut().find(|(p, _)| p == pattern) {
            Some(entry) => entry.1 = handler,
            None => self.star_routes.push((pattern.to_owned(), handler)),
        }
        debug!(parent: &self.span, pattern, "star route registered");
    }

    /// Register a raw handler for `GET` requests to `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RegisterError> {
        self.register("GET", path, Endpoint::raw(handler), Vec::new())
    }

    /// Register a raw handler for `POST` requests to `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RegisterError> {
        self.register("POST", path, Endpoint::raw(handler), Vec::new())
    }

    /// Register a raw handler for `PUT` requests to `path`.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RegisterError> {
        self.register("PUT", path, Endpoint::raw(handler), Vec::new())
    }

    /// Register a raw handler for `PATCH` requests to `path`.
    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RegisterError> {
        self.register("PATCH", path, Endpoint::raw(handler), Vec::new())
    }

    /// Register a raw handler for `DELETE` requests to `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) -> Result<(), RegisterError> {
        self.register("DELETE", path, Endpoint::raw(handler), Vec::new())
    }

    /// Whether the hosting server should send `Strict-Transport-Security`.
    pub fn hsts_enabled(&self) -> bool {
        self.enable_hsts
    }

    /// Whether each dispatch logs its status, size and duration.
    pub fn route_metrics_enabled(&self) -> bool {
        self.enable_route_metrics
    }

    /// Number of registered routes, exact and star.
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum::<usize>() + self.star_routes.len()
    }

    /// True until the first route is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `request` and return the response.
    ///
    /// With route metrics enabled, one `debug` event is recorded per request:
    /// `served <N> bytes for <METHOD> <PATH> in <DURATION> with code <CODE>`.
    pub async fn serve(&self, request: Request) -> Response {
        if !self.enable_route_metrics {
            return self.dispatch(request).await;
        }

        let method = request.method().clone();
        let path = request.path().to_owned();
        let (response, m) = metrics::capture(self.dispatch(request)).await;
        debug!(
            parent: &self.span,
            "served {} bytes for {} {} in {:?} with code {}",
            m.written,
            method,
            path,
            m.duration,
            m.code.as_u16()
        );
        response
    }

    async fn dispatch(&self, request: Request) -> Response {
        if *request.method() == Method::Options {
            return Response::new(StatusCode::Ok);
        }

        if let Some(handler) = self.match_star_route(request.path()) {
            return handler(Context::new(request)).await;
        }

        let method = request.method().to_uppercase();
        let body = request.body().clone();

        let response = match self.routes.get(&method) {
            None if method != Method::Get => return Response::new(StatusCode::MethodNotAllowed),
            None => self.serve_not_found(&request).await,
            Some(table) => match table.get(request.path()) {
                Some(handler) => handler(Context::new(request)).await,
                None => self.serve_not_found(&request).await,
            },
        };

        self.clean_leftovers(&body).await;
        response
    }

    fn match_star_route(&self, path: &str) -> Option<&Handler> {
        self.star_routes
            .iter()
            .find(|(pattern, _)| path.starts_with(&pattern.replace(WILDCARD, "")))
            .map(|(_, handler)| handler)
    }

    async fn serve_not_found(&self, request: &Request) -> Response {
        if let Some(assets) = &self.embedded_assets {
            match assets.serve(request.path()).await {
                Ok(Some(response)) => return response,
                Ok(None) => {}
                Err(err) => {
                    warn!(parent: &self.span, path = request.path(), error = %err, "failed to read embedded asset");
                }
            }
        }

        Response::new(StatusCode::NotFound).body(NOT_FOUND_BODY)
    }

    // Some reverse proxies get upset when the request body is not read in full.
    async fn clean_leftovers(&self, body: &Body) {
        if let Err(err) = body.drain().await {
            debug!(parent: &self.span, error = %err, "failed to drain request body");
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<&str> = self.star_routes.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("Router")
            .field("routes", &self.routes.values().map(HashMap::len).sum::<usize>())
            .field("star_routes", &patterns)
            .field("embedded_assets", &self.embedded_assets)
            .field("enable_hsts", &self.enable_hsts)
            .field("enable_route_metrics", &self.enable_route_metrics)
            .finish_non_exhaustive()
    }
}
