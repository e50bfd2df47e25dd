//! Middleware chain for adapted handlers.
//!
//! The router never executes middleware itself: the ordered list given at registration is
//! handed to [`adapt`](crate::handler::adapt), which wraps the adapted function so every
//! request walks the list front to back before reaching it.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`]: converts a [`Middleware`] into a [`MiddlewareHandler`].

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Response, context::Context, handler::Handler};

/// A type-erased, reference-counted middleware function.
///
/// Build one from a [`Middleware`] with [`from_middleware`].
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// Once every middleware has run, [`Next::run`] calls the endpoint the chain was
/// built for. `Next` is consumed by `run`, so a middleware can forward at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Handler,
    // Position of the middleware invoked by the next `run` call.
    index: usize,
}

impl Next {
    /// Creates a cursor positioned at the start of `middlewares`, ending in `endpoint`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            endpoint,
            index: 0,
        }
    }

    /// Invokes the next middleware, or the endpoint once the chain is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// The core trait for middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may pass through
/// (`next.run(ctx).await`), short-circuit by returning a [`Response`] without calling
/// `next`, or decorate the downstream response.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}
