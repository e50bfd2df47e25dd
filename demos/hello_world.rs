//! Minimal autoroute application.
//!
//! Run with:
//!
//! ```sh
//! RUST_LOG=debug cargo run --example hello_world
//! ```
//!
//! Then try:
//!
//! ```sh
//! curl http://127.0.0.1:8080/
//! curl -X POST http://127.0.0.1:8080/greet -d '{"name":"world"}'
//! curl http://127.0.0.1:8080/static/anything
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use autoroute::codec::HandlerError;
use autoroute::context::Context;
use autoroute::handler::Endpoint;
use autoroute::middleware::{Middleware, Next, from_middleware};
use autoroute::{Response, Router, RouterOption, Server, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct Greet {
    name: String,
}

#[derive(Serialize)]
struct Greeting {
    message: String,
}

/// Adds an `X-Powered-By` header to every response of the route it wraps.
struct PoweredBy;

impl Middleware for PoweredBy {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move { next.run(ctx).await.header("X-Powered-By", "autoroute") })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let mut router = Router::new(
        tracing::info_span!("router"),
        [RouterOption::EnableRouteMetrics],
    )?;

    router.get("/", |_ctx: Context| async {
        Response::new(StatusCode::Ok).body("Hello, World!")
    })?;

    let greet = Endpoint::function(|_ctx: Context, input: Greet| async move {
        if input.name.is_empty() {
            return Err(HandlerError::bad_request("name must not be empty"));
        }
        Ok(Greeting {
            message: format!("hello, {}", input.name),
        })
    });
    router.register("POST", "/greet", greet, vec![from_middleware(Arc::new(PoweredBy))])?;

    router.register(
        "GET",
        "/static/*",
        Endpoint::raw(|ctx: Context| async move {
            let path = ctx.request().path().to_owned();
            Response::new(StatusCode::Ok).body(format!("static catch-all for {path}"))
        }),
        vec![],
    )?;

    let server = Server::bind("127.0.0.1:8080").await?;
    info!(address = %server.local_addr(), "hello_world ready");
    server.serve(router).await?;
    Ok(())
}
