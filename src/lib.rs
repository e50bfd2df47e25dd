//! # autoroute
//!
//! An in-process HTTP request router with deterministic dispatch, typed handler
//! adaptation and a small async HTTP/1.1 server to host it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autoroute::{Router, RouterOption, Server, codec::HandlerError, context::Context};
//! use autoroute::handler::Endpoint;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Greet { name: String }
//!
//! #[derive(Serialize)]
//! struct Greeting { message: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new(
//!         tracing::info_span!("router"),
//!         [RouterOption::EnableRouteMetrics],
//!     )?;
//!
//!     let greet = Endpoint::function(|_ctx: Context, input: Greet| async move {
//!         Ok::<_, HandlerError>(Greeting { message: format!("hello, {}", input.name) })
//!     });
//!     router.register("POST", "/greet", greet, vec![])?;
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(router).await?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod codec;
pub mod context;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use router::{ConfigError, RegisterError, Router, RouterOption};
pub use server::{Server, ServerError};
