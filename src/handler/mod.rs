//! Handlers and the adapter that builds them from typed application functions.
//!
//! Every route ends in a [`Handler`]: a type-erased async function from [`Context`] to
//! [`Response`]. Callers supply one of two [`Endpoint`] variants at registration:
//!
//! - [`Endpoint::Raw`]: already a handler; stored as-is.
//! - [`Endpoint::Function`]: a typed function `Fn(Context, In) -> Result<Out, HandlerError>`
//!   that [`adapt`] binds to a decoder, an encoder, an optional error handler and an
//!   ordered middleware list.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::{Span, debug};

use crate::Response;
use crate::codec::{Decoder, Encoder, ErrorHandler, HandlerError};
use crate::context::Context;
use crate::middleware::{MiddlewareHandler, Next};

/// Boxed future produced by a [`Handler`].
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers live behind `Arc<dyn Fn(…)>` so the router can share them across tasks
/// without copying the underlying closure. Build one with [`into_handler`].
pub type Handler = Arc<dyn Fn(Context) -> ResponseFuture + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> ResponseFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> ResponseFuture {
        Box::pin((self)(ctx))
    }
}

/// Erase the concrete handler type.
///
/// # Examples
///
/// ```rust
/// use autoroute::{Response, StatusCode, context::Context, handler::into_handler};
///
/// let handler = into_handler(|_ctx: Context| async { Response::new(StatusCode::Ok) });
/// ```
pub fn into_handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

type ValueFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// A typed application function waiting to be adapted into a [`Handler`].
///
/// The function's input is deserialized from whatever the decoder produced and its output
/// is serialized back into a [`Value`] for the encoder. An input that does not fit `In`
/// is reported as `400 Bad Request`.
#[derive(Clone)]
pub struct Function {
    name: &'static str,
    call: Arc<dyn Fn(Context, Value) -> ValueFuture + Send + Sync>,
}

impl Function {
    pub fn new<F, Fut, In, Out>(function: F) -> Self
    where
        F: Fn(Context, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, HandlerError>> + Send + 'static,
        In: DeserializeOwned + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        let function = Arc::new(function);
        let call = move |ctx: Context, input: Value| -> ValueFuture {
            let function = Arc::clone(&function);
            Box::pin(async move {
                let input: In = serde_json::from_value(input).map_err(|err| {
                    HandlerError::bad_request(format!("invalid request payload: {err}"))
                })?;
                let output = function(ctx, input).await?;
                serde_json::to_value(output).map_err(|err| {
                    HandlerError::internal(format!("failed to serialize response: {err}"))
                })
            })
        };

        Self {
            name: std::any::type_name::<F>(),
            call: Arc::new(call),
        }
    }

    /// The Rust type name of the wrapped function, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

/// What a caller hands to [`Router::register`](crate::Router::register).
#[derive(Clone)]
pub enum Endpoint {
    Raw(Handler),
    Function(Function),
}

impl Endpoint {
    /// Wrap an async `Fn(Context) -> Response` as a raw endpoint.
    pub fn raw(handler: impl IntoHandler) -> Self {
        Self::Raw(into_handler(handler))
    }

    /// Wrap a typed function for adaptation.
    pub fn function<F, Fut, In, Out>(function: F) -> Self
    where
        F: Fn(Context, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, HandlerError>> + Send + 'static,
        In: DeserializeOwned + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        Self::Function(Function::new(function))
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

impl From<Handler> for Endpoint {
    fn from(handler: Handler) -> Self {
        Self::Raw(handler)
    }
}

impl From<Function> for Endpoint {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(_) => f.write_str("Raw"),
            Self::Function(function) => f.debug_tuple("Function").field(function).finish(),
        }
    }
}

/// Errors raised while adapting a function into a handler.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("no decoder configured for function `{function}`")]
    MissingDecoder { function: &'static str },

    #[error("no encoder configured for function `{function}`")]
    MissingEncoder { function: &'static str },
}

/// Bind `function` to a codec, an error handler and a middleware chain.
///
/// The produced handler runs `middlewares` in order, then decodes the request, calls the
/// function and encodes its output. Failures (decoding, payload conversion, or an `Err`
/// from the function) go through `error_handler`, or are rendered as plain text with the
/// error's status when none is given. Events are recorded under `span`.
///
/// # Errors
///
/// Fails when `decoder` or `encoder` is absent.
pub fn adapt(
    span: &Span,
    decoder: Option<Arc<dyn Decoder>>,
    encoder: Option<Arc<dyn Encoder>>,
    middlewares: Vec<MiddlewareHandler>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    function: Function,
) -> Result<Handler, AdaptError> {
    let name = function.name();
    let decoder = decoder.ok_or(AdaptError::MissingDecoder { function: name })?;
    let encoder = encoder.ok_or(AdaptError::MissingEncoder { function: name })?;

    debug!(
        parent: span,
        function = name,
        middlewares = middlewares.len(),
        "adapting function into handler"
    );

    let span = span.clone();
    let endpoint: Handler = Arc::new(move |ctx: Context| -> ResponseFuture {
        let decoder = Arc::clone(&decoder);
        let encoder = Arc::clone(&encoder);
        let error_handler = error_handler.clone();
        let function = function.clone();
        let span = span.clone();

        Box::pin(async move {
            let decoded = decoder.decode(ctx.request()).await;
            let result = match decoded {
                Ok(input) => (function.call)(ctx, input).await,
                Err(err) => Err(HandlerError::from(err)),
            };

            match result {
                Ok(output) => encoder.encode(output),
                Err(err) => {
                    debug!(
                        parent: &span,
                        function = function.name(),
                        status = err.status().as_u16(),
                        error = err.message(),
                        "handler failed"
                    );
                    match &error_handler {
                        Some(handler) => handler.handle(err),
                        None => err.into_response(),
                    }
                }
            }
        })
    });

    if middlewares.is_empty() {
        return Ok(endpoint);
    }

    let chain: Arc<[MiddlewareHandler]> = Arc::from(middlewares);
    Ok(Arc::new(move |ctx: Context| -> ResponseFuture {
        Box::pin(Next::new(Arc::clone(&chain), Arc::clone(&endpoint)).run(ctx))
    }))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::codec::{JsonDecoder, JsonEncoder, JsonErrorHandler};
    use crate::middleware::{Middleware, from_middleware};
    use crate::{Body, Method, Request, StatusCode};

    #[derive(Deserialize)]
    struct Greet {
        name: String,
    }

    #[derive(Serialize)]
    struct Greeting {
        message: String,
    }

    fn greet() -> Function {
        Function::new(|_ctx: Context, input: Greet| async move {
            if input.name.is_empty() {
                return Err(HandlerError::bad_request("name must not be empty"));
            }
            Ok(Greeting {
                message: format!("hello, {}", input.name),
            })
        })
    }

    fn json_codec() -> (Option<Arc<dyn Decoder>>, Option<Arc<dyn Encoder>>) {
        (Some(Arc::new(JsonDecoder::new())), Some(Arc::new(JsonEncoder)))
    }

    fn post(body: &'static str) -> Context {
        Context::new(Request::new(Method::Post, "/greet").with_body(Body::from_bytes(body)))
    }

    #[tokio::test]
    async fn adapted_function_round_trips_json() {
        let (decoder, encoder) = json_codec();
        let handler = adapt(&Span::none(), decoder, encoder, vec![], None, greet()).unwrap();

        let res = handler(post(r#"{"name":"ada"}"#)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), br#"{"message":"hello, ada"}"#);
    }

    #[tokio::test]
    async fn function_error_uses_plain_fallback() {
        let (decoder, encoder) = json_codec();
        let handler = adapt(&Span::none(), decoder, encoder, vec![], None, greet()).unwrap();

        let res = handler(post(r#"{"name":""}"#)).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert_eq!(res.body_ref(), b"name must not be empty");
    }

    #[tokio::test]
    async fn function_error_goes_through_error_handler() {
        let (decoder, encoder) = json_codec();
        let errors: Arc<dyn ErrorHandler> = Arc::new(JsonErrorHandler);
        let handler =
            adapt(&Span::none(), decoder, encoder, vec![], Some(errors), greet()).unwrap();

        let res = handler(post("{not json")).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        let body: Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert!(body["error"].as_str().unwrap().contains("malformed JSON"));
    }

    #[tokio::test]
    async fn mismatched_payload_is_bad_request() {
        let (decoder, encoder) = json_codec();
        let handler = adapt(&Span::none(), decoder, encoder, vec![], None, greet()).unwrap();

        let res = handler(post(r#"{"nombre":"ada"}"#)).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert!(
            String::from_utf8_lossy(res.body_ref()).starts_with("invalid request payload")
        );
    }

    #[tokio::test]
    async fn unit_input_accepts_empty_body() {
        let (decoder, encoder) = json_codec();
        let ping = Function::new(|_ctx: Context, (): ()| async { Ok(json!({ "pong": true })) });
        let handler = adapt(&Span::none(), decoder, encoder, vec![], None, ping).unwrap();

        let res = handler(Context::new(Request::new(Method::Get, "/ping"))).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), br#"{"pong":true}"#);
    }

    #[test]
    fn missing_codec_fails_adaptation() {
        let (decoder, encoder) = json_codec();

        let err = adapt(&Span::none(), None, encoder, vec![], None, greet()).err().unwrap();
        assert!(matches!(err, AdaptError::MissingDecoder { .. }));

        let err = adapt(&Span::none(), decoder, None, vec![], None, greet()).err().unwrap();
        assert!(matches!(err, AdaptError::MissingEncoder { .. }));
    }

    struct Caller(&'static str);

    impl Middleware for Caller {
        fn handle(&self, mut ctx: Context, next: Next) -> ResponseFuture {
            ctx.extensions_mut().insert(self.0);
            Box::pin(next.run(ctx))
        }
    }

    #[tokio::test]
    async fn middlewares_run_before_function() {
        let (decoder, encoder) = json_codec();
        let whoami = Function::new(|ctx: Context, (): ()| async move {
            let caller = ctx.extensions().get::<&'static str>().copied();
            caller
                .map(|name| json!({ "caller": name }))
                .ok_or_else(|| HandlerError::internal("caller missing"))
        });
        let chain = vec![from_middleware(Arc::new(Caller("ada")))];
        let handler = adapt(&Span::none(), decoder, encoder, chain, None, whoami).unwrap();

        let res = handler(Context::new(Request::new(Method::Get, "/whoami"))).await;
        assert_eq!(res.body_ref(), br#"{"caller":"ada"}"#);
    }

    #[test]
    fn endpoint_variants() {
        let raw = Endpoint::raw(|_ctx: Context| async { Response::new(StatusCode::Ok) });
        assert!(raw.is_raw());
        assert!(!Endpoint::from(greet()).is_raw());
    }
}
