//! Request decoding, response encoding, and error formatting for adapted handlers.
//!
//! Adapted functions exchange values with the outside world through
//! [`serde_json::Value`], the crate's neutral data model: a [`Decoder`] turns a request
//! into a value, an [`Encoder`] turns a value into a response, and an [`ErrorHandler`]
//! turns a [`HandlerError`] into a response. The defaults are [`JsonDecoder`] and
//! [`JsonEncoder`]; no error handler is installed by default.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

use crate::{Request, Response, StatusCode};

/// Errors produced while decoding a request.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read request body: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request body exceeds {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("unsupported content type `{0}`")]
    UnsupportedContentType(String),
}

impl DecodeError {
    /// The status code a client should see for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Io(_) | Self::Json(_) => StatusCode::BadRequest,
            Self::TooLarge { .. } => StatusCode::PayloadTooLarge,
            Self::UnsupportedContentType(_) => StatusCode::UnsupportedMediaType,
        }
    }
}

/// A failure reported by an adapted function (or by the adapter on its behalf).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {message}")]
pub struct HandlerError {
    status: StatusCode,
    message: String,
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InternalServerError, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Plain-text rendering used when no [`ErrorHandler`] is configured.
    pub fn into_response(self) -> Response {
        Response::new(self.status).body(self.message)
    }
}

impl From<DecodeError> for HandlerError {
    fn from(err: DecodeError) -> Self {
        Self::new(err.status(), err.to_string())
    }
}

/// Future returned by [`Decoder::decode`].
pub type DecodeFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, DecodeError>> + Send + 'a>>;

/// Extracts a value from an incoming request.
pub trait Decoder: Send + Sync + fmt::Debug {
    fn decode<'a>(&'a self, request: &'a Request) -> DecodeFuture<'a>;
}

/// Renders a function's output as a response.
pub trait Encoder: Send + Sync + fmt::Debug {
    fn encode(&self, value: Value) -> Response;
}

/// Renders a [`HandlerError`] as a response.
pub trait ErrorHandler: Send + Sync + fmt::Debug {
    fn handle(&self, error: HandlerError) -> Response;
}

/// Decodes JSON request bodies.
///
/// An empty body decodes to `null`, so functions taking `()` or `Option<T>` accept
/// bodiless requests. A `Content-Type` other than JSON is rejected when present.
#[derive(Debug, Clone)]
pub struct JsonDecoder {
    max_bytes: usize,
}

impl JsonDecoder {
    /// Default body size limit (1 MiB).
    pub const DEFAULT_MAX_BYTES: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self {
            max_bytes: Self::DEFAULT_MAX_BYTES,
        }
    }

    /// Rejects bodies larger than `max_bytes`.
    #[must_use]
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonDecoder {
    fn decode<'a>(&'a self, request: &'a Request) -> DecodeFuture<'a> {
        Box::pin(async move {
            if let Some(content_type) = request.headers().get("content-type") {
                let essence = content_type.split(';').next().unwrap_or("").trim();
                if !essence.eq_ignore_ascii_case("application/json") {
                    return Err(DecodeError::UnsupportedContentType(essence.to_owned()));
                }
            }

            if request.content_length().is_some_and(|len| len > self.max_bytes) {
                return Err(DecodeError::TooLarge {
                    max_bytes: self.max_bytes,
                });
            }

            let body = request.body().read_up_to(self.max_bytes.saturating_add(1)).await?;
            if body.len() > self.max_bytes {
                return Err(DecodeError::TooLarge {
                    max_bytes: self.max_bytes,
                });
            }
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_slice(&body)?)
        })
    }
}

/// Encodes values as JSON responses: `200 OK` with a JSON body, or `204 No Content`
/// for `null`.
#[derive(Debug, Clone, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, value: Value) -> Response {
        if value.is_null() {
            return Response::new(StatusCode::NoContent);
        }
        // Serializing a `Value` cannot fail: its map keys are always strings.
        let body = serde_json::to_vec(&value).unwrap_or_default();
        Response::new(StatusCode::Ok)
            .header("Content-Type", "application/json")
            .body_bytes(body)
    }
}

/// Error handler that renders `{"error": "<message>"}` with the error's status.
#[derive(Debug, Clone, Default)]
pub struct JsonErrorHandler;

impl ErrorHandler for JsonErrorHandler {
    fn handle(&self, error: HandlerError) -> Response {
        let body = serde_json::json!({ "error": error.message() });
        Response::new(error.status())
            .header("Content-Type", "application/json")
            .body(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Body, Method};

    fn post(body: &'static str) -> Request {
        Request::new(Method::Post, "/").with_body(Body::from_bytes(body))
    }

    #[tokio::test]
    async fn decodes_json_body() {
        let req = post(r#"{"name":"ada"}"#).with_header("Content-Type", "application/json");
        let value = JsonDecoder::new().decode(&req).await.unwrap();
        assert_eq!(value, json!({ "name": "ada" }));
    }

    #[tokio::test]
    async fn empty_body_decodes_to_null() {
        let req = Request::new(Method::Get, "/");
        assert_eq!(JsonDecoder::new().decode(&req).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let err = JsonDecoder::new().decode(&post("{nope")).await.unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert_eq!(err.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let decoder = JsonDecoder::new().max_bytes(4);
        let err = decoder.decode(&post("[1,2,3,4]")).await.unwrap_err();
        assert!(matches!(err, DecodeError::TooLarge { max_bytes: 4 }));
    }

    #[tokio::test]
    async fn foreign_content_type_is_rejected() {
        let req = post("a=b").with_header("Content-Type", "application/x-www-form-urlencoded");
        let err = JsonDecoder::new().decode(&req).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UnsupportedMediaType);
    }

    #[test]
    fn encoder_writes_json() {
        let res = JsonEncoder.encode(json!({ "id": 1 }));
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("content-type"), Some("application/json"));
        assert_eq!(res.body_ref(), br#"{"id":1}"#);
    }

    #[test]
    fn encoder_maps_null_to_no_content() {
        let res = JsonEncoder.encode(Value::Null);
        assert_eq!(res.status(), StatusCode::NoContent);
        assert_eq!(res.body_len(), 0);
    }

    #[test]
    fn error_handler_renders_message() {
        let res = JsonErrorHandler.handle(HandlerError::not_found("no such user"));
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(res.body_ref(), br#"{"error":"no such user"}"#);
    }

    #[test]
    fn plain_fallback_uses_status_and_message() {
        let res = HandlerError::bad_request("missing field").into_response();
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert_eq!(res.body_ref(), b"missing field");
    }
}
