//! Router configuration steps.
//!
//! [`Router::new`](super::Router::new) applies [`default_options`] followed by the
//! caller's options, in order. The first option that fails aborts construction; options
//! that fail leave the router untouched.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::Router;
use crate::assets::{AssetError, AssetSource, sub_assets};
use crate::codec::{Decoder, Encoder, ErrorHandler, JsonDecoder, JsonEncoder};

/// Errors raised while configuring a router.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to mount embedded assets: {0}")]
    Assets(#[from] AssetError),
}

/// A single configuration step.
pub enum RouterOption {
    /// Ask the hosting server to send `Strict-Transport-Security` on every response.
    EnableHsts,
    /// Log bytes, duration and status of every dispatched request at `debug` level.
    EnableRouteMetrics,
    /// Serve files from `dir` inside `source` when no route matches.
    EmbeddedAssets {
        source: Arc<dyn AssetSource>,
        dir: String,
    },
    DefaultEncoder(Arc<dyn Encoder>),
    DefaultDecoder(Arc<dyn Decoder>),
    DefaultErrorHandler(Arc<dyn ErrorHandler>),
}

impl RouterOption {
    pub fn embedded_assets(source: impl AssetSource + 'static, dir: impl Into<String>) -> Self {
        Self::EmbeddedAssets {
            source: Arc::new(source),
            dir: dir.into(),
        }
    }

    pub fn default_encoder(encoder: impl Encoder + 'static) -> Self {
        Self::DefaultEncoder(Arc::new(encoder))
    }

    pub fn default_decoder(decoder: impl Decoder + 'static) -> Self {
        Self::DefaultDecoder(Arc::new(decoder))
    }

    pub fn default_error_handler(handler: impl ErrorHandler + 'static) -> Self {
        Self::DefaultErrorHandler(Arc::new(handler))
    }

    pub(super) fn apply(self, router: &mut Router) -> Result<(), ConfigError> {
        match self {
            Self::EnableHsts => router.enable_hsts = true,
            Self::EnableRouteMetrics => router.enable_route_metrics = true,
            Self::EmbeddedAssets { source, dir } => {
                router.embedded_assets = Some(sub_assets(source, &dir)?);
            }
            Self::DefaultEncoder(encoder) => router.default_encoder = Some(encoder),
            Self::DefaultDecoder(decoder) => router.default_decoder = Some(decoder),
            Self::DefaultErrorHandler(handler) => router.default_error_handler = Some(handler),
        }
        Ok(())
    }
}

impl fmt::Debug for RouterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnableHsts => f.write_str("EnableHsts"),
            Self::EnableRouteMetrics => f.write_str("EnableRouteMetrics"),
            Self::EmbeddedAssets { dir, .. } => {
                f.debug_struct("EmbeddedAssets").field("dir", dir).finish_non_exhaustive()
            }
            Self::DefaultEncoder(encoder) => f.debug_tuple("DefaultEncoder").field(encoder).finish(),
            Self::DefaultDecoder(decoder) => f.debug_tuple("DefaultDecoder").field(decoder).finish(),
            Self::DefaultErrorHandler(handler) => {
                f.debug_tuple("DefaultErrorHandler").field(handler).finish()
            }
        }
    }
}

/// Options every router starts from: the JSON decoder, then the JSON encoder.
pub fn default_options() -> Vec<RouterOption> {
    vec![
        RouterOption::default_decoder(JsonDecoder::new()),
        RouterOption::default_encoder(JsonEncoder),
    ]
}
