//! Error types for hybridroute
//!
//! `AppError` implements `IntoResponse` for Axum handlers. The remaining
//! enums describe failures inside the routing core, from the HTTP transport
//! up to the terminal error returned by `generate_with_routing`.

use crate::router::Tier;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Generation(#[from] RouterError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Generation(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

/// Failure of a single HTTP exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid response body from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("stream from {url} failed: {reason}")]
    Stream { url: String, reason: String },
}

/// Failure of one chat-completion call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(
        "stream interrupted after receiving {bytes_received} bytes ({deltas_received} deltas): {source}"
    )]
    StreamInterrupted {
        bytes_received: usize,
        deltas_received: usize,
        #[source]
        source: TransportError,
    },
}

/// Failure reported by a local model runner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalRunnerError {
    #[error("no local model is loaded")]
    NotLoaded,

    #[error("local model '{0}' is not available")]
    ModelNotFound(String),

    #[error("local model generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Failure of one dispatch attempt against one tier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{tier} tier request failed: {source}")]
    Remote {
        tier: Tier,
        #[source]
        source: CompletionError,
    },

    #[error("local runner failed: {0}")]
    Local(#[from] LocalRunnerError),

    #[error("{tier} tier timed out after {timeout_seconds} seconds")]
    Timeout { tier: Tier, timeout_seconds: u64 },
}

impl DispatchError {
    /// Whether a streamed response broke off after it had started
    pub fn is_stream_interruption(&self) -> bool {
        matches!(
            self,
            Self::Remote {
                source: CompletionError::StreamInterrupted { .. },
                ..
            } | Self::Local(LocalRunnerError::Completion(
                CompletionError::StreamInterrupted { .. }
            ))
        )
    }
}

/// Terminal error of `generate_with_routing`
///
/// Callers receive exactly one of these or a complete response, never both.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("generation on {tier} tier failed and fallback is disabled: {source}")]
    FallbackDisabled {
        tier: Tier,
        #[source]
        source: DispatchError,
    },

    #[error(
        "all tiers exhausted after {original} failed (attempted: [{}], unavailable: [{}]): {last_error}",
        tier_list(.attempted),
        tier_list(.unavailable)
    )]
    AllTiersExhausted {
        original: Tier,
        attempted: Vec<Tier>,
        unavailable: Vec<Tier>,
        last_error: String,
    },
}

impl RouterError {
    /// True when exhaustion happened because no fallback tier was even available
    pub fn no_fallback_available(&self) -> bool {
        match self {
            Self::AllTiersExhausted { attempted, .. } => attempted.is_empty(),
            Self::FallbackDisabled { .. } => false,
        }
    }
}

fn tier_list(tiers: &[Tier]) -> String {
    tiers
        .iter()
        .map(Tier::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
