//! Unified error types for the filament core engine.
//!
//! The central taxonomy is [`ApiError`], which every platform call resolves
//! into. The classification drives the retry behavior of the sender:
//!
//! | Variant | Retried? |
//! |---------|----------|
//! | [`ApiError::RateLimited`] | Yes, after the server-mandated wait |
//! | [`ApiError::Transient`] | Yes, with exponential backoff |
//! | [`ApiError::Api`] | No, surfaced to the caller |
//! | [`ApiError::InvalidRequest`] / [`ApiError::InvalidResponse`] | No |

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// API Errors
// =============================================================================

/// Errors produced by platform API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The platform asked us to slow down.
    ///
    /// Carries the server-mandated minimum wait when the response included
    /// one; the retry policy supplies a fallback otherwise.
    #[error("rate limited by the platform (retry after {retry_after:?})")]
    RateLimited {
        /// Server-provided minimum wait, if any.
        retry_after: Option<Duration>,
    },

    /// A failure that is expected to go away on its own: network errors,
    /// request timeouts, 5xx responses.
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// The platform rejected the request and retrying cannot help
    /// (bad payload, unknown chat, invalid token, ...).
    #[error("API error {code}: {description}")]
    Api {
        /// Platform error code (HTTP status or in-band error_code).
        code: i64,
        /// Human-readable description from the platform.
        description: String,
    },

    /// The outbound request could not be built.
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    /// The platform answered with something we could not make sense of.
    #[error("malformed API response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Whether the retry loop should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    /// The server-mandated minimum wait, for rate-limit errors that carry one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Creates a transient error from any displayable cause.
    pub fn transient(cause: impl std::fmt::Display) -> Self {
        Self::Transient(cause.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Result type for platform API calls.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Update Parsing Errors
// =============================================================================

/// Errors raised while decoding a raw update envelope.
///
/// Payloads of *known* update kinds that fail to deserialize are not an
/// error: they degrade to [`UpdateKind::Other`](crate::update::UpdateKind)
/// so the ingestion offset still advances past them.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The raw data was not valid JSON.
    #[error("update is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The update envelope was not a JSON object.
    #[error("update is not a JSON object")]
    NotAnObject,

    /// The envelope lacks the mandatory update identifier.
    #[error("update is missing the update_id field")]
    MissingUpdateId,
}

// =============================================================================
// Handler Errors
// =============================================================================

/// Invalid handler registration pattern.
#[derive(Debug, Error)]
#[error("invalid handler pattern `{pattern}`: {source}")]
pub struct PatternError {
    /// The pattern that failed to compile.
    pub pattern: String,
    /// The underlying regex error.
    #[source]
    pub source: regex::Error,
}

/// Result type returned by application handlers.
///
/// A handler error is caught and logged at the task boundary; it never
/// propagates into the dispatch engine or the update source.
pub type HandlerResult = anyhow::Result<()>;
