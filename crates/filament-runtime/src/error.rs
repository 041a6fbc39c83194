//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use filament_core::{ApiError, PatternError};
use filament_transport::TransportError;

/// Errors that can occur while assembling or running a bot.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No API token configured.
    #[error("no API token configured (set `token` or FILAMENT_TOKEN)")]
    MissingToken,

    /// A handler registration pattern failed to compile.
    #[error("handler registration failed: {0}")]
    Pattern(#[from] PatternError),

    /// A platform call failed permanently.
    #[error("platform API error: {0}")]
    Api(#[from] ApiError),

    /// Transport setup failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration loading failed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
