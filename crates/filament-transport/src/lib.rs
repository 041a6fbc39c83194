//! # Filament Transport
//!
//! Network transport layer for the filament bot framework:
//!
//! - [`HttpApi`]: the reqwest-backed [`ApiTransport`](filament_core::ApiTransport)
//!   implementation speaking the platform's JSON-over-HTTP protocol and
//!   classifying every failure into the core error taxonomy.
//! - [`webhook`]: an axum server exposing the single push endpoint that
//!   hands incoming updates to a
//!   [`WebhookReceiver`](filament_core::WebhookReceiver).
//!
//! Everything stateful (retries, offsets, dispatch) lives in
//! `filament-core`; this crate only moves bytes.

pub mod http;
pub mod webhook;

pub use http::{HttpApi, HttpApiConfig};
pub use webhook::{ListenerHandle, serve};

use thiserror::Error;

/// Errors raised while setting transports up.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// The webhook listener could not bind its address.
    #[error("failed to bind webhook listener on {addr}: {source}")]
    Bind {
        /// The address that failed to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for transport setup.
pub type TransportResult<T> = Result<T, TransportError>;
