//! Webhook HTTP server.
//!
//! One POST route accepting one JSON-encoded update per request. The
//! handler parses the envelope, hands it to the [`WebhookReceiver`] and
//! answers immediately; the hand-off contract guarantees the response
//! never waits on handler execution.
//!
//! When a secret is configured, requests must present it in the
//! `X-Telegram-Bot-Api-Secret-Token` header; everything else is rejected
//! before reaching the engine.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::{debug, error, info, warn};

use filament_core::{Update, WebhookReceiver};

use crate::{TransportError, TransportResult};

/// Header carrying the configured webhook secret.
const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Handle to a running webhook listener.
///
/// Dropping this handle stops the listener.
#[derive(Debug)]
pub struct ListenerHandle {
    /// The address the listener actually bound (useful with port 0).
    pub local_addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ListenerHandle {
    /// Stops the listener.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Shared state for the webhook route.
struct ServerState {
    receiver: WebhookReceiver,
    secret: Option<String>,
}

/// Starts the webhook server and returns its handle.
///
/// `path` is the route the platform was pointed at via `setWebhook`; a
/// missing leading slash is tolerated.
pub async fn serve(
    addr: &str,
    path: &str,
    secret: Option<String>,
    receiver: WebhookReceiver,
) -> TransportResult<ListenerHandle> {
    let state = Arc::new(ServerState { receiver, secret });

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let router = Router::new()
        .route(&path, post(webhook_handler))
        .with_state(state);

    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
    let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
        addr: addr.to_string(),
        source,
    })?;

    info!(addr = %local_addr, path = %path, "webhook listener started");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let server = axum::serve(listener, router);
        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!(error = %e, "webhook server error");
                }
            }
            _ = &mut shutdown_rx => {
                info!("webhook listener shutting down");
            }
        }
    });

    Ok(ListenerHandle {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
    })
}

/// POST handler: one update per request.
async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.secret {
        let presented = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if presented != Some(secret.as_str()) {
            warn!("webhook request with missing or wrong secret token");
            return (StatusCode::UNAUTHORIZED, "bad secret token").into_response();
        }
    }

    match Update::from_slice(&body) {
        Ok(update) => {
            debug!(
                update_id = update.update_id,
                kind = update.kind.name(),
                "webhook update received"
            );
            state.receiver.on_update(update);
            StatusCode::OK.into_response()
        }
        Err(error) => {
            warn!(error = %error, "rejecting undecodable webhook body");
            (StatusCode::BAD_REQUEST, "bad update").into_response()
        }
    }
}
