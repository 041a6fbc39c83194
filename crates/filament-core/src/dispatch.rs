//! Dispatch engine.
//!
//! The [`Dispatcher`] consumes updates from an update source, resolves each
//! against the [`Router`], and runs the chosen handler as an independently
//! progressing tokio task:
//!
//! ```text
//! ┌───────────────┐     ┌────────────┐     ┌─────────────────────────┐
//! │ Update Source │────▶│ Dispatcher │────▶│ handler task            │
//! │ (poll/webhook)│     │  (router)  │────▶│ handler task            │
//! └───────────────┘     └────────────┘────▶│ handler task            │
//!                                          └─────────────────────────┘
//! ```
//!
//! Hand-off order follows arrival order, but completion order is
//! unconstrained: a slow handler for update K never delays the scheduling
//! of update K+1. Concurrency is bounded by a semaphore with FIFO
//! admission, so sustained load cannot leak tasks and later updates cannot
//! starve.
//!
//! A handler error is logged at the task boundary and never propagates; a
//! panicking handler takes down only its own task.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::chat::{Callback, Chat, Inline};
use crate::error::HandlerResult;
use crate::routing::{Resolved, Router};
use crate::sender::ApiSender;
use crate::update::Update;

/// Default bound on concurrently running handler tasks.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Resolves updates and schedules handler execution.
pub struct Dispatcher {
    router: Arc<Router>,
    api: ApiSender,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    /// Creates a dispatcher over a finished (immutable) router.
    ///
    /// `max_concurrency` bounds the number of handler tasks in flight.
    pub fn new(router: Router, api: ApiSender, max_concurrency: usize) -> Self {
        Self {
            router: Arc::new(router),
            api,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Resolves one update and schedules its handler.
    ///
    /// Returns once the handler task has been admitted and spawned, not
    /// when it completes. Unmatched updates are dropped without error.
    pub async fn dispatch(&self, update: Update) {
        let update_id = update.update_id;
        let kind = update.kind.name();

        let Some(resolved) = self.router.resolve(&update) else {
            debug!(update_id, kind, "no handler matched, dropping update");
            return;
        };
        debug!(update_id, kind, category = resolved.category(), "update resolved");

        // FIFO admission: waits while the pool is saturated, so update K+1
        // is admitted right behind K instead of racing ahead of older work.
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            // the semaphore is never closed while the dispatcher lives
            return;
        };

        let api = self.api.clone();
        tokio::spawn(async move {
            let category = resolved.category();
            if let Err(err) = run(resolved, api).await {
                error!(update_id, kind, category, error = %err, "handler failed");
            }
            drop(permit);
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

/// Invokes a resolved handler with the handles it expects.
async fn run(resolved: Resolved, api: ApiSender) -> HandlerResult {
    match resolved {
        Resolved::Command {
            handler,
            message,
            matched,
        } => handler(Chat::from_message(api, message), matched).await,
        Resolved::Attachment {
            handler,
            message,
            payload,
            ..
        } => handler(Chat::from_message(api, message), payload).await,
        Resolved::DefaultMessage { handler, message } => {
            let chat = Chat::from_message(api, message.clone());
            handler(chat, message).await
        }
        Resolved::Callback {
            handler,
            message,
            query,
            matched,
        } => {
            let chat = Chat::from_message(api.clone(), message);
            handler(chat, Callback::new(api, query), matched).await
        }
        Resolved::DefaultCallback {
            handler,
            message,
            query,
        } => {
            let chat = Chat::from_message(api.clone(), message);
            handler(chat, Callback::new(api, query)).await
        }
        Resolved::Inline {
            handler,
            query,
            matched,
        } => handler(Inline::new(api, query), matched).await,
        Resolved::DefaultInline { handler, query } => handler(Inline::new(api, query)).await,
    }
}
