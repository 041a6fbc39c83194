//! # Filament Core
//!
//! The update-ingestion and dispatch engine of the filament bot framework.
//!
//! This crate contains everything that has real state-machine and
//! concurrency structure: how updates are fetched, how progress through the
//! update stream is tracked, how an update is matched against the ordered
//! handler table, and how matched handlers run without stalling ingestion.
//!
//! ## Architecture
//!
//! All updates flow through the central [`Dispatcher`]:
//!
//! ```text
//! ┌──────────────────┐     ┌────────────┐     ┌──────────────┐
//! │  Poller          │────▶│ Dispatcher │────▶│ handler task │
//! │  WebhookReceiver │     │  (Router)  │────▶│ handler task │
//! └──────────────────┘     └────────────┘────▶│ handler task │
//!          │                     │            └──────┬───────┘
//!          ▼                     ▼                   ▼
//!      ApiSender ◀───────── Chat / Callback / Inline handles
//! ```
//!
//! - **[`Update`]**: one platform event: id + payload variant
//! - **[`Router`]**: ordered handler table, first-registered-wins
//! - **[`Dispatcher`]**: bounded concurrent handler scheduling
//! - **[`ApiSender`]**: retry/backoff wrapper over an [`ApiTransport`]
//! - **[`Poller`] / [`WebhookReceiver`]**: the two ingestion variants
//!
//! ## Example
//!
//! ```rust,ignore
//! use filament_core::{ApiSender, Dispatcher, Poller, RetryPolicy, Router};
//! use std::sync::Arc;
//!
//! let mut router = Router::new();
//! router.command(r"/echo (.+)", |chat, m| async move {
//!     chat.reply(m.group(1).unwrap_or_default()).await?;
//!     Ok(())
//! })?;
//!
//! let api = ApiSender::new(transport, RetryPolicy::default());
//! let dispatcher = Arc::new(Dispatcher::new(router, api.clone(), 32));
//! Poller::new(api, dispatcher, std::time::Duration::from_secs(60))
//!     .run()
//!     .await?;
//! ```

pub mod chat;
pub mod dispatch;
pub mod error;
pub mod routing;
pub mod sender;
pub mod source;
pub mod update;

pub use chat::{Callback, Chat, ChatId, Inline};
pub use dispatch::{DEFAULT_MAX_CONCURRENCY, Dispatcher};
pub use error::{ApiError, ApiResult, HandlerResult, ParseError, PatternError};
pub use routing::{Resolved, Router, TextMatch};
pub use sender::{ApiSender, ApiTransport, RetryPolicy};
pub use source::{DEFAULT_FETCH_TIMEOUT, Poller, WebhookReceiver};
pub use update::{
    ATTACHMENT_KINDS, CallbackQuery, ChatInfo, ChatKind, InlineQuery, Message, Update, UpdateKind,
    User,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::chat::{Callback, Chat, ChatId, Inline};
    pub use super::dispatch::Dispatcher;
    pub use super::error::{ApiError, ApiResult, HandlerResult};
    pub use super::routing::{Router, TextMatch};
    pub use super::sender::{ApiSender, ApiTransport, RetryPolicy};
    pub use super::source::{Poller, WebhookReceiver};
    pub use super::update::{Message, Update, UpdateKind};
}
