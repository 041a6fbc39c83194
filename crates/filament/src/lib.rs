//! # Filament
//!
//! An async framework for messaging bots: receive a stream of platform
//! updates, dispatch each to the first matching registered handler, and
//! let the framework absorb connection retries and rate limiting.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌────────────┐     ┌──────────────┐
//! │ Poller / Webhook │────▶│ Dispatcher │────▶│ handler task │
//! │  (update source) │     │  (Router)  │────▶│ handler task │
//! └──────────────────┘     └────────────┘────▶│ handler task │
//!                                             └──────┬───────┘
//!                                                    ▼
//!                                  Chat handles → rate-limited ApiSender
//! ```
//!
//! - **filament-core**: the engine: update model, handler table, dispatch,
//!   retry/backoff sender, chat handles
//! - **filament-transport**: reqwest HTTP client and axum webhook server
//! - **filament-runtime**: configuration, logging, the [`Bot`] assembly
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use filament::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Bot::new(&std::env::var("FILAMENT_TOKEN")?)?
//!         .command(r"/echo (.+)", |chat, m| async move {
//!             chat.reply(m.group(1).unwrap_or_default()).await?;
//!             Ok(())
//!         })?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub use filament_core as core;
pub use filament_runtime as runtime;
pub use filament_transport as transport;

/// Prelude for common imports.
pub mod prelude {
    pub use filament_core::{
        ApiError, ApiResult, Callback, Chat, ChatId, ChatKind, HandlerResult, Inline, Message,
        TextMatch, Update, UpdateKind,
    };
    pub use filament_runtime::{Bot, ConfigLoader, FilamentConfig, IngestMode, logging};
}
