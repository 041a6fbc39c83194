//! # Filament Runtime
//!
//! Orchestration layer for the filament bot framework:
//!
//! - [`Bot`]: handler registration surface and lifecycle (polling or
//!   webhook mode, cooperative shutdown)
//! - [`config`]: figment-based layered configuration
//!   (`filament.toml` + `FILAMENT_*` environment variables)
//! - [`logging`]: tracing-subscriber setup
//!
//! # Quick start
//!
//! ```rust,ignore
//! use filament_runtime::{Bot, ConfigLoader, logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_current_dir().load()?;
//!     logging::init(&config.logging);
//!
//!     Bot::from_config(config)?
//!         .command(r"/ping", |chat, _| async move {
//!             chat.reply("pong").await?;
//!             Ok(())
//!         })?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;

pub use bot::Bot;
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, FilamentConfig, IngestMode, LogFormat, LogLevel,
    LoggingSettings, RetrySettings, WebhookSettings,
};
pub use error::{RuntimeError, RuntimeResult};
