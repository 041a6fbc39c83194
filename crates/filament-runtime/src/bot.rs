//! The user-facing bot assembly.
//!
//! [`Bot`] ties the pieces together: it owns the handler table while the
//! application registers handlers, builds the sender over the HTTP
//! transport, and, once [`run`](Bot::run) is called, freezes the table
//! and drives the configured update source until shutdown.
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_runtime::Bot;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Bot::new("123:abc")?
//!         .command(r"/echo (.+)", |chat, m| async move {
//!             chat.reply(m.group(1).unwrap_or_default()).await?;
//!             Ok(())
//!         })?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! Registration happens before the dispatch loop starts; the router is
//! immutable afterwards. Stopping is cooperative: Ctrl-C (or cancelling the
//! token from [`cancel_token`](Bot::cancel_token)) stops new fetches while
//! handler tasks already in flight run to completion.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::info;

use filament_core::{
    ApiResult, ApiSender, ApiTransport, Callback, Chat, ChatKind, Dispatcher, HandlerResult,
    Inline, Message, Poller, Router, TextMatch, WebhookReceiver,
};
use filament_transport::{HttpApi, HttpApiConfig, webhook};

use crate::config::{FilamentConfig, IngestMode};
use crate::error::{RuntimeError, RuntimeResult};

/// Extra room on top of the long-poll wait before the HTTP client gives up
/// on a request.
const REQUEST_TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// A configured bot: handler table plus the machinery to feed it.
pub struct Bot {
    config: FilamentConfig,
    router: Router,
    api: ApiSender,
    cancel: CancellationToken,
}

impl Bot {
    /// Creates a bot for the given token with default settings.
    pub fn new(token: &str) -> RuntimeResult<Self> {
        Self::from_config(FilamentConfig {
            token: token.to_string(),
            ..FilamentConfig::default()
        })
    }

    /// Creates a bot from a loaded configuration.
    pub fn from_config(config: FilamentConfig) -> RuntimeResult<Self> {
        if config.token.is_empty() {
            return Err(RuntimeError::MissingToken);
        }
        let transport = HttpApi::with_config(
            &config.token,
            HttpApiConfig {
                api_url: config
                    .api_url
                    .clone()
                    .unwrap_or_else(|| filament_transport::http::DEFAULT_API_URL.to_string()),
                // must outlast the server-side long-poll wait
                request_timeout: Duration::from_secs(config.fetch_timeout_secs)
                    + REQUEST_TIMEOUT_GRACE,
            },
        )?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a bot over an arbitrary transport.
    ///
    /// This is the seam used by tests and by self-hosted setups that speak
    /// the platform protocol over something other than plain HTTPS.
    pub fn with_transport(config: FilamentConfig, transport: Arc<dyn ApiTransport>) -> Self {
        let api = ApiSender::new(transport, config.retry.to_policy());
        Self {
            config,
            router: Router::new(),
            api,
            cancel: CancellationToken::new(),
        }
    }

    // =========================================================================
    // Handler registration
    // =========================================================================

    /// Registers a command handler for messages whose text matches `pattern`.
    pub fn command<F, Fut>(mut self, pattern: &str, handler: F) -> RuntimeResult<Self>
    where
        F: Fn(Chat, TextMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.router.command(pattern, handler)?;
        Ok(self)
    }

    /// Registers a callback handler for queries whose data matches `pattern`.
    pub fn callback<F, Fut>(mut self, pattern: &str, handler: F) -> RuntimeResult<Self>
    where
        F: Fn(Chat, Callback, TextMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.router.callback(pattern, handler)?;
        Ok(self)
    }

    /// Registers an inline handler for queries whose text matches `pattern`.
    pub fn inline<F, Fut>(mut self, pattern: &str, handler: F) -> RuntimeResult<Self>
    where
        F: Fn(Inline, TextMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.router.inline(pattern, handler)?;
        Ok(self)
    }

    /// Registers a handler for messages carrying an attachment of `kind`.
    pub fn attachment<F, Fut>(mut self, kind: &'static str, handler: F) -> Self
    where
        F: Fn(Chat, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.router.attachment(kind, handler);
        self
    }

    /// Sets the default handler for unmatched text messages.
    pub fn default_message<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Chat, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.router.default_message(handler);
        self
    }

    /// Sets the default handler for unmatched callback queries.
    pub fn default_callback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Chat, Callback) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.router.default_callback(handler);
        self
    }

    /// Sets the default handler for unmatched inline queries.
    pub fn default_inline<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Inline) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.router.default_inline(handler);
        self
    }

    /// Lets the message and callback defaults fire in group chats too.
    pub fn default_in_groups(mut self, enabled: bool) -> Self {
        self.router.default_in_groups(enabled);
        self
    }

    // =========================================================================
    // Outbound surface
    // =========================================================================

    /// Handle for posting to a channel by public name.
    pub fn channel(&self, name: &str) -> Chat {
        Chat::new(self.api.clone(), name, ChatKind::Channel)
    }

    /// Handle for direct messages to a user.
    pub fn private(&self, user_id: i64) -> Chat {
        Chat::new(self.api.clone(), user_id, ChatKind::Private)
    }

    /// Handle for posting to a group.
    pub fn group(&self, group_id: i64) -> Chat {
        Chat::new(self.api.clone(), group_id, ChatKind::Group)
    }

    /// The rate-limited sender backing this bot.
    pub fn api(&self) -> &ApiSender {
        &self.api
    }

    /// Raw platform call with the bot's default retry policy.
    pub async fn api_call(&self, method: &str, params: Value) -> ApiResult<Value> {
        self.api.call(method, params).await
    }

    /// Basic information about the bot account.
    pub async fn get_me(&self) -> ApiResult<Value> {
        self.api.call("getMe", json!({})).await
    }

    /// Sends a text message without constructing a [`Chat`] handle.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> ApiResult<Value> {
        self.api
            .call("sendMessage", json!({"chat_id": chat_id, "text": text}))
            .await
    }

    /// Leaves a group, supergroup or channel.
    pub async fn leave_chat(&self, chat_id: i64) -> ApiResult<Value> {
        self.api.call("leaveChat", json!({"chat_id": chat_id})).await
    }

    /// File metadata lookup, the first step of a download.
    pub async fn get_file(&self, file_id: &str) -> ApiResult<Value> {
        self.api.call("getFile", json!({"file_id": file_id})).await
    }

    /// Registers a webhook URL with the platform.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> ApiResult<Value> {
        let mut params = json!({ "url": url });
        if let Some(secret) = secret {
            params["secret_token"] = json!(secret);
        }
        self.api.call("setWebhook", params).await
    }

    /// Tells the platform to switch back to long-poll delivery.
    pub async fn delete_webhook(&self) -> ApiResult<Value> {
        self.api.call("deleteWebhook", json!({})).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Token that stops the bot at the next loop checkpoint.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Freezes the handler table and runs the configured update source
    /// until shutdown or a permanent platform error.
    pub async fn run(self) -> RuntimeResult<()> {
        match self.config.mode {
            IngestMode::Polling => self.run_polling().await,
            IngestMode::Webhook => self.run_webhook().await,
        }
    }

    async fn run_polling(self) -> RuntimeResult<()> {
        let Self {
            config,
            router,
            api,
            cancel,
        } = self;

        let dispatcher = Arc::new(Dispatcher::new(router, api.clone(), config.max_concurrency));
        let poller = Poller::new(
            api,
            dispatcher,
            Duration::from_secs(config.fetch_timeout_secs),
        )
        .with_cancel(cancel.clone());

        spawn_interrupt_watcher(cancel);
        info!(mode = "polling", "filament bot starting");
        poller.run().await?;
        Ok(())
    }

    async fn run_webhook(self) -> RuntimeResult<()> {
        let Self {
            config,
            router,
            api,
            cancel,
        } = self;

        if let Some(public_url) = &config.webhook.public_url {
            info!(url = %public_url, "registering webhook with the platform");
            let mut params = json!({ "url": public_url });
            if let Some(secret) = &config.webhook.secret {
                params["secret_token"] = json!(secret);
            }
            api.call("setWebhook", params).await?;
        }

        let dispatcher = Arc::new(Dispatcher::new(router, api, config.max_concurrency));
        let receiver = WebhookReceiver::new(dispatcher);
        let listener = webhook::serve(
            &config.webhook.bind_addr(),
            &config.webhook.path,
            config.webhook.secret.clone(),
            receiver,
        )
        .await?;

        spawn_interrupt_watcher(cancel.clone());
        info!(mode = "webhook", addr = %listener.local_addr, "filament bot running");
        cancel.cancelled().await;
        listener.stop();
        Ok(())
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("mode", &self.config.mode)
            .field("router", &self.router)
            .finish()
    }
}

/// Cancels the token on the first interrupt signal.
fn spawn_interrupt_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });
}
