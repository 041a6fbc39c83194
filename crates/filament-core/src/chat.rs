//! Conversation handles passed to handlers.
//!
//! A [`Chat`] is a lightweight value: a chat identifier plus a clone of the
//! rate-limited [`ApiSender`]. It carries no other state, so it is safe to
//! construct freely, discard, and share across concurrent handler
//! invocations for the same conversation.
//!
//! [`Callback`] and [`Inline`] wrap the corresponding query payloads with
//! the sender so handlers can answer them directly.

use serde_json::{Map, Value, json};

use crate::error::{ApiError, ApiResult};
use crate::sender::ApiSender;
use crate::update::{CallbackQuery, ChatKind, InlineQuery, Message};

/// Outbound chat target: a numeric identifier or a public `@username`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatId {
    /// Numeric chat identifier.
    Id(i64),
    /// Public username, including the leading `@`.
    Username(String),
}

impl ChatId {
    fn to_json(&self) -> Value {
        match self {
            Self::Id(id) => json!(id),
            Self::Username(name) => json!(name),
        }
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ChatId {
    fn from(name: &str) -> Self {
        Self::Username(name.to_string())
    }
}

impl From<String> for ChatId {
    fn from(name: String) -> Self {
        Self::Username(name)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => write!(f, "{name}"),
        }
    }
}

/// Interprets caller-supplied request options as a JSON object.
///
/// `Null` stands for "no options"; anything else non-object is a malformed
/// outbound payload and is rejected before it reaches the wire.
fn into_params(options: Value) -> ApiResult<Map<String, Value>> {
    match options {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ApiError::InvalidRequest(format!(
            "request options must be a JSON object, got {other}"
        ))),
    }
}

// =============================================================================
// Chat
// =============================================================================

/// Handle to one conversation, used by handlers to send responses.
#[derive(Clone)]
pub struct Chat {
    api: ApiSender,
    /// The target this handle addresses.
    pub id: ChatId,
    /// Conversation kind, when known.
    pub kind: ChatKind,
    message: Option<Message>,
}

macro_rules! impl_send {
    ($(#[$meta:meta])* $name:ident, $method:literal) => {
        $(#[$meta])*
        pub async fn $name(&self, options: Value) -> ApiResult<Value> {
            self.call_to_chat($method, options).await
        }
    };
}

impl Chat {
    /// Creates a free-standing handle for an arbitrary target.
    pub fn new(api: ApiSender, id: impl Into<ChatId>, kind: ChatKind) -> Self {
        Self {
            api,
            id: id.into(),
            kind,
            message: None,
        }
    }

    /// Derives a handle from the conversation an incoming message belongs to.
    pub fn from_message(api: ApiSender, message: Message) -> Self {
        Self {
            api,
            id: ChatId::Id(message.chat.id),
            kind: message.chat.kind,
            message: Some(message),
        }
    }

    /// Whether this is a multi-member conversation.
    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// The incoming message this handle was derived from, if any.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// Sends a plain text message to this chat.
    pub async fn send_text(&self, text: &str) -> ApiResult<Value> {
        self.call_to_chat("sendMessage", json!({ "text": text })).await
    }

    /// Sends a text message with additional platform options
    /// (`parse_mode`, `reply_markup`, ...).
    pub async fn send_text_with(&self, text: &str, options: Value) -> ApiResult<Value> {
        let mut params = into_params(options)?;
        params.insert("text".to_string(), json!(text));
        self.call_to_chat("sendMessage", Value::Object(params)).await
    }

    /// Replies to the originating message: quotes its identifier and
    /// disables link previews.
    pub async fn reply(&self, text: &str) -> ApiResult<Value> {
        let mut params = json!({
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(message) = &self.message {
            params["reply_to_message_id"] = json!(message.message_id);
        }
        self.call_to_chat("sendMessage", params).await
    }

    /// Forwards a message from another chat into this one.
    pub async fn forward_message(&self, from_chat_id: i64, message_id: i64) -> ApiResult<Value> {
        self.call_to_chat(
            "forwardMessage",
            json!({
                "from_chat_id": from_chat_id,
                "message_id": message_id,
            }),
        )
        .await
    }

    /// Edits the text of a previously sent message in this chat.
    pub async fn edit_text(&self, message_id: i64, text: &str) -> ApiResult<Value> {
        self.call_to_chat(
            "editMessageText",
            json!({
                "message_id": message_id,
                "text": text,
            }),
        )
        .await
    }

    /// Broadcasts a chat action ("typing", "upload_photo", ...).
    pub async fn send_chat_action(&self, action: &str) -> ApiResult<Value> {
        self.call_to_chat("sendChatAction", json!({ "action": action })).await
    }

    impl_send!(
        /// Sends a photo; `options` carries the `photo` reference plus any
        /// extras such as `caption`.
        send_photo,
        "sendPhoto"
    );

    impl_send!(
        /// Sends an audio file.
        send_audio,
        "sendAudio"
    );

    impl_send!(
        /// Sends a video.
        send_video,
        "sendVideo"
    );

    impl_send!(
        /// Sends a generic document.
        send_document,
        "sendDocument"
    );

    impl_send!(
        /// Sends a sticker.
        send_sticker,
        "sendSticker"
    );

    impl_send!(
        /// Sends a voice note.
        send_voice,
        "sendVoice"
    );

    impl_send!(
        /// Sends a location.
        send_location,
        "sendLocation"
    );

    /// Addresses `method` to this chat and forwards it through the sender.
    async fn call_to_chat(&self, method: &str, params: Value) -> ApiResult<Value> {
        let mut params = into_params(params)?;
        params.insert("chat_id".to_string(), self.id.to_json());
        self.api.call(method, Value::Object(params)).await
    }
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("id", &self.id)
            .field("kind", &self.kind.as_str())
            .finish()
    }
}

// =============================================================================
// Query handles
// =============================================================================

/// Handle to an incoming callback query.
#[derive(Clone)]
pub struct Callback {
    api: ApiSender,
    /// The query payload.
    pub query: CallbackQuery,
}

impl Callback {
    /// Wraps a callback query with the sender used to answer it.
    pub fn new(api: ApiSender, query: CallbackQuery) -> Self {
        Self { api, query }
    }

    /// The data attached to the pressed button, or `""` when absent.
    pub fn data(&self) -> &str {
        self.query.data.as_deref().unwrap_or("")
    }

    /// Answers the query, dismissing the client-side progress indicator.
    pub async fn answer(&self, options: Value) -> ApiResult<Value> {
        let mut params = into_params(options)?;
        params.insert("callback_query_id".to_string(), json!(self.query.id));
        self.api
            .call("answerCallbackQuery", Value::Object(params))
            .await
    }
}

/// Handle to an incoming inline query.
#[derive(Clone)]
pub struct Inline {
    api: ApiSender,
    /// The query payload.
    pub query: InlineQuery,
}

impl Inline {
    /// Wraps an inline query with the sender used to answer it.
    pub fn new(api: ApiSender, query: InlineQuery) -> Self {
        Self { api, query }
    }

    /// Answers the query with a JSON array of results.
    pub async fn answer(&self, results: Value) -> ApiResult<Value> {
        self.api
            .call(
                "answerInlineQuery",
                json!({
                    "inline_query_id": self.query.id,
                    "results": results,
                }),
            )
            .await
    }
}
