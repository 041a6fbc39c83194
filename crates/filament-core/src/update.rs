//! Update envelope and payload model.
//!
//! An [`Update`] is one event delivered by the platform: a monotonically
//! increasing identifier plus exactly one payload variant. The model keeps
//! only the fields the engine routes on (chat, sender, text); everything
//! else stays available as raw JSON on the payload, so attachment handlers
//! receive the untyped object the platform sent.
//!
//! Parsing is lenient by design: an envelope whose payload fails to
//! deserialize is carried as [`UpdateKind::Other`] instead of being dropped,
//! so the ingestion offset can still advance past it.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ParseError;

/// Attachment keys probed on an incoming message, in match order.
///
/// A message carrying any of these is resolved against the attachment
/// handlers before command patterns are consulted.
pub const ATTACHMENT_KINDS: &[&str] = &[
    "location",
    "photo",
    "document",
    "audio",
    "voice",
    "sticker",
    "contact",
    "venue",
    "video",
    "game",
    "delete_chat_photo",
    "new_chat_photo",
    "new_chat_member",
    "left_chat_member",
    "new_chat_title",
    "group_chat_created",
];

// =============================================================================
// Payload model
// =============================================================================

/// A platform user (subset of fields).
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: i64,
    /// First name; always present on the wire.
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl User {
    /// Display name in the form `First (username)`, used for logging.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(username) => format!("{} ({})", self.first_name, username),
            None => self.first_name.clone(),
        }
    }
}

/// The kind of conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Whether this is a multi-member conversation.
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }

    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }
}

/// The conversation a message was posted in (subset of fields).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatInfo {
    /// Unique chat identifier.
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// An incoming message.
///
/// Typed fields cover what the router needs; every other field the platform
/// sent is kept in `extra` and reachable through [`Message::attachment`].
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message identifier, unique within the chat.
    pub message_id: i64,
    /// The conversation this message belongs to.
    pub chat: ChatInfo,
    /// Sender; absent for channel posts.
    #[serde(default)]
    pub from: Option<User>,
    /// Text content, if this is a text message.
    #[serde(default)]
    pub text: Option<String>,
    /// All remaining fields of the raw message object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Returns the first attachment present on this message, probing
    /// [`ATTACHMENT_KINDS`] in order.
    pub fn attachment(&self) -> Option<(&'static str, &Value)> {
        ATTACHMENT_KINDS
            .iter()
            .find_map(|kind| self.extra.get(*kind).map(|payload| (*kind, payload)))
    }
}

/// An incoming callback query (inline keyboard button press).
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Query identifier, needed to answer it.
    pub id: String,
    /// The user who pressed the button.
    pub from: User,
    /// Opaque data attached to the pressed button.
    #[serde(default)]
    pub data: Option<String>,
    /// The message the button was attached to, when still available.
    #[serde(default)]
    pub message: Option<Message>,
}

/// An incoming inline query.
#[derive(Debug, Clone, Deserialize)]
pub struct InlineQuery {
    /// Query identifier, needed to answer it.
    pub id: String,
    /// The user typing the query.
    pub from: User,
    /// Current query text.
    pub query: String,
    /// Pagination offset controlled by previous answers.
    #[serde(default)]
    pub offset: String,
}

// =============================================================================
// Update envelope
// =============================================================================

/// The payload variants an [`Update`] can carry.
#[derive(Debug, Clone)]
pub enum UpdateKind {
    /// A new incoming message.
    Message(Message),
    /// A new version of an already delivered message.
    EditedMessage(Message),
    /// A new channel post.
    ChannelPost(Message),
    /// A new version of an already delivered channel post.
    EditedChannelPost(Message),
    /// An inline keyboard button press.
    CallbackQuery(CallbackQuery),
    /// An inline query.
    InlineQuery(InlineQuery),
    /// An update kind the engine does not model; never dispatched.
    Other(Value),
}

impl UpdateKind {
    /// Stable name of the variant, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::EditedMessage(_) => "edited_message",
            Self::ChannelPost(_) => "channel_post",
            Self::EditedChannelPost(_) => "edited_channel_post",
            Self::CallbackQuery(_) => "callback_query",
            Self::InlineQuery(_) => "inline_query",
            Self::Other(_) => "other",
        }
    }
}

/// Message-carrying update keys, probed before query kinds as the original
/// platform delivers at most one of them per envelope.
const MESSAGE_UPDATE_KEYS: [(&str, fn(Message) -> UpdateKind); 4] = [
    ("message", UpdateKind::Message),
    ("edited_message", UpdateKind::EditedMessage),
    ("channel_post", UpdateKind::ChannelPost),
    ("edited_channel_post", UpdateKind::EditedChannelPost),
];

/// One event delivered by the platform.
///
/// Identifiers observed by a single polling session are strictly
/// increasing; the poller relies on this to track its offset.
#[derive(Debug, Clone)]
pub struct Update {
    /// Monotonically increasing update identifier.
    pub update_id: i64,
    /// The payload variant.
    pub kind: UpdateKind,
}

impl Update {
    /// Decodes an update from its raw JSON envelope.
    ///
    /// Fails only when the envelope itself is unusable (not an object, or
    /// missing `update_id`). A payload that does not deserialize degrades
    /// to [`UpdateKind::Other`] with a warning.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let object = value.as_object().ok_or(ParseError::NotAnObject)?;
        let update_id = object
            .get("update_id")
            .and_then(Value::as_i64)
            .ok_or(ParseError::MissingUpdateId)?;

        for (key, wrap) in MESSAGE_UPDATE_KEYS {
            if let Some(payload) = object.get(key) {
                return Ok(Self {
                    update_id,
                    kind: decode_payload(update_id, key, payload, wrap, &value),
                });
            }
        }

        if let Some(payload) = object.get("callback_query") {
            return Ok(Self {
                update_id,
                kind: decode_payload(update_id, "callback_query", payload, UpdateKind::CallbackQuery, &value),
            });
        }

        if let Some(payload) = object.get("inline_query") {
            return Ok(Self {
                update_id,
                kind: decode_payload(update_id, "inline_query", payload, UpdateKind::InlineQuery, &value),
            });
        }

        Ok(Self {
            update_id,
            kind: UpdateKind::Other(value),
        })
    }

    /// Decodes an update from raw bytes (webhook bodies).
    pub fn from_slice(data: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(data)?;
        Self::from_value(value)
    }
}

/// Deserializes one payload, degrading to `Other` on failure.
fn decode_payload<T: serde::de::DeserializeOwned>(
    update_id: i64,
    key: &'static str,
    payload: &Value,
    wrap: fn(T) -> UpdateKind,
    envelope: &Value,
) -> UpdateKind {
    match serde_json::from_value::<T>(payload.clone()) {
        Ok(decoded) => wrap(decoded),
        Err(error) => {
            warn!(update_id, kind = key, error = %error, "undecodable payload, carrying as raw");
            UpdateKind::Other(envelope.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_update(id: i64, text: &str) -> Value {
        json!({
            "update_id": id,
            "message": {
                "message_id": 100 + id,
                "chat": {"id": 7, "type": "private"},
                "from": {"id": 42, "first_name": "Ada", "username": "ada"},
                "text": text,
            }
        })
    }

    #[test]
    fn parses_text_message() {
        let update = Update::from_value(text_update(5, "hello")).unwrap();
        assert_eq!(update.update_id, 5);
        let UpdateKind::Message(message) = update.kind else {
            panic!("expected message kind");
        };
        assert_eq!(message.text.as_deref(), Some("hello"));
        assert_eq!(message.chat.kind, ChatKind::Private);
        assert_eq!(message.from.unwrap().display_name(), "Ada (ada)");
    }

    #[test]
    fn parses_callback_query() {
        let update = Update::from_value(json!({
            "update_id": 9,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 1, "first_name": "Ada"},
                "data": "buttonclick-yes",
                "message": {
                    "message_id": 3,
                    "chat": {"id": 7, "type": "group"},
                }
            }
        }))
        .unwrap();
        let UpdateKind::CallbackQuery(query) = update.kind else {
            panic!("expected callback kind");
        };
        assert_eq!(query.data.as_deref(), Some("buttonclick-yes"));
        assert!(query.message.unwrap().chat.kind.is_group());
    }

    #[test]
    fn unknown_kind_is_carried_as_other() {
        let update = Update::from_value(json!({
            "update_id": 11,
            "my_chat_member": {"whatever": true}
        }))
        .unwrap();
        assert!(matches!(update.kind, UpdateKind::Other(_)));
        assert_eq!(update.kind.name(), "other");
    }

    #[test]
    fn undecodable_payload_degrades_to_other() {
        // message present but not an object: envelope must still parse
        let update = Update::from_value(json!({
            "update_id": 12,
            "message": "not an object"
        }))
        .unwrap();
        assert_eq!(update.update_id, 12);
        assert!(matches!(update.kind, UpdateKind::Other(_)));
    }

    #[test]
    fn missing_update_id_is_an_error() {
        let err = Update::from_value(json!({"message": {}})).unwrap_err();
        assert!(matches!(err, ParseError::MissingUpdateId));
    }

    #[test]
    fn attachment_probe_follows_declared_order() {
        let update = Update::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "chat": {"id": 7, "type": "private"},
                "photo": [{"file_id": "p"}],
                "sticker": {"file_id": "s"},
            }
        }))
        .unwrap();
        let UpdateKind::Message(message) = update.kind else {
            panic!("expected message kind");
        };
        // photo precedes sticker in ATTACHMENT_KINDS
        let (kind, _) = message.attachment().unwrap();
        assert_eq!(kind, "photo");
    }
}
