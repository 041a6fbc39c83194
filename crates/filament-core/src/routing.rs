//! Handler table for the filament engine.
//!
//! The [`Router`] is an ordered registry of (matcher, handler) entries,
//! partitioned by update category:
//!
//! - **commands**: regex over message text
//! - **callbacks**: regex over callback query data
//! - **inlines**: regex over inline query text
//! - **attachments**: exact attachment kind tag (photo, sticker, ...)
//!
//! plus per-category default handlers for unmatched updates.
//!
//! # Resolution
//!
//! [`Router::resolve`] walks the entries of the update's category in
//! registration order and returns the first whose matcher succeeds.
//! Applications rely on registering specific patterns before generic ones,
//! so the tie-break is strictly first-registered-wins. Resolution has no
//! side effects; executing the chosen handler is the dispatcher's job.
//!
//! # Immutability
//!
//! Entries are registered while the application is being assembled. Once
//! the dispatch loop starts the router is behind an `Arc` and never
//! mutated again.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::chat::{Callback, Chat, Inline};
use crate::error::{HandlerResult, PatternError};
use crate::update::{CallbackQuery, InlineQuery, Message, Update, UpdateKind};

// =============================================================================
// Handler types
// =============================================================================

/// Handler for a matched text command.
pub type CommandHandler =
    Arc<dyn Fn(Chat, TextMatch) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Handler for a matched callback query.
pub type CallbackHandler =
    Arc<dyn Fn(Chat, Callback, TextMatch) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Handler for a matched inline query.
pub type InlineHandler =
    Arc<dyn Fn(Inline, TextMatch) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Handler for a message carrying an attachment; receives the raw payload.
pub type AttachmentHandler =
    Arc<dyn Fn(Chat, Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Default handler for unmatched text messages.
pub type DefaultMessageHandler =
    Arc<dyn Fn(Chat, Message) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Default handler for unmatched callback queries.
pub type DefaultCallbackHandler =
    Arc<dyn Fn(Chat, Callback) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Default handler for unmatched inline queries.
pub type DefaultInlineHandler =
    Arc<dyn Fn(Inline) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// The text a pattern matched against, with its capture groups made owned.
#[derive(Debug, Clone)]
pub struct TextMatch {
    text: String,
    groups: Vec<Option<String>>,
}

impl TextMatch {
    fn capture(pattern: &Regex, text: &str) -> Option<Self> {
        let captures = pattern.captures(text)?;
        Some(Self {
            text: text.to_string(),
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        })
    }

    /// The full text the pattern was matched against.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Capture group by index; group 0 is the whole match.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|group| group.as_deref())
    }
}

/// Compiles a registration pattern.
///
/// Patterns are searched case-insensitively and unanchored, matching the
/// original framework's semantics.
fn compile(pattern: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError {
            pattern: pattern.to_string(),
            source,
        })
}

// =============================================================================
// Router
// =============================================================================

/// Ordered registry of handlers, partitioned by update category.
#[derive(Default)]
pub struct Router {
    commands: Vec<(Regex, CommandHandler)>,
    callbacks: Vec<(Regex, CallbackHandler)>,
    inlines: Vec<(Regex, InlineHandler)>,
    attachments: Vec<(&'static str, AttachmentHandler)>,
    default_message: Option<DefaultMessageHandler>,
    default_callback: Option<DefaultCallbackHandler>,
    default_inline: Option<DefaultInlineHandler>,
    default_in_groups: bool,
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the message and callback defaults fire in group chats too.
    ///
    /// By default they only fire for one-to-one conversations, so a bot
    /// sitting in a group does not answer every message.
    pub fn default_in_groups(&mut self, enabled: bool) {
        self.default_in_groups = enabled;
    }

    /// Registers a command handler for messages whose text matches `pattern`.
    pub fn command<F, Fut>(&mut self, pattern: &str, handler: F) -> Result<(), PatternError>
    where
        F: Fn(Chat, TextMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let pattern = compile(pattern)?;
        self.commands
            .push((pattern, Arc::new(move |chat, m| handler(chat, m).boxed())));
        Ok(())
    }

    /// Registers a callback handler for queries whose data matches `pattern`.
    pub fn callback<F, Fut>(&mut self, pattern: &str, handler: F) -> Result<(), PatternError>
    where
        F: Fn(Chat, Callback, TextMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let pattern = compile(pattern)?;
        self.callbacks
            .push((pattern, Arc::new(move |chat, cb, m| handler(chat, cb, m).boxed())));
        Ok(())
    }

    /// Registers an inline handler for queries whose text matches `pattern`.
    pub fn inline<F, Fut>(&mut self, pattern: &str, handler: F) -> Result<(), PatternError>
    where
        F: Fn(Inline, TextMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let pattern = compile(pattern)?;
        self.inlines
            .push((pattern, Arc::new(move |iq, m| handler(iq, m).boxed())));
        Ok(())
    }

    /// Registers a handler for messages carrying an attachment of `kind`.
    ///
    /// See [`ATTACHMENT_KINDS`](crate::update::ATTACHMENT_KINDS) for the
    /// recognized tags.
    pub fn attachment<F, Fut>(&mut self, kind: &'static str, handler: F)
    where
        F: Fn(Chat, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.attachments
            .push((kind, Arc::new(move |chat, payload| handler(chat, payload).boxed())));
    }

    /// Sets the default handler for unmatched text messages.
    pub fn default_message<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Chat, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.default_message = Some(Arc::new(move |chat, message| handler(chat, message).boxed()));
    }

    /// Sets the default handler for unmatched callback queries.
    pub fn default_callback<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Chat, Callback) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.default_callback = Some(Arc::new(move |chat, cb| handler(chat, cb).boxed()));
    }

    /// Sets the default handler for unmatched inline queries.
    pub fn default_inline<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Inline) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.default_inline = Some(Arc::new(move |iq| handler(iq).boxed()));
    }

    /// Resolves an update to at most one handler entry.
    ///
    /// Returns `None` when nothing matches; the dispatcher drops such
    /// updates silently.
    pub fn resolve(&self, update: &Update) -> Option<Resolved> {
        match &update.kind {
            UpdateKind::Message(message)
            | UpdateKind::EditedMessage(message)
            | UpdateKind::ChannelPost(message)
            | UpdateKind::EditedChannelPost(message) => self.resolve_message(message),
            UpdateKind::CallbackQuery(query) => self.resolve_callback(query),
            UpdateKind::InlineQuery(query) => self.resolve_inline(query),
            UpdateKind::Other(_) => None,
        }
    }

    fn resolve_message(&self, message: &Message) -> Option<Resolved> {
        // Attachments are checked before command patterns; a message with
        // both never reaches the text handlers.
        if let Some((kind, payload)) = message.attachment() {
            let handler = self
                .attachments
                .iter()
                .find(|(registered, _)| *registered == kind)
                .map(|(_, handler)| Arc::clone(handler))?;
            return Some(Resolved::Attachment {
                handler,
                message: message.clone(),
                kind,
                payload: payload.clone(),
            });
        }

        let text = message.text.as_deref()?;
        for (pattern, handler) in &self.commands {
            if let Some(matched) = TextMatch::capture(pattern, text) {
                return Some(Resolved::Command {
                    handler: Arc::clone(handler),
                    message: message.clone(),
                    matched,
                });
            }
        }

        if !message.chat.kind.is_group() || self.default_in_groups {
            let handler = Arc::clone(self.default_message.as_ref()?);
            return Some(Resolved::DefaultMessage {
                handler,
                message: message.clone(),
            });
        }
        None
    }

    fn resolve_callback(&self, query: &CallbackQuery) -> Option<Resolved> {
        // Without the originating message there is no chat to respond
        // through; such queries are dropped.
        let message = query.message.as_ref()?;
        let data = query.data.as_deref().unwrap_or("");

        for (pattern, handler) in &self.callbacks {
            if let Some(matched) = TextMatch::capture(pattern, data) {
                return Some(Resolved::Callback {
                    handler: Arc::clone(handler),
                    message: message.clone(),
                    query: query.clone(),
                    matched,
                });
            }
        }

        if !message.chat.kind.is_group() || self.default_in_groups {
            let handler = Arc::clone(self.default_callback.as_ref()?);
            return Some(Resolved::DefaultCallback {
                handler,
                message: message.clone(),
                query: query.clone(),
            });
        }
        None
    }

    fn resolve_inline(&self, query: &InlineQuery) -> Option<Resolved> {
        for (pattern, handler) in &self.inlines {
            if let Some(matched) = TextMatch::capture(pattern, &query.query) {
                return Some(Resolved::Inline {
                    handler: Arc::clone(handler),
                    query: query.clone(),
                    matched,
                });
            }
        }
        let handler = Arc::clone(self.default_inline.as_ref()?);
        Some(Resolved::DefaultInline {
            handler,
            query: query.clone(),
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("commands", &self.commands.len())
            .field("callbacks", &self.callbacks.len())
            .field("inlines", &self.inlines.len())
            .field("attachments", &self.attachments.len())
            .field("has_default_message", &self.default_message.is_some())
            .finish()
    }
}

// =============================================================================
// Resolved entries
// =============================================================================

/// The outcome of a successful resolution: the chosen handler plus the
/// owned payload pieces needed to invoke it.
pub enum Resolved {
    /// A command pattern matched the message text.
    Command {
        handler: CommandHandler,
        message: Message,
        matched: TextMatch,
    },
    /// A registered attachment kind was present on the message.
    Attachment {
        handler: AttachmentHandler,
        message: Message,
        kind: &'static str,
        payload: Value,
    },
    /// No command matched and the message default applies.
    DefaultMessage {
        handler: DefaultMessageHandler,
        message: Message,
    },
    /// A callback pattern matched the query data.
    Callback {
        handler: CallbackHandler,
        message: Message,
        query: CallbackQuery,
        matched: TextMatch,
    },
    /// No callback pattern matched and the callback default applies.
    DefaultCallback {
        handler: DefaultCallbackHandler,
        message: Message,
        query: CallbackQuery,
    },
    /// An inline pattern matched the query text.
    Inline {
        handler: InlineHandler,
        query: InlineQuery,
        matched: TextMatch,
    },
    /// No inline pattern matched and the inline default applies.
    DefaultInline {
        handler: DefaultInlineHandler,
        query: InlineQuery,
    },
}

impl Resolved {
    /// Category label for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Attachment { .. } => "attachment",
            Self::DefaultMessage { .. } => "default",
            Self::Callback { .. } => "callback",
            Self::DefaultCallback { .. } => "default_callback",
            Self::Inline { .. } => "inline",
            Self::DefaultInline { .. } => "default_inline",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(value: Value) -> Update {
        Update::from_value(value).unwrap()
    }

    fn text_update(chat_type: &str, text: &str) -> Update {
        update(json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "chat": {"id": 7, "type": chat_type},
                "text": text,
            }
        }))
    }

    fn noop_command() -> impl Fn(Chat, TextMatch) -> futures::future::Ready<HandlerResult> {
        |_, _| futures::future::ready(Ok(()))
    }

    #[test]
    fn first_registered_pattern_wins() {
        let mut router = Router::new();
        router.command(r"/echo (.+)", noop_command()).unwrap();
        router.command(r".*", noop_command()).unwrap();

        let resolved = router.resolve(&text_update("private", "/echo hi")).unwrap();
        let Resolved::Command { matched, .. } = resolved else {
            panic!("expected command resolution");
        };
        // the specific pattern matched, so group 1 carries the echo payload
        assert_eq!(matched.group(1), Some("hi"));

        let resolved = router.resolve(&text_update("private", "hello")).unwrap();
        let Resolved::Command { matched, .. } = resolved else {
            panic!("expected command resolution");
        };
        assert_eq!(matched.group(1), None);
        assert_eq!(matched.text(), "hello");
    }

    #[test]
    fn attachment_takes_precedence_over_text() {
        let mut router = Router::new();
        router.command(r".*", noop_command()).unwrap();
        router.attachment("photo", |_, _| futures::future::ready(Ok(())));

        let resolved = router
            .resolve(&update(json!({
                "update_id": 2,
                "message": {
                    "message_id": 2,
                    "chat": {"id": 7, "type": "private"},
                    "text": "/echo with photo",
                    "photo": [{"file_id": "abc"}],
                }
            })))
            .unwrap();
        assert!(matches!(resolved, Resolved::Attachment { kind: "photo", .. }));
    }

    #[test]
    fn unregistered_attachment_is_dropped() {
        let mut router = Router::new();
        router.command(r".*", noop_command()).unwrap();

        let resolved = router.resolve(&update(json!({
            "update_id": 3,
            "message": {
                "message_id": 3,
                "chat": {"id": 7, "type": "private"},
                "text": "caption",
                "sticker": {"file_id": "s"},
            }
        })));
        assert!(resolved.is_none());
    }

    #[test]
    fn message_default_respects_group_setting() {
        let mut router = Router::new();
        router.default_message(|_, _| futures::future::ready(Ok(())));

        assert!(matches!(
            router.resolve(&text_update("private", "anything")),
            Some(Resolved::DefaultMessage { .. })
        ));
        assert!(router.resolve(&text_update("group", "anything")).is_none());

        router.default_in_groups(true);
        assert!(matches!(
            router.resolve(&text_update("group", "anything")),
            Some(Resolved::DefaultMessage { .. })
        ));
    }

    #[test]
    fn callback_routing_matches_data() {
        let mut router = Router::new();
        router
            .callback(r"buttonclick-(.+)", |_, _, _| futures::future::ready(Ok(())))
            .unwrap();

        let resolved = router
            .resolve(&update(json!({
                "update_id": 4,
                "callback_query": {
                    "id": "cb",
                    "from": {"id": 1, "first_name": "Ada"},
                    "data": "buttonclick-yes",
                    "message": {"message_id": 5, "chat": {"id": 7, "type": "private"}},
                }
            })))
            .unwrap();
        let Resolved::Callback { matched, .. } = resolved else {
            panic!("expected callback resolution");
        };
        assert_eq!(matched.group(1), Some("yes"));
    }

    #[test]
    fn callback_without_message_is_dropped() {
        let mut router = Router::new();
        router
            .callback(r".*", |_, _, _| futures::future::ready(Ok(())))
            .unwrap();

        let resolved = router.resolve(&update(json!({
            "update_id": 5,
            "callback_query": {
                "id": "cb",
                "from": {"id": 1, "first_name": "Ada"},
                "data": "x",
            }
        })));
        assert!(resolved.is_none());
    }

    #[test]
    fn inline_routing_falls_back_to_default() {
        let mut router = Router::new();
        router
            .inline(r"find (.+)", |_, _| futures::future::ready(Ok(())))
            .unwrap();
        router.default_inline(|_| futures::future::ready(Ok(())));

        let inline_update = |query: &str| {
            update(json!({
                "update_id": 6,
                "inline_query": {
                    "id": "iq",
                    "from": {"id": 1, "first_name": "Ada"},
                    "query": query,
                }
            }))
        };

        assert!(matches!(
            router.resolve(&inline_update("find cats")),
            Some(Resolved::Inline { .. })
        ));
        assert!(matches!(
            router.resolve(&inline_update("something else")),
            Some(Resolved::DefaultInline { .. })
        ));
    }

    #[test]
    fn bad_pattern_is_reported() {
        let mut router = Router::new();
        let err = router.command(r"(unclosed", noop_command()).unwrap_err();
        assert_eq!(err.pattern, "(unclosed");
    }
}
