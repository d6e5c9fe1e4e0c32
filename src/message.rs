//! Immutable chat messages and their deduplication identity.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::conversation::{ConversationKey, ConversationType};

/// Sender shown on synthetic messages produced by the client itself.
pub const SYSTEM_SENDER: &str = "*";

static LAST_STAMP_NANOS: AtomicI64 = AtomicI64::new(0);

/// Current wall-clock time, strictly increasing across calls in this process.
///
/// Two locally stamped messages never share a timestamp, so only true
/// re-deliveries of the same event collapse to one [`MessageId`].
pub fn now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let prev = match LAST_STAMP_NANOS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(wall.max(last.saturating_add(1)))
    }) {
        Ok(prev) | Err(prev) => prev,
    };
    DateTime::from_timestamp_nanos(wall.max(prev.saturating_add(1)))
}

/// Message kind for special rendering and alert decisions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MessageKind {
    Text,
    /// `/me` messages
    Action,
    Notice,
    /// Joins, parts, topic changes and other non-chat events
    Event,
}

/// Display-only classification for event messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EventColor {
    Join,
    Part,
    Quit,
    NickChange,
    Topic,
    Kick,
    Mode,
    System,
    Error,
}

/// Identity used to suppress duplicate alerts: (timestamp, sender, content hash).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub content_hash: u64,
}

/// A single message in a conversation. Never mutated once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub sender: String,
    /// Message text, empty for pure events.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub conversation_type: ConversationType,
    pub conversation_name: String,
    /// Sent by the local user.
    pub from_self: bool,
    /// Mentions the local user's nickname.
    pub mentions_self: bool,
    pub event_color: Option<EventColor>,
}

impl Message {
    pub fn new(conversation: &ConversationKey, sender: &str, content: &str) -> Self {
        Self {
            sender: sender.to_string(),
            content: content.to_string(),
            timestamp: now(),
            kind: MessageKind::Text,
            conversation_type: conversation.kind,
            conversation_name: conversation.name.clone(),
            from_self: false,
            mentions_self: false,
            event_color: None,
        }
    }

    /// A client-generated notice shown in `conversation`.
    pub fn system(conversation: &ConversationKey, text: &str) -> Self {
        Self::new(conversation, SYSTEM_SENDER, text).with_event(EventColor::System)
    }

    /// A client-generated error shown in `conversation`.
    pub fn error(conversation: &ConversationKey, text: &str) -> Self {
        Self::new(conversation, SYSTEM_SENDER, text).with_event(EventColor::Error)
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_event(mut self, color: EventColor) -> Self {
        self.kind = MessageKind::Event;
        self.event_color = Some(color);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn from_self(mut self, from_self: bool) -> Self {
        self.from_self = from_self;
        self
    }

    pub fn mentioning(mut self, mentions_self: bool) -> Self {
        self.mentions_self = mentions_self;
        self
    }

    /// The conversation this message belongs to.
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(&self.conversation_name, self.conversation_type)
    }

    /// Derived identity for alert deduplication.
    pub fn id(&self) -> MessageId {
        let mut hasher = DefaultHasher::new();
        self.content.hash(&mut hasher);
        MessageId {
            timestamp: self.timestamp,
            sender: self.sender.clone(),
            content_hash: hasher.finish(),
        }
    }
}

/// Split a CTCP ACTION (`\x01ACTION waves\x01`) from plain text.
pub fn classify_text(text: &str) -> (MessageKind, &str) {
    match text
        .strip_prefix("\x01ACTION ")
        .map(|rest| rest.strip_suffix('\x01').unwrap_or(rest))
    {
        Some(action) => (MessageKind::Action, action),
        None => (MessageKind::Text, text),
    }
}

/// Wrap text as a CTCP ACTION payload.
pub fn encode_action(text: &str) -> String {
    format!("\x01ACTION {}\x01", text)
}
