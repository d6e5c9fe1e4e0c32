//! Decides which inbound messages alert the user, at most once per message.

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, trace};

use crate::conversation::{ConversationKey, ConversationType};
use crate::message::{self, Message, MessageId};

/// Characters of message text carried in an alert.
const PREVIEW_LEN: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertKind {
    Mention,
    PrivateMessage,
}

/// A pending user-visible alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub conversation: String,
    pub conversation_type: ConversationType,
    pub kind: AlertKind,
    pub sender: String,
    pub preview: String,
}

/// Alert decisions plus the state they depend on: the dedup set, per
/// conversation last-viewed times and the foregrounded conversation.
pub struct NotificationEngine {
    alerted: DashSet<MessageId>,
    last_viewed: DashMap<String, DateTime<Utc>>,
    foreground: RwLock<Option<ConversationKey>>,
    tx: Sender<Alert>,
    rx: Receiver<Alert>,
}

impl Default for NotificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationEngine {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            alerted: DashSet::new(),
            last_viewed: DashMap::new(),
            foreground: RwLock::new(None),
            tx,
            rx,
        }
    }

    /// Stream of alerts for the presentation layer.
    pub fn alerts(&self) -> Receiver<Alert> {
        self.rx.clone()
    }

    pub fn foreground(&self) -> Option<ConversationKey> {
        self.foreground.read().clone()
    }

    /// Bring `key` to the foreground. Both the conversation left and the one
    /// entered count as viewed now.
    pub fn set_foreground(&self, key: Option<ConversationKey>) {
        let previous = std::mem::replace(&mut *self.foreground.write(), key.clone());
        if let Some(prev) = previous {
            self.mark_viewed(&prev.name);
        }
        if let Some(key) = key {
            self.mark_viewed(&key.name);
        }
    }

    pub fn mark_viewed(&self, conversation: &str) {
        self.last_viewed
            .insert(conversation.to_ascii_lowercase(), message::now());
    }

    pub fn last_viewed(&self, conversation: &str) -> Option<DateTime<Utc>> {
        self.last_viewed
            .get(&conversation.to_ascii_lowercase())
            .map(|entry| *entry.value())
    }

    /// The alert `message` deserves in `conversation`, ignoring deduplication.
    pub fn decide(&self, message: &Message, conversation: &ConversationKey) -> Option<AlertKind> {
        if message.from_self {
            return None;
        }
        if self.foreground.read().as_ref() == Some(conversation) {
            return None;
        }
        if let Some(viewed) = self.last_viewed(&conversation.name) {
            if message.timestamp <= viewed {
                return None;
            }
        }
        if message.mentions_self {
            Some(AlertKind::Mention)
        } else if conversation.kind == ConversationType::PrivateMessage {
            Some(AlertKind::PrivateMessage)
        } else {
            None
        }
    }

    /// Decide, deduplicate and publish. Returns the alert if one was emitted.
    pub fn process(&self, message: &Message, conversation: &ConversationKey) -> Option<Alert> {
        let kind = self.decide(message, conversation)?;

        if !self.alerted.insert(message.id()) {
            trace!(conversation = %conversation.name, sender = %message.sender, "Duplicate alert suppressed");
            return None;
        }

        let alert = Alert {
            conversation: conversation.name.clone(),
            conversation_type: conversation.kind,
            kind,
            sender: message.sender.clone(),
            preview: message.content.chars().take(PREVIEW_LEN).collect(),
        };
        debug!(conversation = %alert.conversation, kind = ?kind, "Alert");
        // The engine holds a receiver, so this cannot fail
        let _ = self.tx.send(alert.clone());
        Some(alert)
    }

    pub fn alerted_count(&self) -> usize {
        self.alerted.len()
    }

    /// Forget everything. Only for full session teardown.
    pub fn reset(&self) {
        self.alerted.clear();
        self.last_viewed.clear();
        *self.foreground.write() = None;
        while self.rx.try_recv().is_ok() {}
    }
}
