//! Conversation threads: identity, type and the append-only message log.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::message::Message;

/// Name of the singleton server status conversation.
pub const SERVER_STATUS_NAME: &str = "System";

/// What kind of peer a conversation talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ConversationType {
    /// Server notices and command output. Always present, never closed.
    ServerStatus,
    Channel,
    PrivateMessage,
    /// An automated services account (NickServ, ChanServ, ...).
    Service,
}

impl fmt::Display for ConversationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ServerStatus => "server",
            Self::Channel => "channel",
            Self::PrivateMessage => "private",
            Self::Service => "service",
        };
        f.write_str(label)
    }
}

/// Conversation identity: (name, type).
///
/// Names compare ASCII-case-insensitively; the spelling given at creation is
/// kept for display.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationKey {
    pub name: String,
    pub kind: ConversationType,
}

impl ConversationKey {
    pub fn new(name: &str, kind: ConversationType) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }

    pub fn server_status() -> Self {
        Self::new(SERVER_STATUS_NAME, ConversationType::ServerStatus)
    }

    pub fn channel(name: &str) -> Self {
        Self::new(name, ConversationType::Channel)
    }

    pub fn private(nick: &str) -> Self {
        Self::new(nick, ConversationType::PrivateMessage)
    }

    pub fn service(name: &str) -> Self {
        Self::new(name, ConversationType::Service)
    }

    /// True if this key names `name` with the given type.
    pub fn matches(&self, name: &str, kind: ConversationType) -> bool {
        self.kind == kind && self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_server_status(&self) -> bool {
        self.kind == ConversationType::ServerStatus
    }
}

impl PartialEq for ConversationKey {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.name, other.kind)
    }
}

impl Eq for ConversationKey {}

impl Hash for ConversationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        for b in self.name.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// A single conversation thread.
///
/// Appends are serialized by the per-conversation lock; two conversations
/// never contend with each other.
#[derive(Debug)]
pub struct Conversation {
    key: ConversationKey,
    messages: Mutex<Vec<Arc<Message>>>,
    /// Message count, for observers that want change notifications.
    revision: watch::Sender<usize>,
}

impl Conversation {
    pub fn new(key: ConversationKey) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            key,
            messages: Mutex::new(Vec::new()),
            revision,
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn kind(&self) -> ConversationType {
        self.key.kind
    }

    /// Snapshot of the message log in chronological order.
    pub fn messages(&self) -> Vec<Arc<Message>> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_message(&self) -> Option<Arc<Message>> {
        self.messages.lock().last().cloned()
    }

    /// Watch the message count of this conversation.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.revision.subscribe()
    }

    pub(crate) fn push(&self, message: Message) -> Arc<Message> {
        let message = Arc::new(message);
        let mut messages = self.messages.lock();
        messages.push(Arc::clone(&message));
        self.revision.send_replace(messages.len());
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_identity_ignores_case() {
        let a = ConversationKey::channel("#Rust");
        let b = ConversationKey::channel("#rust");
        let c = ConversationKey::private("#rust");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_push_keeps_order_and_revision() {
        let conv = Conversation::new(ConversationKey::channel("#test"));
        let rx = conv.subscribe();

        for i in 0..5 {
            conv.push(Message::new(conv.key(), "alice", &format!("msg{}", i)));
        }

        let contents: Vec<_> = conv.messages().iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["msg0", "msg1", "msg2", "msg3", "msg4"]);
        assert_eq!(*rx.borrow(), 5);
        assert_eq!(conv.last_message().unwrap().content, "msg4");
    }
}
