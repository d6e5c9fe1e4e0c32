//! Owns the ordered set of conversations and the roster projection.
//!
//! The conversation list is one observable value replaced copy-on-write, so
//! readers never see it torn. Message appends only take the lock of the
//! conversation they target.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::conversation::{Conversation, ConversationKey, ConversationType};
use crate::message::Message;
use crate::permissions::PrivilegeLevel;
use crate::protocol::ProtocolAdapter;
use crate::transcript::{TranscriptEntry, TranscriptLogger};

/// Snapshot of the conversation list, in creation order.
pub type ConversationList = Arc<Vec<Arc<Conversation>>>;

/// A roster member as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterMember {
    pub nick: String,
    pub prefix: Option<char>,
    pub level: PrivilegeLevel,
}

/// Roster of the conversation in view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum RosterView {
    #[default]
    Empty,
    Members {
        channel: String,
        members: Vec<RosterMember>,
    },
    /// The server confirmed we left `channel`. Replaced by the next view.
    Left { channel: String },
}

/// Sort by privilege (highest first), then nickname.
pub fn sort_members(members: &mut [RosterMember]) {
    members.sort_by(|a, b| {
        b.level
            .cmp(&a.level)
            .then_with(|| a.nick.to_lowercase().cmp(&b.nick.to_lowercase()))
    });
}

struct Transcript {
    network: String,
    logger: TranscriptLogger,
}

pub struct ConversationManager {
    adapter: Arc<dyn ProtocolAdapter>,
    list: watch::Sender<ConversationList>,
    roster: watch::Sender<RosterView>,
    transcript: RwLock<Option<Transcript>>,
}

impl ConversationManager {
    pub fn new(adapter: Arc<dyn ProtocolAdapter>) -> Self {
        let status = Arc::new(Conversation::new(ConversationKey::server_status()));
        let (list, _) = watch::channel(Arc::new(vec![status]));
        let (roster, _) = watch::channel(RosterView::Empty);
        Self {
            adapter,
            list,
            roster,
            transcript: RwLock::new(None),
        }
    }

    /// Write every appended message to `logger` under `network`.
    ///
    /// Returns the logger it replaces. Dropping a logger joins its writer
    /// thread, so callers drop it off the async runtime.
    #[must_use]
    pub fn enable_transcripts(
        &self,
        network: &str,
        logger: TranscriptLogger,
    ) -> Option<TranscriptLogger> {
        let previous = self.transcript.write().replace(Transcript {
            network: network.to_string(),
            logger,
        });
        previous.map(|t| t.logger)
    }

    /// Stop writing transcripts and hand back the active logger, if any.
    #[must_use]
    pub fn disable_transcripts(&self) -> Option<TranscriptLogger> {
        let previous = self.transcript.write().take();
        previous.map(|t| t.logger)
    }

    pub fn conversations(&self) -> ConversationList {
        self.list.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationList> {
        self.list.subscribe()
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &ConversationKey) -> Option<Arc<Conversation>> {
        self.list.borrow().iter().find(|c| c.key() == key).cloned()
    }

    pub fn find(&self, name: &str, kind: ConversationType) -> Option<Arc<Conversation>> {
        self.list
            .borrow()
            .iter()
            .find(|c| c.key().matches(name, kind))
            .cloned()
    }

    pub fn server_status(&self) -> Arc<Conversation> {
        // Created in new() and never removed
        match self.find(crate::conversation::SERVER_STATUS_NAME, ConversationType::ServerStatus) {
            Some(conv) => conv,
            None => self.ensure(&ConversationKey::server_status()).0,
        }
    }

    /// Existing conversation for `key`, or a new one appended to the list.
    fn ensure(&self, key: &ConversationKey) -> (Arc<Conversation>, bool) {
        if let Some(existing) = self.get(key) {
            return (existing, false);
        }

        let fresh = Arc::new(Conversation::new(key.clone()));
        let mut found = None;
        self.list.send_if_modified(|list| {
            if let Some(existing) = list.iter().find(|c| c.key() == key) {
                found = Some(existing.clone());
                return false;
            }
            Arc::make_mut(list).push(fresh.clone());
            true
        });

        match found {
            Some(existing) => (existing, false),
            None => {
                debug!(conversation = %key, "Conversation created");
                (fresh, true)
            }
        }
    }

    /// Open (or return) the private conversation with `nick`.
    pub fn start_private(&self, nick: &str) -> Arc<Conversation> {
        self.ensure(&ConversationKey::private(nick)).0
    }

    /// Open (or return) the conversation with a services account.
    pub fn start_service(&self, name: &str) -> Arc<Conversation> {
        self.ensure(&ConversationKey::service(name)).0
    }

    /// Record a joined channel.
    pub fn join_channel(&self, channel: &str) -> Arc<Conversation> {
        let (conv, created) = self.ensure(&ConversationKey::channel(channel));
        if created {
            info!(channel = %channel, "Channel conversation opened");
        }
        conv
    }

    /// Remove a conversation. The server status conversation is never removed.
    pub fn remove(&self, key: &ConversationKey) -> bool {
        if key.is_server_status() {
            debug!("Refusing to remove the server status conversation");
            return false;
        }
        let removed = self.list.send_if_modified(|list| {
            let before = list.len();
            if !list.iter().any(|c| c.key() == key) {
                return false;
            }
            Arc::make_mut(list).retain(|c| c.key() != key);
            list.len() != before
        });
        if removed {
            info!(conversation = %key, "Conversation closed");
        }
        removed
    }

    pub fn remove_channel(&self, channel: &str) -> bool {
        self.remove(&ConversationKey::channel(channel))
    }

    pub fn remove_private(&self, nick: &str) -> bool {
        self.remove(&ConversationKey::private(nick))
    }

    /// Append to the conversation named by the message, creating it first
    /// if needed.
    pub fn append(&self, message: Message) -> (Arc<Conversation>, Arc<Message>) {
        let (conv, _) = self.ensure(&message.conversation_key());
        if let Some(t) = self.transcript.read().as_ref() {
            t.logger.log(TranscriptEntry::from_message(&t.network, &message));
        }
        let message = conv.push(message);
        (conv, message)
    }

    /// Show a system line in `key`, or in the server status conversation if
    /// `key` no longer exists.
    pub fn notify(&self, key: &ConversationKey, text: &str) -> Arc<Message> {
        let conv = self.get(key).unwrap_or_else(|| self.server_status());
        conv.push(Message::system(conv.key(), text))
    }

    /// Like [`notify`](Self::notify) but marked as an error.
    pub fn notify_error(&self, key: &ConversationKey, text: &str) -> Arc<Message> {
        let conv = self.get(key).unwrap_or_else(|| self.server_status());
        conv.push(Message::error(conv.key(), text))
    }

    /// Drop every conversation except server status.
    pub fn clear(&self) {
        self.list.send_if_modified(|list| {
            if list.len() <= 1 {
                return false;
            }
            Arc::make_mut(list).retain(|c| c.key().is_server_status());
            true
        });
        self.roster.send_replace(RosterView::Empty);
    }

    /// Current roster of `channel`, sorted for display.
    pub fn roster(&self, channel: &str) -> Option<Vec<RosterMember>> {
        let roster = self.adapter.channel(channel)?;
        let mut members: Vec<RosterMember> = roster
            .members
            .iter()
            .map(|entry| RosterMember {
                nick: entry.nickname.clone(),
                prefix: entry.prefix(),
                level: PrivilegeLevel::from(entry),
            })
            .collect();
        sort_members(&mut members);
        Some(members)
    }

    pub fn roster_view(&self) -> RosterView {
        self.roster.borrow().clone()
    }

    pub fn subscribe_roster(&self) -> watch::Receiver<RosterView> {
        self.roster.subscribe()
    }

    /// Point the roster projection at `key` (channels only).
    pub fn show_roster(&self, key: Option<&ConversationKey>) {
        let view = match key {
            Some(k) if k.kind == ConversationType::Channel => match self.roster(&k.name) {
                Some(members) => RosterView::Members {
                    channel: k.name.clone(),
                    members,
                },
                None => RosterView::Empty,
            },
            _ => RosterView::Empty,
        };
        self.roster.send_replace(view);
    }

    /// Re-read the roster if `channel` is the one in view.
    pub fn refresh_roster(&self, channel: &str) {
        let showing = matches!(
            &*self.roster.borrow(),
            RosterView::Members { channel: c, .. } if c.eq_ignore_ascii_case(channel)
        );
        if showing {
            self.show_roster(Some(&ConversationKey::channel(channel)));
        }
    }

    /// Signal that we are no longer in `channel`, if its roster is in view.
    pub fn acknowledge_part(&self, channel: &str) {
        self.roster.send_if_modified(|view| {
            let showing = matches!(
                view,
                RosterView::Members { channel: c, .. } if c.eq_ignore_ascii_case(channel)
            );
            if showing {
                *view = RosterView::Left {
                    channel: channel.to_string(),
                };
            }
            showing
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockAdapter;

    fn manager() -> (ConversationManager, Arc<MockAdapter>) {
        let adapter = MockAdapter::new();
        (ConversationManager::new(adapter.clone()), adapter)
    }

    #[test]
    fn test_starts_with_server_status() {
        let (mgr, _) = manager();
        let list = mgr.conversations();
        assert_eq!(list.len(), 1);
        assert!(list[0].key().is_server_status());
    }

    #[test]
    fn test_start_private_is_idempotent() {
        let (mgr, _) = manager();
        let a = mgr.start_private("bob");
        let b = mgr.start_private("Bob");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(mgr.len(), 2);

        // Same name, different type, is a different conversation
        mgr.join_channel("bob");
        assert_eq!(mgr.len(), 3);
    }

    #[test]
    fn test_server_status_cannot_be_removed() {
        let (mgr, _) = manager();
        mgr.join_channel("#rust");
        assert!(!mgr.remove(&ConversationKey::server_status()));
        mgr.clear();
        assert_eq!(mgr.len(), 1);
        assert!(mgr.conversations()[0].key().is_server_status());
    }

    #[test]
    fn test_remove_channel_and_private() {
        let (mgr, _) = manager();
        mgr.join_channel("#rust");
        mgr.start_private("bob");
        assert!(mgr.remove_channel("#RUST"));
        assert!(!mgr.remove_channel("#rust"));
        assert!(mgr.remove_private("bob"));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_append_creates_on_first_reference() {
        let (mgr, _) = manager();
        let key = ConversationKey::private("carol");
        let (conv, msg) = mgr.append(Message::new(&key, "carol", "hello?"));
        assert_eq!(conv.kind(), ConversationType::PrivateMessage);
        assert_eq!(msg.content, "hello?");
        assert_eq!(mgr.find("carol", ConversationType::PrivateMessage).unwrap().len(), 1);
    }

    #[test]
    fn test_observers_see_list_changes() {
        let (mgr, _) = manager();
        let mut rx = mgr.subscribe();

        mgr.join_channel("#rust");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 2);

        // Re-joining changes nothing
        mgr.join_channel("#rust");
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_snapshot_is_not_torn_by_later_changes() {
        let (mgr, _) = manager();
        mgr.join_channel("#a");
        let snapshot = mgr.conversations();
        mgr.join_channel("#b");
        mgr.remove_channel("#a");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn test_notify_falls_back_to_server_status() {
        let (mgr, _) = manager();
        mgr.notify(&ConversationKey::channel("#gone"), "left #gone");
        assert_eq!(mgr.server_status().len(), 1);
        assert!(mgr.find("#gone", ConversationType::Channel).is_none());
    }

    #[test]
    fn test_roster_projection() {
        let (mgr, adapter) = manager();
        adapter.set_roster("#rust", &[("zed", ""), ("amy", "+"), ("Bob", "@"), ("cat", "%")]);

        let members = mgr.roster("#rust").unwrap();
        let nicks: Vec<_> = members.iter().map(|m| m.nick.as_str()).collect();
        assert_eq!(nicks, vec!["Bob", "cat", "amy", "zed"]);
        assert_eq!(members[0].prefix, Some('@'));
        assert!(mgr.roster("#none").is_none());

        let key = ConversationKey::channel("#rust");
        mgr.show_roster(Some(&key));
        assert!(matches!(mgr.roster_view(), RosterView::Members { ref members, .. } if members.len() == 4));

        adapter.set_roster("#rust", &[("Bob", "@")]);
        mgr.refresh_roster("#RUST");
        assert!(matches!(mgr.roster_view(), RosterView::Members { ref members, .. } if members.len() == 1));

        mgr.acknowledge_part("#rust");
        assert_eq!(
            mgr.roster_view(),
            RosterView::Left {
                channel: "#rust".into()
            }
        );
        // Only the channel in view is refreshed or acknowledged
        mgr.refresh_roster("#rust");
        assert!(matches!(mgr.roster_view(), RosterView::Left { .. }));
        mgr.acknowledge_part("#other");
        assert!(matches!(mgr.roster_view(), RosterView::Left { ref channel } if channel == "#rust"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_keep_every_message() {
        let (mgr, _) = manager();
        let mgr = Arc::new(mgr);
        let key = ConversationKey::channel("#busy");
        const PATHS: usize = 4;
        const PER_PATH: usize = 250;

        let tasks: Vec<_> = (0..PATHS)
            .map(|path| {
                let mgr = mgr.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    for i in 0..PER_PATH {
                        mgr.append(Message::new(&key, &format!("path{}", path), &i.to_string()));
                        if i % 16 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let conv = mgr.find("#busy", ConversationType::Channel).unwrap();
        let messages = conv.messages();
        assert_eq!(messages.len(), PATHS * PER_PATH);
        assert_eq!(mgr.len(), 2);

        for path in 0..PATHS {
            let sender = format!("path{}", path);
            let seq: Vec<usize> = messages
                .iter()
                .filter(|m| m.sender == sender)
                .map(|m| m.content.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..PER_PATH).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_disabling_transcripts_hands_back_the_logger() {
        let dir = tempfile::tempdir().unwrap();
        let (mgr, _) = manager();
        let logger = TranscriptLogger::new(dir.path().to_path_buf()).unwrap();
        assert!(mgr.enable_transcripts("libera", logger).is_none());

        let key = ConversationKey::channel("#rust");
        let (_, first) = mgr.append(Message::new(&key, "bob", "logged"));

        let logger = mgr.disable_transcripts().expect("active logger");
        assert!(mgr.disable_transcripts().is_none());
        // The manager keeps working while the caller still owns the logger
        mgr.append(Message::new(&key, "bob", "not logged"));
        drop(logger);

        let day = first
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d");
        let path = dir
            .path()
            .join("libera")
            .join("_rust")
            .join(format!("{}.log", day));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.ends_with("<bob> logged\n"));
    }
}
