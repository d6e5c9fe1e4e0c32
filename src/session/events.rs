//! Applying protocol events to the session.

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use super::Session;
use crate::commands::SERVICE_SHORTCUTS;
use crate::conversation::{ConversationKey, ConversationType};
use crate::message::{classify_text, EventColor, Message, MessageKind, SYSTEM_SENDER};
use crate::protocol::ProtocolEvent;
use crate::validation::is_channel_name;

/// ERR_NOPRIVILEGES
const ERR_NOPRIVILEGES: u16 = 481;
/// ERR_CHANOPRIVSNEEDED
const ERR_CHANOPRIVSNEEDED: u16 = 482;

/// True for the network services we give their own conversation type.
pub(crate) fn is_service_name(nick: &str) -> bool {
    SERVICE_SHORTCUTS
        .iter()
        .any(|s| s.service.eq_ignore_ascii_case(nick))
}

fn with_reason(text: String, reason: Option<&str>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!("{} ({})", text, r),
        _ => text,
    }
}

impl Session {
    /// Apply one inbound event. Called from the connection's event pump, in
    /// network order.
    pub(crate) fn handle_event(&self, event: ProtocolEvent) {
        trace!(?event, "Protocol event");
        match event {
            ProtocolEvent::MessageReceived {
                target,
                sender,
                text,
                notice,
                server_time,
            } => self.on_message(&target, &sender, &text, notice, server_time),
            ProtocolEvent::UserJoined { channel, nick } => self.on_join(&channel, &nick),
            ProtocolEvent::UserLeft {
                channel,
                nick,
                reason,
            } => self.on_part(&channel, &nick, reason.as_deref()),
            ProtocolEvent::UserQuit { nick, reason } => self.on_quit(&nick, reason.as_deref()),
            ProtocolEvent::UserKicked {
                channel,
                nick,
                by,
                reason,
            } => self.on_kick(&channel, &nick, &by, reason.as_deref()),
            ProtocolEvent::NickChanged { old, new } => self.on_nick(&old, &new),
            ProtocolEvent::TopicChanged {
                channel,
                topic,
                set_by,
            } => self.on_topic(&channel, &topic, set_by.as_deref()),
            ProtocolEvent::RosterSnapshot { channel } => {
                self.inner.conversations.refresh_roster(&channel)
            }
            ProtocolEvent::ServerReply { code, target, text } => {
                self.on_reply(code, target.as_deref(), &text)
            }
            ProtocolEvent::ConnectionLost { reason } => {
                self.inner.connection.connection_lost(&reason);
                self.fail_waiters();
                self.inner.conversations.notify_error(
                    &ConversationKey::server_status(),
                    &format!("Connection lost: {}", reason),
                );
            }
            ProtocolEvent::ConnectionError { message } => {
                self.inner.connection.fail(&message);
                self.fail_waiters();
                self.inner.conversations.notify_error(
                    &ConversationKey::server_status(),
                    &format!("Connection error: {}", message),
                );
            }
        }
    }

    /// Pick the conversation an inbound PRIVMSG or NOTICE belongs to.
    fn route(&self, target: &str, sender: &str, notice: bool, from_self: bool) -> ConversationKey {
        if is_channel_name(target) {
            return ConversationKey::channel(target);
        }
        if from_self {
            // Echo of something we sent to `target`
            return self.conversation_for_nick(target);
        }
        if sender.is_empty() || sender.contains('.') {
            return ConversationKey::server_status();
        }
        let open = self
            .inner
            .conversations
            .find(sender, ConversationType::PrivateMessage)
            .is_some();
        if notice && !open && !is_service_name(sender) {
            return ConversationKey::server_status();
        }
        self.conversation_for_nick(sender)
    }

    fn on_message(
        &self,
        target: &str,
        sender: &str,
        text: &str,
        notice: bool,
        server_time: Option<DateTime<Utc>>,
    ) {
        let identity = &self.inner.identity;
        let from_self = identity.is_self(sender);
        let key = self.route(target, sender, notice, from_self);

        let (kind, body) = if notice {
            (MessageKind::Notice, text)
        } else {
            classify_text(text)
        };
        let mentions = !from_self && !key.is_server_status() && identity.is_mentioned(body);
        let sender = if sender.is_empty() { SYSTEM_SENDER } else { sender };

        let mut message = Message::new(&key, sender, body)
            .with_kind(kind)
            .from_self(from_self)
            .mentioning(mentions);
        if let Some(time) = server_time {
            // Replays of a tagged message share its identity
            message = message.with_timestamp(time);
        }
        let (_, message) = self.inner.conversations.append(message);
        self.inner.notifications.process(&message, &key);
    }

    /// Event line in an open conversation; dropped if it is not open.
    fn post_event(&self, key: &ConversationKey, text: &str, color: EventColor) {
        if self.inner.conversations.get(key).is_none() {
            return;
        }
        self.inner
            .conversations
            .append(Message::new(key, SYSTEM_SENDER, text).with_event(color));
    }

    /// Channel conversations whose roster still lists `nick`.
    fn channels_with(&self, nick: &str) -> Vec<ConversationKey> {
        self.inner
            .conversations
            .conversations()
            .iter()
            .filter(|c| c.kind() == ConversationType::Channel)
            .filter(|c| {
                self.inner
                    .adapter
                    .channel(c.name())
                    .is_some_and(|roster| roster.get_user(nick).is_some())
            })
            .map(|c| c.key().clone())
            .collect()
    }

    fn on_join(&self, channel: &str, nick: &str) {
        let key = ConversationKey::channel(channel);
        if self.inner.identity.is_self(nick) {
            self.inner.conversations.join_channel(channel);
            self.post_event(&key, &format!("You joined {}", channel), EventColor::Join);
        } else {
            self.post_event(&key, &format!("{} joined {}", nick, channel), EventColor::Join);
        }
        self.inner.conversations.refresh_roster(channel);
    }

    /// We are no longer in `channel`, whichever way we left.
    fn forget_channel(&self, channel: &str) {
        self.inner.topics.remove(&channel.to_lowercase());
        self.inner.conversations.remove_channel(channel);
        self.inner.conversations.acknowledge_part(channel);
    }

    fn on_part(&self, channel: &str, nick: &str, reason: Option<&str>) {
        if !self.inner.identity.is_self(nick) {
            let key = ConversationKey::channel(channel);
            let text = with_reason(format!("{} left {}", nick, channel), reason);
            self.post_event(&key, &text, EventColor::Part);
            self.inner.conversations.refresh_roster(channel);
            return;
        }

        self.forget_channel(channel);
        let waiters = self
            .inner
            .pending_parts
            .lock()
            .remove(&channel.to_lowercase())
            .unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(());
        }
        self.inner
            .conversations
            .notify(&ConversationKey::server_status(), &format!("You left {}", channel));
    }

    fn on_kick(&self, channel: &str, nick: &str, by: &str, reason: Option<&str>) {
        if self.inner.identity.is_self(nick) {
            warn!(channel = %channel, by = %by, "Kicked from channel");
            self.forget_channel(channel);
            let text = with_reason(format!("You were kicked from {} by {}", channel, by), reason);
            self.inner
                .conversations
                .notify_error(&ConversationKey::server_status(), &text);
            return;
        }

        let key = ConversationKey::channel(channel);
        let text = with_reason(format!("{} was kicked by {}", nick, by), reason);
        self.post_event(&key, &text, EventColor::Kick);
        self.inner.conversations.refresh_roster(channel);
    }

    fn on_quit(&self, nick: &str, reason: Option<&str>) {
        let text = with_reason(format!("{} quit", nick), reason);
        self.post_event(&ConversationKey::private(nick), &text, EventColor::Quit);
        for key in self.channels_with(nick) {
            self.post_event(&key, &text, EventColor::Quit);
            self.inner.conversations.refresh_roster(&key.name);
        }
    }

    fn on_nick(&self, old: &str, new: &str) {
        if self.inner.identity.is_self(old) {
            self.inner.identity.set_nickname(new);
            debug!(old = %old, new = %new, "Own nickname changed");
            self.inner.conversations.notify(
                &ConversationKey::server_status(),
                &format!("You are now known as {}", new),
            );
        }

        let text = format!("{} is now known as {}", old, new);
        self.post_event(&ConversationKey::private(old), &text, EventColor::NickChange);
        let mut channels = self.channels_with(new);
        for key in self.channels_with(old) {
            if !channels.contains(&key) {
                channels.push(key);
            }
        }
        for key in channels {
            self.post_event(&key, &text, EventColor::NickChange);
            self.inner.conversations.refresh_roster(&key.name);
        }
    }

    fn on_topic(&self, channel: &str, topic: &str, set_by: Option<&str>) {
        let slot = channel.to_lowercase();
        self.inner.topics.insert(slot.clone(), topic.to_string());

        let waiters = self.inner.pending_topics.lock().remove(&slot).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(Ok(topic.to_string()));
        }

        let text = match set_by {
            Some(by) => format!("{} changed the topic to: {}", by, topic),
            None => format!("Topic for {}: {}", channel, topic),
        };
        self.post_event(&ConversationKey::channel(channel), &text, EventColor::Topic);
    }

    fn on_reply(&self, code: u16, target: Option<&str>, text: &str) {
        let key = match target {
            Some(t) if is_channel_name(t) => ConversationKey::channel(t),
            Some(t) => self
                .inner
                .conversations
                .find(t, ConversationType::PrivateMessage)
                .map(|c| c.key().clone())
                .unwrap_or_else(ConversationKey::server_status),
            None => ConversationKey::server_status(),
        };

        match code {
            ERR_NOPRIVILEGES | ERR_CHANOPRIVSNEEDED => {
                let reason = format!("Permission denied: {}", text);
                debug!(code, target = ?target, "Server refused a privileged command");
                self.inner.conversations.notify_error(&key, &reason);
                if let Some(channel) = target.filter(|t| is_channel_name(t)) {
                    let waiters = self
                        .inner
                        .pending_topics
                        .lock()
                        .remove(&channel.to_lowercase())
                        .unwrap_or_default();
                    for waiter in waiters {
                        let _ = waiter.send(Err(reason.clone()));
                    }
                }
            }
            400..=599 => {
                self.inner.conversations.notify_error(&key, text);
            }
            _ => {
                self.inner.conversations.notify(&key, text);
            }
        }
    }
}
