//! Session orchestration.
//!
//! A [`Session`] ties the connection state machine, the conversation list,
//! permission checks, notifications and command dispatch to one protocol
//! adapter. It is a cheap handle: clones share the same session.

mod events;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::commands::{CommandRegistry, DispatchOutcome, Dispatcher, RawCommandAllowList};
use crate::config::SessionConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::conversation::{ConversationKey, ConversationType};
use crate::conversation_manager::{ConversationList, ConversationManager, RosterView};
use crate::error::{CommandError, RegistryError, SessionError};
use crate::identity::LocalIdentity;
use crate::message::{encode_action, Message, MessageKind};
use crate::notifications::{Alert, NotificationEngine};
use crate::permissions::PermissionValidator;
use crate::protocol::{ConnectParams, EventSink, ProtocolAdapter};
use crate::transcript::{self, TranscriptLogger};
use crate::validation::{
    is_channel_name, sanitize_message, validate_channel_name, validate_message, validate_nickname,
};
use crate::wire;

type Waiters<T> = Mutex<HashMap<String, Vec<oneshot::Sender<T>>>>;

enum Confirmation<T> {
    Confirmed(T),
    /// Sender dropped or connection scope ended.
    Dropped,
    TimedOut,
}

/// What happened to a line passed to [`Session::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Ran as a command.
    Command(crate::commands::CommandResult),
    /// Sent as a message to the conversation.
    Sent,
    /// Blank input.
    Ignored,
}

struct Inner {
    config: SessionConfig,
    adapter: Arc<dyn ProtocolAdapter>,
    identity: Arc<LocalIdentity>,
    connection: ConnectionManager,
    conversations: ConversationManager,
    notifications: NotificationEngine,
    permissions: PermissionValidator,
    dispatcher: Dispatcher,
    /// Last known topic per lowercased channel.
    topics: DashMap<String, String>,
    pending_topics: Waiters<Result<String, String>>,
    pending_parts: Waiters<()>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Session with the built-in commands.
    pub fn new(adapter: Arc<dyn ProtocolAdapter>, config: SessionConfig) -> Result<Self, RegistryError> {
        Ok(Self::with_registry(adapter, config, CommandRegistry::with_builtins()?))
    }

    pub fn with_registry(
        adapter: Arc<dyn ProtocolAdapter>,
        config: SessionConfig,
        registry: CommandRegistry,
    ) -> Self {
        let identity = Arc::new(LocalIdentity::new());
        let connection = ConnectionManager::new(adapter.clone(), config.connection_timeouts());
        let permissions =
            PermissionValidator::new(adapter.clone(), identity.clone(), connection.subscribe());
        let mut allowlist = RawCommandAllowList::default();
        allowlist.extend(&config.extra_raw_commands);
        let dispatcher = Dispatcher::new(config.command_prefix, registry, allowlist);

        Self {
            inner: Arc::new(Inner {
                conversations: ConversationManager::new(adapter.clone()),
                notifications: NotificationEngine::new(),
                topics: DashMap::new(),
                pending_topics: Mutex::new(HashMap::new()),
                pending_parts: Mutex::new(HashMap::new()),
                config,
                adapter,
                identity,
                connection,
                permissions,
                dispatcher,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Accessors and observables
    // ------------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn conversations(&self) -> &ConversationManager {
        &self.inner.conversations
    }

    pub fn notifications(&self) -> &NotificationEngine {
        &self.inner.notifications
    }

    pub fn permissions(&self) -> &PermissionValidator {
        &self.inner.permissions
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    pub fn subscribe_conversations(&self) -> watch::Receiver<ConversationList> {
        self.inner.conversations.subscribe()
    }

    pub fn subscribe_roster(&self) -> watch::Receiver<RosterView> {
        self.inner.conversations.subscribe_roster()
    }

    pub fn alerts(&self) -> Receiver<Alert> {
        self.inner.notifications.alerts()
    }

    /// Our nickname on the current connection.
    pub fn nickname(&self) -> Option<String> {
        self.inner.identity.nickname()
    }

    /// Cached topic of `channel`.
    pub fn topic(&self, channel: &str) -> Option<String> {
        self.inner
            .topics
            .get(&channel.to_lowercase())
            .map(|t| t.value().clone())
    }

    /// Bring a conversation to the foreground (or none).
    pub fn focus(&self, key: Option<&ConversationKey>) {
        self.inner.notifications.set_foreground(key.cloned());
        self.inner.conversations.show_roster(key);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn connect(&self, params: ConnectParams) -> Result<(), SessionError> {
        let status = ConversationKey::server_status();
        self.inner.conversations.notify(
            &status,
            &format!("Connecting to {} as {}...", params.server, params.nickname),
        );
        let result = self
            .inner
            .connection
            .connect(params, |scope| self.start_pump(scope))
            .await;
        self.after_connect(result)
    }

    /// Reconnect with the last parameters; a no-op while connected or connecting.
    pub async fn reconnect_if_needed(&self) -> Result<(), SessionError> {
        if matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            return Ok(());
        }
        let result = self
            .inner
            .connection
            .reconnect_if_needed(|scope| self.start_pump(scope))
            .await;
        self.after_connect(result)
    }

    pub async fn disconnect(&self, reason: Option<&str>) -> Result<(), SessionError> {
        let was_connected = self.is_connected();
        let reason = reason.unwrap_or(&self.inner.config.quit_message);
        self.inner.connection.disconnect(Some(reason)).await?;
        self.fail_waiters();
        if was_connected {
            self.inner
                .conversations
                .notify(&ConversationKey::server_status(), "Disconnected");
        }
        Ok(())
    }

    /// Cancel everything in flight and reset to a fresh, disconnected session.
    pub async fn teardown(&self) {
        self.inner.connection.teardown().await;
        self.fail_waiters();
        self.inner.conversations.clear();
        if let Some(logger) = self.inner.conversations.disable_transcripts() {
            // Flushes and joins the writer thread
            let _ = tokio::task::spawn_blocking(move || drop(logger)).await;
        }
        self.inner.notifications.reset();
        self.inner.topics.clear();
        self.inner.identity.clear();
        info!("Session torn down");
    }

    /// Spawn the event pump for one connection scope.
    fn start_pump(&self, scope: CancellationToken) -> EventSink {
        if let Some(params) = self.inner.connection.last_params() {
            self.inner.identity.set_nickname(&params.nickname);
        }

        let (sink, mut events) = EventSink::channel();
        let session = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => session.handle_event(event),
                        None => break,
                    },
                }
            }
            debug!("Event pump stopped");
        });
        sink
    }

    fn after_connect(&self, result: Result<(), SessionError>) -> Result<(), SessionError> {
        let status = ConversationKey::server_status();
        match &result {
            Ok(()) if self.is_connected() => {
                if let Some(params) = self.inner.connection.last_params() {
                    self.inner
                        .conversations
                        .notify(&status, &format!("Connected to {}", params.server));
                    self.start_transcripts(&params);
                    self.rejoin(&params.auto_join);
                }
            }
            Ok(()) => {}
            Err(e) => {
                self.inner
                    .conversations
                    .notify_error(&status, &format!("Connection failed: {}", e));
            }
        }
        result
    }

    /// Join the auto-join list plus every channel still open from before.
    fn rejoin(&self, auto_join: &[String]) {
        let mut channels: Vec<String> = Vec::new();
        let open = self.inner.conversations.conversations();
        let open = open
            .iter()
            .filter(|c| c.kind() == ConversationType::Channel)
            .map(|c| c.name().to_string());
        for channel in auto_join.iter().cloned().chain(open) {
            if channels.iter().any(|c| c.eq_ignore_ascii_case(&channel)) {
                continue;
            }
            if let Err(e) = validate_channel_name(&channel) {
                warn!(channel = %channel, error = %e, "Skipping auto-join");
                continue;
            }
            channels.push(channel);
        }
        for channel in channels {
            if self.send_line(&wire::join(&channel, None)).is_err() {
                break;
            }
        }
    }

    fn start_transcripts(&self, params: &ConnectParams) {
        let settings = &self.inner.config.transcripts;
        if !settings.enabled {
            return;
        }
        let Some(dir) = settings.directory.clone().or_else(transcript::default_directory) else {
            warn!("No data directory for transcripts");
            return;
        };
        match TranscriptLogger::new(dir) {
            Ok(logger) => {
                let previous = self
                    .inner
                    .conversations
                    .enable_transcripts(&params.server.host, logger);
                if let Some(previous) = previous {
                    tokio::task::spawn_blocking(move || drop(previous));
                }
            }
            Err(e) => warn!(error = %e, "Failed to start transcript writer"),
        }
    }

    /// Drop every pending confirmation wait; their callers see a failure.
    fn fail_waiters(&self) {
        self.inner.pending_topics.lock().clear();
        self.inner.pending_parts.lock().clear();
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Handle a line typed into `conversation`: a command if it carries the
    /// command prefix, otherwise a message to the conversation.
    pub async fn submit(&self, input: &str, conversation: &ConversationKey) -> SubmitOutcome {
        if input.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }
        match self.inner.dispatcher.dispatch(self, input, conversation).await {
            DispatchOutcome::Handled(result) => SubmitOutcome::Command(result),
            DispatchOutcome::NotHandled => match self.send_message(conversation, input) {
                Ok(_) => SubmitOutcome::Sent,
                Err(e) => {
                    self.inner
                        .conversations
                        .notify_error(conversation, &e.to_string());
                    SubmitOutcome::Command(crate::commands::failure(e.to_string()))
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // Outbound operations
    // ------------------------------------------------------------------

    /// Write one line to the adapter. A transport failure moves the
    /// connection to `Error` and reads as "not connected" to the caller.
    fn send_line(&self, line: &str) -> Result<(), CommandError> {
        if !self.is_connected() {
            return Err(CommandError::NotConnected);
        }
        trace!(line = %line, "Sending");
        if let Err(e) = self.inner.adapter.send_raw_line(line) {
            self.inner.connection.fail(&e.to_string());
            self.inner.conversations.notify_error(
                &ConversationKey::server_status(),
                &format!("Connection error: {}", e),
            );
            return Err(CommandError::NotConnected);
        }
        Ok(())
    }

    fn echo(&self, conversation: &ConversationKey, text: &str, kind: MessageKind) -> Arc<Message> {
        let nick = self.nickname().unwrap_or_default();
        let message = Message::new(conversation, &nick, text)
            .with_kind(kind)
            .from_self(true);
        self.inner.conversations.append(message).1
    }

    fn clean_text(text: &str) -> Result<String, CommandError> {
        let text = sanitize_message(text.trim_end());
        validate_message(&text)?;
        Ok(text)
    }

    /// Send `text` to the conversation's target and echo it locally.
    pub fn send_message(
        &self,
        conversation: &ConversationKey,
        text: &str,
    ) -> Result<Arc<Message>, CommandError> {
        if conversation.is_server_status() {
            return Err(CommandError::WrongContext(
                "Cannot send messages here. Use /msg or /raw".to_string(),
            ));
        }
        let text = Self::clean_text(text)?;
        self.send_line(&wire::privmsg(&conversation.name, &text))?;
        Ok(self.echo(conversation, &text, MessageKind::Text))
    }

    /// Message a nick or channel, opening a private conversation for nicks.
    pub fn send_private_message(&self, target: &str, text: &str) -> Result<Arc<Message>, CommandError> {
        let key = if is_channel_name(target) {
            ConversationKey::channel(target)
        } else {
            self.conversation_for_nick(target)
        };
        let text = Self::clean_text(text)?;
        self.send_line(&wire::privmsg(target, &text))?;
        Ok(self.echo(&key, &text, MessageKind::Text))
    }

    pub fn send_notice(&self, target: &str, text: &str) -> Result<(), CommandError> {
        let text = Self::clean_text(text)?;
        self.send_line(&wire::notice(target, &text))?;

        let existing = self
            .inner
            .conversations
            .conversations()
            .iter()
            .find(|c| !c.key().is_server_status() && c.name().eq_ignore_ascii_case(target))
            .map(|c| c.key().clone());
        match existing {
            Some(key) => {
                self.echo(&key, &text, MessageKind::Notice);
            }
            None => {
                self.inner.conversations.notify(
                    &ConversationKey::server_status(),
                    &format!("-> -{}- {}", target, text),
                );
            }
        }
        Ok(())
    }

    /// CTCP ACTION into a channel or private conversation.
    pub fn send_action(&self, conversation: &ConversationKey, text: &str) -> Result<Arc<Message>, CommandError> {
        if conversation.is_server_status() {
            return Err(CommandError::WrongContext(
                "Actions need a channel or private conversation".to_string(),
            ));
        }
        let text = Self::clean_text(text)?;
        self.send_line(&wire::privmsg(&conversation.name, &encode_action(&text)))?;
        Ok(self.echo(conversation, &text, MessageKind::Action))
    }

    /// Open (or return) the private conversation with `nick`.
    pub fn start_private_conversation(&self, nick: &str) -> Result<ConversationKey, CommandError> {
        validate_nickname(nick)?;
        Ok(self.conversation_for_nick(nick))
    }

    /// Service accounts get service conversations, everyone else a private one.
    fn conversation_for_nick(&self, nick: &str) -> ConversationKey {
        let conv = if events::is_service_name(nick) {
            self.inner.conversations.start_service(nick)
        } else {
            self.inner.conversations.start_private(nick)
        };
        conv.key().clone()
    }

    pub fn join_channel(&self, channel: &str, key: Option<&str>) -> Result<(), CommandError> {
        validate_channel_name(channel)?;
        self.send_line(&wire::join(channel, key))
    }

    /// Leave `channel` and wait for the server to confirm.
    pub async fn part_channel(&self, channel: &str, reason: Option<&str>) -> Result<(), CommandError> {
        let (tx, rx) = oneshot::channel();
        let slot = channel.to_lowercase();
        self.inner
            .pending_parts
            .lock()
            .entry(slot.clone())
            .or_default()
            .push(tx);
        if let Err(e) = self.send_line(&wire::part(channel, reason)) {
            prune(&self.inner.pending_parts, &slot);
            return Err(e);
        }

        match self
            .await_confirmation(rx, self.inner.config.part_timeout())
            .await
        {
            Confirmation::Confirmed(()) => Ok(()),
            Confirmation::Dropped => Err(CommandError::Rejected(format!(
                "Disconnected before leaving {} was confirmed",
                channel
            ))),
            Confirmation::TimedOut => {
                prune(&self.inner.pending_parts, &slot);
                Err(CommandError::Timeout(format!(
                    "No confirmation from the server for leaving {}",
                    channel
                )))
            }
        }
    }

    /// Change the topic of `channel` and wait for the server to echo it.
    pub async fn set_topic(&self, channel: &str, topic: &str) -> Result<String, CommandError> {
        let (tx, rx) = oneshot::channel();
        let slot = channel.to_lowercase();
        self.inner
            .pending_topics
            .lock()
            .entry(slot.clone())
            .or_default()
            .push(tx);
        if let Err(e) = self.send_line(&wire::topic(channel, topic)) {
            prune(&self.inner.pending_topics, &slot);
            return Err(e);
        }

        match self
            .await_confirmation(rx, self.inner.config.topic_timeout())
            .await
        {
            Confirmation::Confirmed(Ok(topic)) => Ok(topic),
            Confirmation::Confirmed(Err(reason)) => Err(CommandError::Rejected(reason)),
            Confirmation::Dropped => Err(CommandError::Rejected(format!(
                "Disconnected before the topic change in {} was confirmed",
                channel
            ))),
            Confirmation::TimedOut => {
                prune(&self.inner.pending_topics, &slot);
                Err(CommandError::Timeout(format!(
                    "Timed out waiting for the server to confirm the topic change in {}",
                    channel
                )))
            }
        }
    }

    /// Wait for a confirmation, giving up when the connection scope ends.
    async fn await_confirmation<T>(&self, rx: oneshot::Receiver<T>, limit: Duration) -> Confirmation<T> {
        let scope = self.inner.connection.scope();
        tokio::select! {
            _ = scope.cancelled() => Confirmation::Dropped,
            res = timeout(limit, rx) => match res {
                Ok(Ok(value)) => Confirmation::Confirmed(value),
                Ok(Err(_)) => Confirmation::Dropped,
                Err(_) => Confirmation::TimedOut,
            },
        }
    }

    pub fn change_nick(&self, nick: &str) -> Result<(), CommandError> {
        validate_nickname(nick)?;
        self.send_line(&wire::nick(nick))
    }

    pub fn request_whois(&self, nick: &str) -> Result<(), CommandError> {
        self.send_line(&wire::whois(nick))
    }

    pub fn oper(&self, name: &str, password: &str) -> Result<(), CommandError> {
        self.send_line(&wire::oper(name, password))
    }

    pub fn invite(&self, nick: &str, channel: &str) -> Result<(), CommandError> {
        self.send_line(&wire::invite(nick, channel))
    }

    pub fn kick(&self, channel: &str, nick: &str, reason: Option<&str>) -> Result<(), CommandError> {
        self.send_line(&wire::kick(channel, nick, reason))
    }

    pub fn set_mode(&self, target: &str, modes: &str, args: &[&str]) -> Result<(), CommandError> {
        self.send_line(&wire::mode(target, modes, args))
    }

    pub fn op(&self, channel: &str, nick: &str) -> Result<(), CommandError> {
        self.set_mode(channel, "+o", &[nick])
    }

    pub fn deop(&self, channel: &str, nick: &str) -> Result<(), CommandError> {
        self.set_mode(channel, "-o", &[nick])
    }

    pub fn voice(&self, channel: &str, nick: &str) -> Result<(), CommandError> {
        self.set_mode(channel, "+v", &[nick])
    }

    pub fn devoice(&self, channel: &str, nick: &str) -> Result<(), CommandError> {
        self.set_mode(channel, "-v", &[nick])
    }

    pub fn ban(&self, channel: &str, mask: &str) -> Result<(), CommandError> {
        self.set_mode(channel, "+b", &[&ban_mask(mask)])
    }

    pub fn unban(&self, channel: &str, mask: &str) -> Result<(), CommandError> {
        self.set_mode(channel, "-b", &[&ban_mask(mask)])
    }

    /// Send a raw protocol line as typed.
    pub fn execute_server_command(&self, line: &str) -> Result<(), CommandError> {
        let line = sanitize_line(line);
        if line.is_empty() {
            return Err(CommandError::Invalid("Nothing to send".to_string()));
        }
        self.send_line(&line)
    }
}

/// A bare nickname becomes `nick!*@*`; anything that already looks like a
/// mask is used as given.
pub fn ban_mask(target: &str) -> String {
    if target.contains(['!', '@', '*', '?']) {
        target.to_string()
    } else {
        format!("{}!*@*", target)
    }
}

fn sanitize_line(line: &str) -> String {
    line.chars()
        .filter(|&c| c != '\r' && c != '\n' && c != '\0')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Forget waiters whose caller gave up.
fn prune<T>(waiters: &Waiters<T>, slot: &str) {
    let mut waiters = waiters.lock();
    if let Some(list) = waiters.get_mut(slot) {
        list.retain(|tx| !tx.is_closed());
        if list.is_empty() {
            waiters.remove(slot);
        }
    }
}
