//! Boundary with the protocol library.
//!
//! The session never touches sockets or the wire grammar. It drives a
//! [`ProtocolAdapter`] and consumes the [`ProtocolEvent`]s the adapter pushes
//! through the [`EventSink`] it was handed at connect time.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{TransportError, ValidationError};
use crate::validation::validate_server_address;

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
}

impl ServerDescriptor {
    /// Parse `host[:port]`.
    pub fn parse(addr: &str, use_tls: bool) -> Result<Self, ValidationError> {
        let (host, port) = validate_server_address(addr)?;
        Ok(Self {
            host,
            port,
            use_tls,
        })
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection parameters, remembered for reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub nickname: String,
    pub password: Option<String>,
    pub server: ServerDescriptor,
    /// Channels joined once the handshake completes.
    pub auto_join: Vec<String>,
}

impl ConnectParams {
    pub fn new(server: ServerDescriptor, nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            password: None,
            server,
            auto_join: Vec::new(),
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_auto_join<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auto_join = channels.into_iter().map(Into::into).collect();
        self
    }
}

/// Events delivered by the adapter, in network order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// PRIVMSG or NOTICE addressed to a channel or to us.
    MessageReceived {
        target: String,
        sender: String,
        text: String,
        notice: bool,
        /// Server-supplied time of the message, when the server tags it.
        server_time: Option<DateTime<Utc>>,
    },
    /// Someone (possibly us) joined a channel.
    UserJoined { channel: String, nick: String },
    /// Someone (possibly us) left a channel.
    UserLeft {
        channel: String,
        nick: String,
        reason: Option<String>,
    },
    /// Someone quit the network.
    UserQuit { nick: String, reason: Option<String> },
    /// Someone (possibly us) was kicked.
    UserKicked {
        channel: String,
        nick: String,
        by: String,
        reason: Option<String>,
    },
    NickChanged { old: String, new: String },
    TopicChanged {
        channel: String,
        topic: String,
        set_by: Option<String>,
    },
    /// The adapter's roster for `channel` was replaced or updated.
    RosterSnapshot { channel: String },
    /// Numeric reply or server notice not covered above.
    ServerReply {
        code: u16,
        target: Option<String>,
        text: String,
    },
    /// The network dropped us without a disconnect request.
    ConnectionLost { reason: String },
    ConnectionError { message: String },
}

/// Producer half of a connection's event stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ProtocolEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<ProtocolEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an event. Returns false once the owning session has gone away.
    pub fn emit(&self, event: ProtocolEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Channel-scoped privilege flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Privileges {
    pub operator: bool,
    pub half_operator: bool,
    pub voice: bool,
}

impl Privileges {
    pub const NONE: Self = Self {
        operator: false,
        half_operator: false,
        voice: false,
    };

    /// Parse NAMES-style prefixes (`@`, `%`, `+`).
    pub fn from_prefixes(prefixes: &str) -> Self {
        Self {
            operator: prefixes.contains('@'),
            half_operator: prefixes.contains('%'),
            voice: prefixes.contains('+'),
        }
    }
}

/// One member of a channel roster, as tracked by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRosterEntry {
    pub nickname: String,
    pub privileges: Privileges,
}

impl ChannelRosterEntry {
    pub fn new(nickname: &str, privileges: Privileges) -> Self {
        Self {
            nickname: nickname.to_string(),
            privileges,
        }
    }

    pub fn is_operator(&self) -> bool {
        self.privileges.operator
    }

    pub fn is_half_operator(&self) -> bool {
        self.privileges.half_operator
    }

    pub fn has_voice(&self) -> bool {
        self.privileges.voice
    }

    /// Highest status prefix, if any.
    pub fn prefix(&self) -> Option<char> {
        if self.is_operator() {
            Some('@')
        } else if self.is_half_operator() {
            Some('%')
        } else if self.has_voice() {
            Some('+')
        } else {
            None
        }
    }
}

/// Snapshot of a channel's roster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelRoster {
    pub channel: String,
    pub members: Vec<ChannelRosterEntry>,
}

impl ChannelRoster {
    pub fn get_user(&self, nickname: &str) -> Option<&ChannelRosterEntry> {
        self.members
            .iter()
            .find(|m| m.nickname.eq_ignore_ascii_case(nickname))
    }
}

/// Transport and roster primitives provided by the protocol library.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Open the connection and complete registration.
    ///
    /// Events for this connection must be delivered through `events`.
    async fn connect(&self, params: &ConnectParams, events: EventSink)
        -> Result<(), TransportError>;

    /// Close the connection, sending QUIT with `reason` if possible.
    async fn disconnect(&self, reason: Option<&str>) -> Result<(), TransportError>;

    /// Queue a raw protocol line. Does not wait for the server.
    fn send_raw_line(&self, line: &str) -> Result<(), TransportError>;

    /// Current roster for a joined channel.
    fn channel(&self, name: &str) -> Option<ChannelRoster>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_descriptor_parse() {
        let server = ServerDescriptor::parse("irc.libera.chat:6697", true).unwrap();
        assert_eq!(server.host, "irc.libera.chat");
        assert_eq!(server.port, 6697);
        assert!(server.use_tls);
        assert_eq!(server.to_string(), "irc.libera.chat:6697");

        assert!(ServerDescriptor::parse("", false).is_err());
    }

    #[test]
    fn test_roster_lookup_and_prefixes() {
        let roster = ChannelRoster {
            channel: "#rust".into(),
            members: vec![
                ChannelRosterEntry::new("Alice", Privileges::from_prefixes("@")),
                ChannelRosterEntry::new("bob", Privileges::from_prefixes("%+")),
                ChannelRosterEntry::new("carol", Privileges::NONE),
            ],
        };

        let alice = roster.get_user("alice").unwrap();
        assert!(alice.is_operator());
        assert_eq!(alice.prefix(), Some('@'));

        let bob = roster.get_user("BOB").unwrap();
        assert!(bob.is_half_operator() && bob.has_voice());
        assert_eq!(bob.prefix(), Some('%'));

        assert_eq!(roster.get_user("carol").unwrap().prefix(), None);
        assert!(roster.get_user("dave").is_none());
    }

    #[test]
    fn test_event_sink_reports_closed_receiver() {
        let (sink, rx) = EventSink::channel();
        assert!(sink.emit(ProtocolEvent::RosterSnapshot {
            channel: "#a".into()
        }));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.emit(ProtocolEvent::RosterSnapshot {
            channel: "#a".into()
        }));
    }
}
