//! Local privilege checks against the adapter-owned roster.
//!
//! These are a fast local rejection for moderation commands. The server
//! still enforces; every lookup failure answers "no privilege".

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::connection::ConnectionState;
use crate::identity::LocalIdentity;
use crate::protocol::{ChannelRosterEntry, ProtocolAdapter};

/// Highest channel privilege held, ordered from none to operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PrivilegeLevel {
    None,
    Voice,
    HalfOperator,
    Operator,
}

impl From<&ChannelRosterEntry> for PrivilegeLevel {
    fn from(entry: &ChannelRosterEntry) -> Self {
        if entry.is_operator() {
            Self::Operator
        } else if entry.is_half_operator() {
            Self::HalfOperator
        } else if entry.has_voice() {
            Self::Voice
        } else {
            Self::None
        }
    }
}

/// Stateless queries over the live roster.
#[derive(Clone)]
pub struct PermissionValidator {
    adapter: Arc<dyn ProtocolAdapter>,
    identity: Arc<LocalIdentity>,
    connection: watch::Receiver<ConnectionState>,
}

impl PermissionValidator {
    pub fn new(
        adapter: Arc<dyn ProtocolAdapter>,
        identity: Arc<LocalIdentity>,
        connection: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            adapter,
            identity,
            connection,
        }
    }

    fn local_entry(&self, channel: &str) -> Option<ChannelRosterEntry> {
        if !self.connection.borrow().is_connected() {
            return None;
        }
        let nick = self.identity.nickname()?;
        let roster = self.adapter.channel(channel)?;
        roster.get_user(&nick).cloned()
    }

    pub fn privilege_level(&self, channel: &str) -> PrivilegeLevel {
        self.local_entry(channel)
            .map(|entry| PrivilegeLevel::from(&entry))
            .unwrap_or(PrivilegeLevel::None)
    }

    pub fn has_operator(&self, channel: &str) -> bool {
        self.local_entry(channel)
            .is_some_and(|e| e.is_operator())
    }

    pub fn has_half_operator(&self, channel: &str) -> bool {
        self.local_entry(channel)
            .is_some_and(|e| e.is_half_operator())
    }

    pub fn has_voice(&self, channel: &str) -> bool {
        self.local_entry(channel).is_some_and(|e| e.has_voice())
    }

    pub fn has_any_privilege(&self, channel: &str) -> bool {
        self.local_entry(channel)
            .is_some_and(|e| e.is_operator() || e.is_half_operator() || e.has_voice())
    }

    /// Operator or half-operator.
    pub fn has_moderator_privilege(&self, channel: &str) -> bool {
        self.local_entry(channel)
            .is_some_and(|e| e.is_operator() || e.is_half_operator())
    }
}
