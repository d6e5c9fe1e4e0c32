//! User command handling (/join, /part, /msg, etc.).
//!
//! Every command is a type implementing [`Command`]: static metadata in a
//! [`CommandDescriptor`] plus an async handler. The [`Dispatcher`] resolves
//! the name, checks the descriptor's preconditions and runs the handler.

pub mod allowlist;
pub mod args;
mod builtin;
pub mod dispatcher;
pub mod registry;

use async_trait::async_trait;

use crate::conversation::ConversationKey;
use crate::error::CommandError;
use crate::session::Session;

pub use allowlist::RawCommandAllowList;
pub use args::{ChannelTarget, CommandArgs};
pub use builtin::{builtin_commands, ServiceShortcut, SERVICE_SHORTCUTS};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use registry::CommandRegistry;

/// Static metadata of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    /// May be issued from a channel conversation.
    pub in_channel: bool,
    /// May be issued from a private conversation.
    pub in_private: bool,
    pub requires_connection: bool,
}

impl CommandDescriptor {
    /// Primary name followed by aliases.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

/// Outcome of a command, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    /// Shown as a system line in the issuing conversation.
    pub message: Option<String>,
    /// Nothing was sent to the server.
    pub handled_locally: bool,
}

/// Wire command sent, nothing to show.
pub fn sent() -> CommandResult {
    CommandResult {
        success: true,
        message: None,
        handled_locally: false,
    }
}

/// Wire command sent, with a confirmation line.
pub fn sent_with(message: impl Into<String>) -> CommandResult {
    CommandResult {
        success: true,
        message: Some(message.into()),
        handled_locally: false,
    }
}

/// Answered locally without contacting the server.
pub fn local(message: impl Into<String>) -> CommandResult {
    CommandResult {
        success: true,
        message: Some(message.into()),
        handled_locally: true,
    }
}

/// Local failure, nothing sent.
pub fn failure(message: impl Into<String>) -> CommandResult {
    CommandResult {
        success: false,
        message: Some(message.into()),
        handled_locally: true,
    }
}

/// Where a command was issued.
pub struct CommandContext<'a> {
    pub session: &'a Session,
    pub conversation: &'a ConversationKey,
}

#[async_trait]
pub trait Command: Send + Sync {
    fn descriptor(&self) -> &'static CommandDescriptor;

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_builders() {
        assert!(sent().success && !sent().handled_locally && sent().message.is_none());
        assert_eq!(sent_with("ok").message.as_deref(), Some("ok"));
        assert!(local("x").handled_locally);
        let f = failure("nope");
        assert!(!f.success && f.handled_locally);
    }

    #[test]
    fn test_descriptor_names() {
        const D: CommandDescriptor = CommandDescriptor {
            name: "msg",
            aliases: &["privmsg", "m"],
            usage: "/msg <target> <text>",
            in_channel: true,
            in_private: true,
            requires_connection: true,
        };
        assert_eq!(D.names().collect::<Vec<_>>(), vec!["msg", "privmsg", "m"]);
    }
}
