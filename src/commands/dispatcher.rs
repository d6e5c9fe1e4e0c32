//! Turns a line of user input into a command execution.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{debug, info_span, warn, Instrument};

use super::{
    failure, sent_with, CommandArgs, CommandContext, CommandRegistry, CommandResult,
    RawCommandAllowList,
};
use crate::conversation::{ConversationKey, ConversationType};
use crate::error::CommandError;
use crate::session::Session;

/// What [`Dispatcher::dispatch`] did with the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command; the caller sends it as a message.
    NotHandled,
    Handled(CommandResult),
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    pub fn result(&self) -> Option<&CommandResult> {
        match self {
            Self::Handled(result) => Some(result),
            Self::NotHandled => None,
        }
    }
}

pub struct Dispatcher {
    prefix: char,
    registry: CommandRegistry,
    allowlist: RawCommandAllowList,
}

impl Dispatcher {
    pub fn new(prefix: char, registry: CommandRegistry, allowlist: RawCommandAllowList) -> Self {
        Self {
            prefix,
            registry,
            allowlist,
        }
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn allowlist(&self) -> &RawCommandAllowList {
        &self.allowlist
    }

    /// Run `input` as a command issued from `conversation`.
    ///
    /// Every handled input, successful or not, surfaces its result message
    /// as a system line in `conversation`.
    pub async fn dispatch(
        &self,
        session: &Session,
        input: &str,
        conversation: &ConversationKey,
    ) -> DispatchOutcome {
        let Some(body) = input.trim_end().strip_prefix(self.prefix) else {
            return DispatchOutcome::NotHandled;
        };

        let (name, rest) = match body.find(char::is_whitespace) {
            Some(end) => (&body[..end], &body[end..]),
            None => (body, ""),
        };
        let args = CommandArgs::new(rest);

        let result = if name.is_empty() {
            failure(format!("Type {}help for a list of commands", self.prefix))
        } else {
            let span = info_span!(
                "client.command",
                command = %name.to_lowercase(),
                conversation = %conversation.name
            );
            self.run(session, name, &args, conversation)
                .instrument(span)
                .await
        };

        surface(session, conversation, &result);
        DispatchOutcome::Handled(result)
    }

    async fn run(
        &self,
        session: &Session,
        name: &str,
        args: &CommandArgs,
        conversation: &ConversationKey,
    ) -> CommandResult {
        let Some(command) = self.registry.lookup(name) else {
            return self.forward_raw(session, name, args);
        };
        let descriptor = command.descriptor();

        let applicable = match conversation.kind {
            ConversationType::Channel => descriptor.in_channel,
            ConversationType::PrivateMessage => descriptor.in_private,
            ConversationType::ServerStatus | ConversationType::Service => true,
        };
        if !applicable {
            let place = match conversation.kind {
                ConversationType::Channel => "in a channel",
                _ => "in a private conversation",
            };
            return failure(format!(
                "{}{} can't be used {}",
                self.prefix, descriptor.name, place
            ));
        }

        if descriptor.requires_connection && !session.is_connected() {
            return failure(CommandError::NotConnected.to_string());
        }

        let ctx = CommandContext {
            session,
            conversation,
        };
        match AssertUnwindSafe(command.execute(&ctx, args))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => {
                debug!(success = result.success, "Command finished");
                result
            }
            Ok(Err(e)) => {
                debug!(error_code = e.error_code(), error = %e, "Command rejected");
                failure(e.to_string())
            }
            Err(_) => {
                warn!(command = descriptor.name, "Command handler panicked");
                let err = CommandError::Internal(format!("{}{}", self.prefix, descriptor.name));
                failure(err.to_string())
            }
        }
    }

    /// Unknown names on the allow-list go to the server as typed.
    fn forward_raw(&self, session: &Session, name: &str, args: &CommandArgs) -> CommandResult {
        if !self.allowlist.contains(name) {
            return failure(format!("Unknown command: {}{}", self.prefix, name));
        }
        if !session.is_connected() {
            return failure(CommandError::NotConnected.to_string());
        }

        let keyword = name.to_ascii_uppercase();
        let line = if args.is_empty() {
            keyword
        } else {
            format!("{} {}", keyword, args.rest())
        };
        match session.execute_server_command(&line) {
            Ok(()) => sent_with(format!("Sent: {}", line)),
            Err(e) => failure(e.to_string()),
        }
    }
}

fn surface(session: &Session, conversation: &ConversationKey, result: &CommandResult) {
    let Some(text) = result.message.as_deref() else {
        return;
    };
    let conversations = session.conversations();
    if result.success {
        conversations.notify(conversation, text);
    } else {
        conversations.notify_error(conversation, text);
    }
}

