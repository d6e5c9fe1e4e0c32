//! Shortcuts for messaging network services (`/ns identify ...`).

use async_trait::async_trait;

use super::usage;
use crate::commands::{
    sent, Command, CommandArgs, CommandContext, CommandDescriptor, CommandResult,
};
use crate::error::CommandError;

/// A shortcut command and the service it messages.
pub struct ServiceShortcut {
    pub service: &'static str,
    pub descriptor: CommandDescriptor,
}

const fn shortcut(
    name: &'static str,
    aliases: &'static [&'static str],
    usage: &'static str,
    service: &'static str,
) -> ServiceShortcut {
    ServiceShortcut {
        service,
        descriptor: CommandDescriptor {
            name,
            aliases,
            usage,
            in_channel: true,
            in_private: true,
            requires_connection: true,
        },
    }
}

pub static SERVICE_SHORTCUTS: [ServiceShortcut; 6] = [
    shortcut("ns", &["nickserv"], "ns <command>", "NickServ"),
    shortcut("cs", &["chanserv"], "cs <command>", "ChanServ"),
    shortcut("ms", &["memoserv"], "ms <command>", "MemoServ"),
    shortcut("hs", &["hostserv"], "hs <command>", "HostServ"),
    shortcut("os", &["operserv"], "os <command>", "OperServ"),
    shortcut("bs", &["botserv"], "bs <command>", "BotServ"),
];

pub struct ServiceCommand(pub &'static ServiceShortcut);

#[async_trait]
impl Command for ServiceCommand {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &self.0.descriptor
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        if args.is_empty() {
            return Err(usage(ctx, &self.0.descriptor));
        }
        ctx.session.send_private_message(self.0.service, args.rest())?;
        Ok(sent())
    }
}
