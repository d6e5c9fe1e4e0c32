use async_trait::async_trait;

use super::usage;
use crate::commands::{
    sent, sent_with, Command, CommandArgs, CommandContext, CommandDescriptor, CommandResult,
};
use crate::conversation::ConversationType;
use crate::error::CommandError;

pub struct Nick;

static NICK: CommandDescriptor = CommandDescriptor {
    name: "nick",
    aliases: &[],
    usage: "nick <new nickname>",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Nick {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &NICK
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let nick = args.get(0).ok_or_else(|| usage(ctx, &NICK))?;
        // Our identity changes when the server confirms
        ctx.session.change_nick(nick)?;
        Ok(sent_with(format!("Requested nickname change to {}", nick)))
    }
}

pub struct Whois;

static WHOIS: CommandDescriptor = CommandDescriptor {
    name: "whois",
    aliases: &["w"],
    usage: "whois <nick>",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Whois {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &WHOIS
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let nick = match args.get(0) {
            Some(nick) => nick.to_string(),
            // In a private conversation, default to the peer
            None if ctx.conversation.kind == ConversationType::PrivateMessage => {
                ctx.conversation.name.clone()
            }
            None => return Err(usage(ctx, &WHOIS)),
        };
        ctx.session.request_whois(&nick)?;
        Ok(sent())
    }
}

pub struct Oper;

static OPER: CommandDescriptor = CommandDescriptor {
    name: "oper",
    aliases: &[],
    usage: "oper <name> <password>",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Oper {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &OPER
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        match (args.get(0), args.get(1)) {
            (Some(name), Some(password)) => {
                ctx.session.oper(name, password)?;
                Ok(sent())
            }
            _ => Err(usage(ctx, &OPER)),
        }
    }
}
