use async_trait::async_trait;

use super::usage;
use crate::commands::{
    local, sent, Command, CommandArgs, CommandContext, CommandDescriptor, CommandResult,
};
use crate::error::CommandError;

pub struct Msg;

static MSG: CommandDescriptor = CommandDescriptor {
    name: "msg",
    aliases: &["privmsg", "m"],
    usage: "msg <nick|#channel> <message>",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Msg {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &MSG
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let (heads, text) = args.split(1);
        match (heads.first(), text) {
            (Some(target), Some(text)) => {
                ctx.session.send_private_message(target, text)?;
                Ok(sent())
            }
            _ => Err(usage(ctx, &MSG)),
        }
    }
}

pub struct Notice;

static NOTICE: CommandDescriptor = CommandDescriptor {
    name: "notice",
    aliases: &["n"],
    usage: "notice <nick|#channel> <message>",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Notice {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &NOTICE
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let (heads, text) = args.split(1);
        match (heads.first(), text) {
            (Some(target), Some(text)) => {
                ctx.session.send_notice(target, text)?;
                Ok(sent())
            }
            _ => Err(usage(ctx, &NOTICE)),
        }
    }
}

pub struct Me;

static ME: CommandDescriptor = CommandDescriptor {
    name: "me",
    aliases: &["action"],
    usage: "me <action>",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Me {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &ME
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        if args.is_empty() {
            return Err(usage(ctx, &ME));
        }
        ctx.session.send_action(ctx.conversation, args.rest())?;
        Ok(sent())
    }
}

pub struct Query;

static QUERY: CommandDescriptor = CommandDescriptor {
    name: "query",
    aliases: &["q"],
    usage: "query <nick> [message]",
    in_channel: true,
    in_private: true,
    requires_connection: false,
};

#[async_trait]
impl Command for Query {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &QUERY
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let (heads, text) = args.split(1);
        let nick = heads.first().ok_or_else(|| usage(ctx, &QUERY))?;
        let key = ctx.session.start_private_conversation(nick)?;
        match text {
            Some(text) => {
                ctx.session.send_private_message(&key.name, text)?;
                Ok(sent())
            }
            None => Ok(local(format!("Opened a conversation with {}", key.name))),
        }
    }
}
