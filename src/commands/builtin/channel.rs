use async_trait::async_trait;

use super::{usage, usage_text};
use crate::commands::args::optional_channel;
use crate::commands::{
    local, sent, sent_with, Command, CommandArgs, CommandContext, CommandDescriptor, CommandResult,
};
use crate::conversation::ConversationType;
use crate::error::CommandError;
use crate::validation::{is_channel_name, normalize_channel};

pub struct Join;

static JOIN: CommandDescriptor = CommandDescriptor {
    name: "join",
    aliases: &["j"],
    usage: "join <#channel> [key]",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Join {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &JOIN
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let (heads, _) = args.split(2);
        let channel = heads.first().ok_or_else(|| usage(ctx, &JOIN))?;
        let channel = normalize_channel(channel);
        ctx.session.join_channel(&channel, heads.get(1).copied())?;
        Ok(sent_with(format!("Joining {}...", channel)))
    }
}

pub struct Part;

static PART: CommandDescriptor = CommandDescriptor {
    name: "part",
    aliases: &["leave", "p"],
    usage: "part [#channel] [reason]",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Part {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &PART
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let (channel, reason) = optional_channel(args, ctx.conversation, &usage_text(ctx, &PART))?;
        ctx.session.part_channel(&channel, reason).await?;
        // The server's confirmation already produced a status line
        Ok(sent())
    }
}

pub struct Topic;

static TOPIC: CommandDescriptor = CommandDescriptor {
    name: "topic",
    aliases: &["t"],
    usage: "topic [#channel] [new topic]",
    in_channel: true,
    in_private: false,
    requires_connection: true,
};

#[async_trait]
impl Command for Topic {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &TOPIC
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let (channel, text) = optional_channel(args, ctx.conversation, &usage_text(ctx, &TOPIC))?;
        match text {
            None => Ok(match ctx.session.topic(&channel) {
                Some(topic) if !topic.is_empty() => local(format!("Topic for {}: {}", channel, topic)),
                _ => local(format!("No topic set for {}", channel)),
            }),
            Some(text) => {
                ctx.session.set_topic(&channel, text).await?;
                Ok(sent())
            }
        }
    }
}

pub struct Invite;

static INVITE: CommandDescriptor = CommandDescriptor {
    name: "invite",
    aliases: &["inv"],
    usage: "invite <nick> [#channel]",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Invite {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &INVITE
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let nick = args.get(0).ok_or_else(|| usage(ctx, &INVITE))?;
        let channel = match args.get(1) {
            Some(c) if is_channel_name(c) => c.to_string(),
            Some(_) => return Err(usage(ctx, &INVITE)),
            None if ctx.conversation.kind == ConversationType::Channel => {
                ctx.conversation.name.clone()
            }
            None => {
                return Err(CommandError::WrongContext(format!(
                    "Not in a channel. Usage: {}",
                    usage_text(ctx, &INVITE)
                )))
            }
        };
        ctx.session.invite(nick, &channel)?;
        Ok(sent_with(format!("Invited {} to {}", nick, channel)))
    }
}
