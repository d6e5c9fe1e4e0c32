//! Channel moderation. Every command here checks the local user's
//! privilege before anything is sent.

use async_trait::async_trait;

use super::usage_text;
use crate::commands::args::{channel_target, ChannelTarget};
use crate::commands::{
    sent_with, Command, CommandArgs, CommandContext, CommandDescriptor, CommandResult,
};
use crate::error::CommandError;
use crate::session::Session;

#[derive(Clone, Copy)]
enum Requires {
    Operator,
    /// Operator or half-operator.
    Moderator,
}

/// Resolve the target and check privilege, then run `action`.
fn moderate<F>(
    ctx: &CommandContext<'_>,
    args: &CommandArgs,
    descriptor: &CommandDescriptor,
    requires: Requires,
    action: F,
) -> Result<CommandResult, CommandError>
where
    F: FnOnce(&Session, &ChannelTarget<'_>) -> Result<String, CommandError>,
{
    let target = channel_target(args, ctx.conversation, &usage_text(ctx, descriptor))?;

    let permissions = ctx.session.permissions();
    let allowed = match requires {
        Requires::Operator => permissions.has_operator(&target.channel),
        Requires::Moderator => permissions.has_moderator_privilege(&target.channel),
    };
    if !allowed {
        return Err(CommandError::NoPermission(target.channel.clone()));
    }

    action(ctx.session, &target).map(sent_with)
}

macro_rules! moderation_command {
    ($ty:ident, $desc:ident, $name:literal, [$($alias:literal),*], $usage:literal, $requires:expr,
     |$session:ident, $target:ident| $body:expr) => {
        pub struct $ty;

        static $desc: CommandDescriptor = CommandDescriptor {
            name: $name,
            aliases: &[$($alias),*],
            usage: $usage,
            in_channel: true,
            in_private: false,
            requires_connection: true,
        };

        #[async_trait]
        impl Command for $ty {
            fn descriptor(&self) -> &'static CommandDescriptor {
                &$desc
            }

            async fn execute(
                &self,
                ctx: &CommandContext<'_>,
                args: &CommandArgs,
            ) -> Result<CommandResult, CommandError> {
                moderate(ctx, args, &$desc, $requires, |$session, $target| $body)
            }
        }
    };
}

moderation_command!(
    Op, OP, "op", [], "op [#channel] <nick>", Requires::Operator,
    |s, t| {
        s.op(&t.channel, t.nick)?;
        Ok(format!("Giving operator status to {} in {}", t.nick, t.channel))
    }
);

moderation_command!(
    Deop, DEOP, "deop", [], "deop [#channel] <nick>", Requires::Operator,
    |s, t| {
        s.deop(&t.channel, t.nick)?;
        Ok(format!("Removing operator status from {} in {}", t.nick, t.channel))
    }
);

moderation_command!(
    Voice, VOICE, "voice", ["v"], "voice [#channel] <nick>", Requires::Moderator,
    |s, t| {
        s.voice(&t.channel, t.nick)?;
        Ok(format!("Giving voice to {} in {}", t.nick, t.channel))
    }
);

moderation_command!(
    Devoice, DEVOICE, "devoice", [], "devoice [#channel] <nick>", Requires::Moderator,
    |s, t| {
        s.devoice(&t.channel, t.nick)?;
        Ok(format!("Removing voice from {} in {}", t.nick, t.channel))
    }
);

moderation_command!(
    Kick, KICK, "kick", ["k"], "kick [#channel] <nick> [reason]", Requires::Operator,
    |s, t| {
        s.kick(&t.channel, t.nick, t.rest)?;
        Ok(format!("Kicking {} from {}", t.nick, t.channel))
    }
);

moderation_command!(
    Ban, BAN, "ban", ["b"], "ban [#channel] <nick|mask>", Requires::Operator,
    |s, t| {
        s.ban(&t.channel, t.nick)?;
        Ok(format!("Banning {} from {}", t.nick, t.channel))
    }
);

moderation_command!(
    Unban, UNBAN, "unban", [], "unban [#channel] <nick|mask>", Requires::Operator,
    |s, t| {
        s.unban(&t.channel, t.nick)?;
        Ok(format!("Removing ban on {} in {}", t.nick, t.channel))
    }
);
