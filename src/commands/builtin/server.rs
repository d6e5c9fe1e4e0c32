use async_trait::async_trait;

use super::usage;
use crate::commands::{
    local, sent, sent_with, Command, CommandArgs, CommandContext, CommandDescriptor, CommandResult,
};
use crate::error::CommandError;

pub struct Raw;

static RAW: CommandDescriptor = CommandDescriptor {
    name: "raw",
    aliases: &["quote"],
    usage: "raw <protocol line>",
    in_channel: true,
    in_private: true,
    requires_connection: true,
};

#[async_trait]
impl Command for Raw {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &RAW
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        if args.is_empty() {
            return Err(usage(ctx, &RAW));
        }
        ctx.session.execute_server_command(args.rest())?;
        Ok(sent_with(format!("Sent: {}", args.rest())))
    }
}

pub struct Help;

static HELP: CommandDescriptor = CommandDescriptor {
    name: "help",
    aliases: &["h", "?"],
    usage: "help [command]",
    in_channel: true,
    in_private: true,
    requires_connection: false,
};

#[async_trait]
impl Command for Help {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &HELP
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        let dispatcher = ctx.session.dispatcher();
        let prefix = dispatcher.prefix();

        if let Some(name) = args.get(0) {
            let name = name.trim_start_matches(prefix);
            let command = dispatcher.registry().lookup(name).ok_or_else(|| {
                CommandError::Invalid(format!("Unknown command: {}{}", prefix, name))
            })?;
            let d = command.descriptor();
            let mut text = format!("Usage: {}{}", prefix, d.usage);
            if !d.aliases.is_empty() {
                let aliases: Vec<String> =
                    d.aliases.iter().map(|a| format!("{}{}", prefix, a)).collect();
                text.push_str(&format!(" (aliases: {})", aliases.join(", ")));
            }
            return Ok(local(text));
        }

        let names: Vec<String> = dispatcher
            .registry()
            .commands()
            .iter()
            .map(|c| format!("{}{}", prefix, c.descriptor().name))
            .collect();
        Ok(local(format!(
            "Commands: {}. Type {}help <command> for usage.",
            names.join(", "),
            prefix
        )))
    }
}

pub struct Quit;

static QUIT: CommandDescriptor = CommandDescriptor {
    name: "quit",
    aliases: &["disconnect", "exit"],
    usage: "quit [message]",
    in_channel: true,
    in_private: true,
    requires_connection: false,
};

#[async_trait]
impl Command for Quit {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &QUIT
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        if !ctx.session.is_connected() {
            return Ok(local("Not connected"));
        }
        let reason = (!args.is_empty()).then(|| args.rest());
        ctx.session
            .disconnect(reason)
            .await
            .map_err(|e| CommandError::Rejected(e.to_string()))?;
        Ok(sent())
    }
}

pub struct Reconnect;

static RECONNECT: CommandDescriptor = CommandDescriptor {
    name: "reconnect",
    aliases: &[],
    usage: "reconnect",
    in_channel: true,
    in_private: true,
    requires_connection: false,
};

#[async_trait]
impl Command for Reconnect {
    fn descriptor(&self) -> &'static CommandDescriptor {
        &RECONNECT
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        _args: &CommandArgs,
    ) -> Result<CommandResult, CommandError> {
        if ctx.session.is_connected() {
            return Ok(local("Already connected"));
        }
        ctx.session
            .reconnect_if_needed()
            .await
            .map_err(|e| CommandError::Rejected(e.to_string()))?;
        Ok(sent())
    }
}
