//! Built-in commands.

mod channel;
mod messaging;
mod moderation;
mod server;
mod services;
mod user;

use std::sync::Arc;

use super::{Command, CommandContext, CommandDescriptor};
use crate::error::CommandError;

pub use services::{ServiceShortcut, SERVICE_SHORTCUTS};

/// Every built-in command, in help order.
pub fn builtin_commands() -> Vec<Arc<dyn Command>> {
    let mut commands: Vec<Arc<dyn Command>> = vec![
        Arc::new(channel::Join),
        Arc::new(channel::Part),
        Arc::new(channel::Topic),
        Arc::new(channel::Invite),
        Arc::new(messaging::Msg),
        Arc::new(messaging::Notice),
        Arc::new(messaging::Me),
        Arc::new(messaging::Query),
        Arc::new(user::Nick),
        Arc::new(user::Whois),
        Arc::new(user::Oper),
        Arc::new(moderation::Op),
        Arc::new(moderation::Deop),
        Arc::new(moderation::Voice),
        Arc::new(moderation::Devoice),
        Arc::new(moderation::Kick),
        Arc::new(moderation::Ban),
        Arc::new(moderation::Unban),
        Arc::new(server::Raw),
        Arc::new(server::Help),
        Arc::new(server::Quit),
        Arc::new(server::Reconnect),
    ];
    commands.extend(
        SERVICE_SHORTCUTS
            .iter()
            .map(|s| Arc::new(services::ServiceCommand(s)) as Arc<dyn Command>),
    );
    commands
}

/// Usage error carrying the configured prefix.
fn usage(ctx: &CommandContext<'_>, descriptor: &CommandDescriptor) -> CommandError {
    CommandError::Usage(format!(
        "{}{}",
        ctx.session.dispatcher().prefix(),
        descriptor.usage
    ))
}

fn usage_text(ctx: &CommandContext<'_>, descriptor: &CommandDescriptor) -> String {
    format!("{}{}", ctx.session.dispatcher().prefix(), descriptor.usage)
}
