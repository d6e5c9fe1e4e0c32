//! Argument parsing shared by command handlers.

use crate::conversation::{ConversationKey, ConversationType};
use crate::error::CommandError;
use crate::validation::is_channel_name;

/// Everything after the command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs {
    rest: String,
}

impl CommandArgs {
    pub fn new(rest: &str) -> Self {
        Self {
            rest: rest.trim().to_string(),
        }
    }

    /// Raw argument text, trimmed.
    pub fn rest(&self) -> &str {
        &self.rest
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.rest.split_whitespace()
    }

    pub fn len(&self) -> usize {
        self.tokens().count()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens().nth(index)
    }

    /// The first `n` tokens separately, and whatever follows as one block
    /// with its inner spacing intact.
    pub fn split(&self, n: usize) -> (Vec<&str>, Option<&str>) {
        let mut heads = Vec::with_capacity(n);
        let mut rest = self.rest.as_str();
        while heads.len() < n && !rest.is_empty() {
            match rest.find(char::is_whitespace) {
                Some(end) => {
                    heads.push(&rest[..end]);
                    rest = rest[end..].trim_start();
                }
                None => {
                    heads.push(rest);
                    rest = "";
                }
            }
        }
        (heads, (!rest.is_empty()).then_some(rest))
    }
}

/// `[#channel] <nick> [rest]` resolved against the issuing conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget<'a> {
    pub channel: String,
    pub nick: &'a str,
    pub rest: Option<&'a str>,
}

/// Resolve `[#channel] <nick> [rest]`. Without an explicit channel the
/// issuing conversation must be a channel.
pub fn channel_target<'a>(
    args: &'a CommandArgs,
    conversation: &ConversationKey,
    usage: &str,
) -> Result<ChannelTarget<'a>, CommandError> {
    let first = args.get(0).ok_or_else(|| CommandError::Usage(usage.to_string()))?;

    if is_channel_name(first) {
        let (heads, rest) = args.split(2);
        let nick = heads
            .get(1)
            .copied()
            .ok_or_else(|| CommandError::Usage(usage.to_string()))?;
        return Ok(ChannelTarget {
            channel: first.to_string(),
            nick,
            rest,
        });
    }

    let channel = current_channel(conversation, usage)?;
    let (heads, rest) = args.split(1);
    Ok(ChannelTarget {
        channel,
        nick: heads[0],
        rest,
    })
}

/// Resolve `[#channel] [rest]`, defaulting to the issuing channel.
pub fn optional_channel<'a>(
    args: &'a CommandArgs,
    conversation: &ConversationKey,
    usage: &str,
) -> Result<(String, Option<&'a str>), CommandError> {
    match args.get(0) {
        Some(first) if is_channel_name(first) => {
            let (_, rest) = args.split(1);
            Ok((first.to_string(), rest))
        }
        _ => {
            let channel = current_channel(conversation, usage)?;
            Ok((channel, (!args.is_empty()).then_some(args.rest())))
        }
    }
}

fn current_channel(conversation: &ConversationKey, usage: &str) -> Result<String, CommandError> {
    if conversation.kind == ConversationType::Channel {
        Ok(conversation.name.clone())
    } else {
        Err(CommandError::WrongContext(format!(
            "Not in a channel. Usage: {}",
            usage
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_remainder_spacing() {
        let args = CommandArgs::new("  #rust  bob   spamming  the  channel ");
        let (heads, rest) = args.split(2);
        assert_eq!(heads, vec!["#rust", "bob"]);
        assert_eq!(rest, Some("spamming  the  channel"));
        assert_eq!(args.len(), 5);

        let single = CommandArgs::new("bob");
        let (heads, rest) = single.split(2);
        assert_eq!(heads, vec!["bob"]);
        assert_eq!(rest, None);
    }

    #[test]
    fn test_channel_target_defaults_to_current_channel() {
        let here = ConversationKey::channel("#rust");
        let args = CommandArgs::new("bob be nice");
        let target = channel_target(&args, &here, "/kick").unwrap();
        assert_eq!(target.channel, "#rust");
        assert_eq!(target.nick, "bob");
        assert_eq!(target.rest, Some("be nice"));

        let args = CommandArgs::new("#other bob");
        let target = channel_target(&args, &here, "/kick").unwrap();
        assert_eq!(target.channel, "#other");
        assert_eq!(target.rest, None);
    }

    #[test]
    fn test_channel_target_errors() {
        let pm = ConversationKey::private("bob");
        assert!(matches!(
            channel_target(&CommandArgs::new("carol"), &pm, "/op"),
            Err(CommandError::WrongContext(_))
        ));
        assert!(matches!(
            channel_target(&CommandArgs::new(""), &pm, "/op"),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(
            channel_target(&CommandArgs::new("#rust"), &pm, "/op"),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn test_optional_channel() {
        let here = ConversationKey::channel("#rust");
        let args = CommandArgs::new("new topic here");
        assert_eq!(
            optional_channel(&args, &here, "/topic").unwrap(),
            ("#rust".to_string(), Some("new topic here"))
        );
        let args = CommandArgs::new("#other");
        assert_eq!(
            optional_channel(&args, &here, "/topic").unwrap(),
            ("#other".to_string(), None)
        );
    }
}
