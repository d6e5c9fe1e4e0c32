//! The local user's current nickname and mention detection.

use parking_lot::RwLock;
use regex::Regex;
use tracing::warn;

struct Current {
    nick: String,
    mention: Option<Regex>,
}

/// Nickname of the local user, shared between the session, the permission
/// checks and inbound message classification.
#[derive(Default)]
pub struct LocalIdentity {
    current: RwLock<Option<Current>>,
}

/// Character class body of characters that may appear in a nickname.
const NICK_CHARS: &str = r"A-Za-z0-9_\-\[\]\\^{}|`";

/// Matches `nick` as a whole word, where word characters follow nickname rules.
fn mention_pattern(nick: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)(?:^|[^{b}]){nick}(?:$|[^{b}])",
        b = NICK_CHARS,
        nick = regex::escape(nick)
    ))
}

impl LocalIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nickname(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.nick.clone())
    }

    pub fn set_nickname(&self, nick: &str) {
        let mention = match mention_pattern(nick) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(nick = %nick, error = %e, "Falling back to substring mention matching");
                None
            }
        };
        *self.current.write() = Some(Current {
            nick: nick.to_string(),
            mention,
        });
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// True if `nick` is the local user.
    pub fn is_self(&self, nick: &str) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|c| c.nick.eq_ignore_ascii_case(nick))
    }

    /// True if `text` mentions the local user by nickname.
    pub fn is_mentioned(&self, text: &str) -> bool {
        match self.current.read().as_ref() {
            Some(Current {
                mention: Some(re), ..
            }) => re.is_match(text),
            Some(Current { nick, .. }) => text.to_lowercase().contains(&nick.to_lowercase()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions_respect_nick_boundaries() {
        let id = LocalIdentity::new();
        assert!(!id.is_mentioned("bob: hi"));

        id.set_nickname("bob");
        assert!(id.is_mentioned("bob: hi"));
        assert!(id.is_mentioned("hey Bob, you there?"));
        assert!(id.is_mentioned("thanks bob"));
        assert!(!id.is_mentioned("bobby is here"));
        assert!(!id.is_mentioned("ask bob_ instead"));
        assert!(!id.is_mentioned("kebob"));
    }

    #[test]
    fn test_special_characters_in_nick() {
        let id = LocalIdentity::new();
        id.set_nickname("[away]");
        assert!(id.is_mentioned("ping [away]"));
        assert!(!id.is_mentioned("away"));
        assert!(id.is_self("[AWAY]"));
    }
}
