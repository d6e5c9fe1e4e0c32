//! Standard protocol keywords forwarded verbatim when no command matches.

use std::collections::HashSet;

use once_cell::sync::Lazy;

static STANDARD: Lazy<RawCommandAllowList> = Lazy::new(|| {
    RawCommandAllowList::from_keywords([
        "ADMIN", "AWAY", "CHATHISTORY", "CNOTICE", "CPRIVMSG", "CONNECT", "DIE", "HELP", "INFO",
        "ISON", "KILL", "KNOCK", "LINKS", "LIST", "LUSERS", "MAP", "MODE", "MONITOR", "MOTD",
        "NAMES", "PING", "REHASH", "RESTART", "RULES", "SERVLIST", "SETNAME", "SILENCE", "SQUERY",
        "SQUIT", "STATS", "TIME", "TRACE", "USERHOST", "USERIP", "USERS", "VERSION", "WALLOPS",
        "WATCH", "WHO", "WHOWAS",
    ])
});

/// Case-insensitive set of protocol keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommandAllowList {
    keywords: HashSet<String>,
}

impl Default for RawCommandAllowList {
    fn default() -> Self {
        STANDARD.clone()
    }
}

impl RawCommandAllowList {
    pub fn from_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }

    /// Add keywords to the list.
    pub fn extend<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords
            .extend(keywords.into_iter().map(|k| k.as_ref().to_ascii_uppercase()));
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.keywords.contains(&keyword.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_case_insensitively() {
        let list = RawCommandAllowList::default();
        assert!(list.contains("motd"));
        assert!(list.contains("Away"));
        assert!(list.contains("LIST"));
        assert!(!list.contains("frobnicate"));
    }

    #[test]
    fn test_extend() {
        let mut list = RawCommandAllowList::default();
        let before = list.len();
        assert!(!list.contains("cap"));
        list.extend(["cap"]);
        assert!(list.contains("CAP"));
        assert_eq!(list.len(), before + 1);
    }
}
