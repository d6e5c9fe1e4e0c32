//! Builders for the raw protocol lines the session sends.

/// Format the final parameter, adding the `:` marker when required.
fn trailing(text: &str) -> String {
    if text.is_empty() || text.contains(' ') || text.starts_with(':') {
        format!(":{}", text)
    } else {
        text.to_string()
    }
}

pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {} {}", target, trailing(text))
}

pub fn notice(target: &str, text: &str) -> String {
    format!("NOTICE {} {}", target, trailing(text))
}

pub fn join(channel: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("JOIN {} {}", channel, key),
        None => format!("JOIN {}", channel),
    }
}

pub fn part(channel: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("PART {} {}", channel, trailing(reason)),
        None => format!("PART {}", channel),
    }
}

pub fn nick(nickname: &str) -> String {
    format!("NICK {}", nickname)
}

pub fn topic(channel: &str, text: &str) -> String {
    format!("TOPIC {} {}", channel, trailing(text))
}

pub fn whois(nickname: &str) -> String {
    format!("WHOIS {}", nickname)
}

pub fn oper(name: &str, password: &str) -> String {
    format!("OPER {} {}", name, password)
}

pub fn invite(nickname: &str, channel: &str) -> String {
    format!("INVITE {} {}", nickname, channel)
}

pub fn kick(channel: &str, nickname: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("KICK {} {} {}", channel, nickname, trailing(reason)),
        None => format!("KICK {} {}", channel, nickname),
    }
}

/// `MODE <target> <modes> [args...]`
pub fn mode(target: &str, modes: &str, args: &[&str]) -> String {
    let mut line = format!("MODE {} {}", target, modes);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_parameter() {
        assert_eq!(privmsg("#rust", "hello"), "PRIVMSG #rust hello");
        assert_eq!(privmsg("#rust", "hello world"), "PRIVMSG #rust :hello world");
        assert_eq!(privmsg("bob", ":)"), "PRIVMSG bob ::)");
        assert_eq!(topic("#rust", ""), "TOPIC #rust :");
    }

    #[test]
    fn test_moderation_lines() {
        assert_eq!(kick("#rust", "alice", Some("spam")), "KICK #rust alice spam");
        assert_eq!(
            kick("#rust", "alice", Some("no spam")),
            "KICK #rust alice :no spam"
        );
        assert_eq!(mode("#rust", "+b", &["alice!*@*"]), "MODE #rust +b alice!*@*");
        assert_eq!(mode("#rust", "+o", &["bob"]), "MODE #rust +o bob");
        assert_eq!(invite("bob", "#rust"), "INVITE bob #rust");
        assert_eq!(part("#rust", None), "PART #rust");
    }
}
