//! Input validation for IRC protocol compliance

use crate::error::ValidationError;

/// Maximum text length we allow in a single PRIVMSG/NOTICE payload.
pub const MAX_MESSAGE_LEN: usize = 400;

/// Characters allowed in a nickname besides alphanumerics.
const NICK_SPECIALS: &str = "-[]{}\\|_^`";

/// True if `name` carries a channel prefix.
pub fn is_channel_name(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

/// Add the `#` prefix to bare channel names (`rust` -> `#rust`).
pub fn normalize_channel(name: &str) -> String {
    if is_channel_name(name) {
        name.to_string()
    } else {
        format!("#{}", name)
    }
}

/// Validates an IRC channel name according to RFC 2812
pub fn validate_channel_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyChannel);
    }

    if !is_channel_name(name) {
        return Err(ValidationError::ChannelPrefix);
    }

    if name.len() > 50 {
        return Err(ValidationError::ChannelTooLong);
    }

    if name.contains(|c: char| c.is_control() || c == ' ' || c == ',') {
        return Err(ValidationError::ChannelCharacters);
    }

    Ok(())
}

/// Validate IRC nickname according to RFC 2812
pub fn validate_nickname(nick: &str) -> Result<(), ValidationError> {
    let first_char = nick.chars().next().ok_or(ValidationError::EmptyNickname)?;

    // RFC 2812 says 9, networks routinely allow 30
    if nick.len() > 30 {
        return Err(ValidationError::NicknameTooLong);
    }

    if !first_char.is_alphabetic() && !"[]{}\\|_^`".contains(first_char) {
        return Err(ValidationError::NicknameStart);
    }

    if let Some(bad) = nick
        .chars()
        .find(|c| !c.is_alphanumeric() && !NICK_SPECIALS.contains(*c))
    {
        return Err(ValidationError::NicknameCharacter(bad));
    }

    Ok(())
}

/// Validates a server address (host:port format)
pub fn validate_server_address(addr: &str) -> Result<(String, u16), ValidationError> {
    if addr.is_empty() {
        return Err(ValidationError::EmptyServer);
    }

    let parts: Vec<&str> = addr.split(':').collect();

    match parts.as_slice() {
        [host] => {
            if host.is_empty() {
                return Err(ValidationError::EmptyHost);
            }
            Ok((host.to_string(), 6667))
        }
        [host, port] => {
            if host.is_empty() {
                return Err(ValidationError::EmptyHost);
            }

            let port_num = port
                .parse::<u16>()
                .map_err(|_| ValidationError::InvalidPort(port.to_string()))?;

            if port_num == 0 {
                return Err(ValidationError::InvalidPort(port.to_string()));
            }

            Ok((host.to_string(), port_num))
        }
        _ => Err(ValidationError::ServerFormat),
    }
}

/// Validates an IRC message (PRIVMSG/NOTICE text)
pub fn validate_message(msg: &str) -> Result<(), ValidationError> {
    if msg.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }

    // 512 byte lines minus prefix, command and target overhead
    if msg.len() > MAX_MESSAGE_LEN {
        return Err(ValidationError::MessageTooLong);
    }

    if msg.contains('\r') || msg.contains('\n') {
        return Err(ValidationError::MessageNewline);
    }

    Ok(())
}

/// Strips characters that would split or terminate a protocol line.
pub fn sanitize_message(msg: &str) -> String {
    msg.chars()
        .filter(|&c| c != '\r' && c != '\n' && c != '\0')
        .take(MAX_MESSAGE_LEN)
        .collect()
}
