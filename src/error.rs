//! Unified error handling for the session layer.
//!
//! Connection failures surface through [`crate::ConnectionState`]; command
//! failures become system messages in the conversation that issued them.
//! These enums carry the text for both.

use thiserror::Error;

// ============================================================================
// Transport Errors (protocol adapter)
// ============================================================================

/// Errors reported by the protocol adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("not connected")]
    NotConnected,

    #[error("transport closed")]
    Closed,
}

// ============================================================================
// Session Errors (connection lifecycle)
// ============================================================================

/// Errors returned by connection lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A connect raced an in-flight disconnect and was refused.
    #[error("cannot connect while a disconnect is in progress")]
    ConnectWhileDisconnecting,

    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("no previous connection parameters to reconnect with")]
    NoConnectionParams,

    #[error("invalid nickname: {0}")]
    InvalidNickname(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("session was torn down")]
    Cancelled,
}

// ============================================================================
// Command Errors (dispatcher boundary)
// ============================================================================

/// Errors produced by command handlers.
///
/// The dispatcher turns every variant into a local system message; none of
/// them reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(String),

    #[error("{0}")]
    WrongContext(String),

    #[error("You don't have permission to do that in {0}")]
    NoPermission(String),

    #[error("Not connected to a server")]
    NotConnected,

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Command failed: {0}")]
    Internal(String),
}

impl CommandError {
    /// Get a static error code string for log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Usage(_) => "usage",
            Self::WrongContext(_) => "wrong_context",
            Self::NoPermission(_) => "no_permission",
            Self::NotConnected => "not_connected",
            Self::Invalid(_) => "invalid",
            Self::Timeout(_) => "timeout",
            Self::Rejected(_) => "rejected",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<ValidationError> for CommandError {
    fn from(err: ValidationError) -> Self {
        Self::Invalid(err.to_string())
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors raised while building the command table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command name or alias '{name}' is already bound to '{existing}'")]
    DuplicateName { name: String, existing: String },

    #[error("command name cannot be empty")]
    EmptyName,
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Input validation failures for protocol-facing values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Channel name cannot be empty")]
    EmptyChannel,

    #[error("Channel name must start with # or &")]
    ChannelPrefix,

    #[error("Channel name too long (max 50 characters)")]
    ChannelTooLong,

    #[error("Channel name contains invalid characters")]
    ChannelCharacters,

    #[error("Nickname cannot be empty")]
    EmptyNickname,

    #[error("Nickname too long (max 30 characters)")]
    NicknameTooLong,

    #[error("Nickname must start with a letter or special character")]
    NicknameStart,

    #[error("Invalid character '{0}' in nickname")]
    NicknameCharacter(char),

    #[error("Server address cannot be empty")]
    EmptyServer,

    #[error("Hostname cannot be empty")]
    EmptyHost,

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Invalid server format. Use 'host:port' or 'host'")]
    ServerFormat,

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message too long (max 400 characters)")]
    MessageTooLong,

    #[error("Message cannot contain newline characters")]
    MessageNewline,
}

// ============================================================================
// Config Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not determine the platform config directory")]
    NoConfigDir,
}
