//! SLIRC session library.
//!
//! The client-side session layer of an IRC client: connection lifecycle,
//! conversations, permission checks, slash commands and alert decisions.
//! Wire handling lives behind [`protocol::ProtocolAdapter`]; presentation
//! consumes the observables exposed by [`session::Session`].

pub mod commands;
pub mod config;
pub mod connection;
pub mod conversation;
pub mod conversation_manager;
pub mod error;
pub mod identity;
pub mod message;
pub mod notifications;
pub mod permissions;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transcript;
pub mod validation;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use connection::ConnectionState;
pub use conversation::{ConversationKey, ConversationType};
pub use error::{CommandError, SessionError, TransportError};
pub use message::Message;
pub use protocol::{ConnectParams, ProtocolAdapter, ProtocolEvent, ServerDescriptor};
pub use session::{Session, SubmitOutcome};
