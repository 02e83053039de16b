//! Error taxonomy shared by the connection, dispatcher and lobby layers

use crate::hub::connection::ConnectionState;

/// Failures establishing the hub connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Hub unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Hub rejected the handshake: {0}")]
    HandshakeRejected(String),

    #[error("Hub handshake timed out")]
    HandshakeTimeout,

    #[error("Invalid hub endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Failures of an outbound hub invocation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("Connection was never established")]
    NotConnected,

    #[error("Connection is {0:?}, expected Connected")]
    InvalidState(ConnectionState),

    #[error("Hub error: {0}")]
    Remote(String),

    #[error("Connection lost before {method} completed")]
    ConnectionLost { method: String },

    #[error("{method} timed out waiting for completion")]
    Timeout { method: String },

    #[error("Failed to encode or decode payload: {0}")]
    Serialization(String),

    #[error("Outbound rate limit reached")]
    Throttled,
}

impl From<serde_json::Error> for InvokeError {
    fn from(e: serde_json::Error) -> Self {
        InvokeError::Serialization(e.to_string())
    }
}

/// A wire payload that could not be normalized into a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed {event} payload: {reason}")]
pub struct MalformedPayload {
    pub event: &'static str,
    pub reason: String,
}

impl MalformedPayload {
    pub fn new(event: &'static str, reason: impl Into<String>) -> Self {
        Self {
            event,
            reason: reason.into(),
        }
    }
}

/// Handler registry misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("A handler for {0} is already registered")]
    Duplicate(String),
}

/// Lobby intent failures surfaced to the UI
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Only the lobby leader can do that")]
    NotLeader,

    #[error("No room name is known yet")]
    NoRoomName,

    #[error("A lobby request is already in flight")]
    RequestInFlight,

    #[error("Invalid lobby form: {0}")]
    InvalidForm(String),

    #[error("The game is not over yet")]
    GameNotOver,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}
