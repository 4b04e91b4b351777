//! Error types for the mediation channel.

use std::io;
use thiserror::Error;

/// Errors from channel operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON encode/decode error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Peer closed the connection before a full line arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// Line exceeded the size limit.
    #[error("message too large: more than {0} bytes")]
    MessageTooLarge(usize),

    /// Payload did not match the message type's schema.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Response did not correspond to the request.
    #[error("mismatched response: {0}")]
    MismatchedResponse(String),

    /// The broker is not reachable from this process.
    #[error("capability broker not running: {0}")]
    NotRunning(String),

    /// `start()` called twice.
    #[error("server already started")]
    AlreadyStarted,
}

/// Result type for channel operations.
pub type ControlResult<T> = Result<T, ControlError>;
