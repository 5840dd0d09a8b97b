//! Relay error types

use thiserror::Error;

/// Errors that can occur in the relay
///
/// Authorization outcomes are never errors: a denied tool call is a `false`
/// from the authorizer. These variants cover I/O, configuration and
/// lifecycle failures only.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Agent engine could not be constructed
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unknown session command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl RelayError {
    /// Create an engine initialization error
    pub fn engine_init(msg: impl Into<String>) -> Self {
        RelayError::EngineInit(msg.into())
    }
}

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
