//! Error type definitions for the signage agent
//!
//! This module defines all error types used throughout the agent,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the agent.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Campaign API and media download errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Media player process and IPC errors
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    /// Persisted state document errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unusable at boot: no API credentials and no offline media
    #[error("no API credentials and no usable offline media")]
    UnusableAtBoot,

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Campaign fetch and media download errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP transport failures (connect, DNS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the campaign endpoint
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body did not match the expected envelope
    #[error("Unexpected response shape: {message}")]
    UnexpectedResponse { message: String },

    /// The API returned zero playable items and empty playlists are not allowed
    #[error("API returned an empty playlist")]
    EmptyPlaylist,

    /// Bytes written did not match the advertised Content-Length
    #[error("Short read for {url}: got {written} of {expected} bytes")]
    ShortRead {
        url: String,
        written: u64,
        expected: u64,
    },

    /// Filesystem failures while staging a download
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Media player process and IPC channel errors
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The child process could not be spawned
    #[error("Failed to spawn player: {0}")]
    Spawn(std::io::Error),

    /// The IPC endpoint never became connectable after spawn
    #[error("Player IPC endpoint not available at {path}")]
    IpcUnavailable { path: PathBuf },

    /// Read/write failure on an established IPC channel
    #[error("IPC I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be parsed or a response never arrived
    #[error("IPC protocol error: {message}")]
    Protocol { message: String },
}

/// Persisted state document errors
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem failures on state/cache files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failures for persisted documents
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted document exists but is not usable
    #[error("Invalid state document {path}: {message}")]
    InvalidDocument { path: PathBuf, message: String },
}

impl AgentError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Create an unexpected-response error
    pub fn unexpected<S: Into<String>>(message: S) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }
}

impl PlayerError {
    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}
