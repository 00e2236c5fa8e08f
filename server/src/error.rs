//! Error types for the registry, admission, transport and delivery paths.
//!
//! None of these reach an RPC caller or a connected client directly: the
//! registry logs and swallows mutation failures, admission failures become a
//! close frame, and delivery failures become `UNABLE_TO_DELIVER`.

use std::time::Duration;

/// Failure talking to the shared registry backing store.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry store is not connected")]
    Disconnected,

    #[error("registry store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("registry store command failed: {0}")]
    Store(#[from] redis::RedisError),

    #[error("registry store unreachable after {attempts} connection attempts")]
    Unavailable { attempts: u32 },
}

impl RegistryError {
    /// Whether a command error means the socket to the store has gone away
    /// and the connectivity supervisor should reconnect.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Store(err) => err.is_connection_dropped() || err.is_io_error(),
            Self::Disconnected | Self::Timeout(_) | Self::Unavailable { .. } => false,
        }
    }
}

/// Reason a connection attempt was refused.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("connection attempt carried no {0} header")]
    MissingCredential(&'static str),

    #[error("authentication service rejected the session: {0}")]
    Rejected(String),

    #[error("authentication service returned no session data")]
    EmptySession,

    #[error("authentication service unreachable: {0}")]
    Unreachable(String),

    #[error("authentication service did not answer within {0:?}")]
    Timeout(Duration),
}

/// Failure pushing one frame to one local connection.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection writer has shut down")]
    Closed,
}

/// A delivery request that could not be carried through the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("delivery task failed: {0}")]
    Task(String),
}
