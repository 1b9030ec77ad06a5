//! Error taxonomy for the socket.
//!
//! Transport failures kill the read loop; a remote error resolves only the
//! one caller whose command it answers. Dropped correlations, unknown events
//! and duplicate handlers are logged conditions, not error values.

use thiserror::Error;

use crate::protocol::RemoteError;

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote rejected this specific command.
    #[error("remote error: {code} - {message}")]
    Remote { code: i64, message: String },

    /// Connection dropped while the command was in flight.
    #[error("connection lost while waiting for response")]
    ConnectionLost,

    #[error("socket is not connected")]
    NotConnected,

    #[error("request timeout")]
    Timeout,

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<RemoteError> for CdpError {
    fn from(err: RemoteError) -> Self {
        CdpError::Remote {
            code: err.code,
            message: err.message,
        }
    }
}

/// Result type for socket operations
pub type Result<T> = std::result::Result<T, CdpError>;
