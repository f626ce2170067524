//! Error types for the recorder.
//!
//! Simple, flat error hierarchy. No over-engineering.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to spawn server process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("server exited with code {code} before reporting an endpoint")]
    StartupExited { code: i32 },

    #[error("server stopped before reporting an endpoint")]
    StartupEof,

    #[error("server startup timeout")]
    StartupTimeout,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("remote error: {message}")]
    Remote {
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("request timeout")]
    RpcTimeout,

    #[error("channel closed")]
    ChannelClosed,

    #[error("a recording is already in progress")]
    RecordingInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
