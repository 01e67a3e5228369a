use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the websocket layer.
///
/// `DuplicateSubscription` and `CommandEncode` are returned synchronously from
/// subscribe calls and leave the connection usable. Everything surfaced from
/// the run loop (`RemoteClosed`, `AuthFailed`, `UnknownSubscription`,
/// `Decode`) is fatal to that connection; there is no internal retry.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("websocket connect failed: {0}")]
    ConnectFailed(String),

    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("write failed: {0}")]
    Write(String),

    #[error("read failed: {0}")]
    Read(String),

    /// The peer closed the connection cleanly.
    #[error("connection closed by remote peer")]
    RemoteClosed { reason: Option<String> },

    /// The read half was never opened or has already been consumed by `start`.
    #[error("connection is not open")]
    NotConnected,

    #[error("duplicate subscription for topic {0}")]
    DuplicateSubscription(String),

    #[error("no subscription registered for topic {0}")]
    UnknownSubscription(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode command: {0}")]
    CommandEncode(#[source] serde_json::Error),
}

impl WsError {
    /// True when the connection ended with a clean close from the peer rather
    /// than a transport or protocol failure.
    pub const fn is_normal_close(&self) -> bool {
        matches!(self, Self::RemoteClosed { .. })
    }
}
