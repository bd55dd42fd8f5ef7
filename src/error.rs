use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("invalid format: {0}")] // Json not parsed/missing fields
    InvalidFormat(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connection closed by server ({code}): {reason}")]
    ClosedByPeer { code: u16, reason: String },
    #[error("could not connect: {0}")]
    ConnectFailed(String),
    #[error("request rejected by server: {0}")]
    Rejected(String),
    #[error("no response within {0:?}")]
    ResponseTimeout(Duration),
    #[error("client disconnected")]
    Disconnected,
    #[error("connection task is not running")]
    TaskStopped,
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<tungstenite::Error> for PubSubError {
    fn from(e: tungstenite::Error) -> Self {
        PubSubError::WebSocket(Box::new(e))
    }
}

/// Failures reported by a [`crate::auth::TokenProvider`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no valid access token for scope {scope:?}")]
    InvalidToken { scope: Option<String> },
    #[error("token provider failed: {0}")]
    Provider(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_carries_server_text() {
        let e = PubSubError::Rejected("ERR_BADAUTH".into());
        assert_eq!(e.to_string(), "request rejected by server: ERR_BADAUTH");
    }

    #[test]
    fn auth_errors_are_transparent() {
        let e: PubSubError = AuthError::InvalidToken { scope: Some("bits:read".into()) }.into();
        assert_eq!(e.to_string(), "no valid access token for scope Some(\"bits:read\")");
    }
}
