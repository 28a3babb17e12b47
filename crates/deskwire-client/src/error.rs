use thiserror::Error;

/// Errors raised by fetches and transport sessions.
///
/// None of these reach the view; they are logged and retried.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("connection closed: {0}")]
    Closed(String),
}
