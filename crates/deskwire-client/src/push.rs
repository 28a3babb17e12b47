//! Push-channel (WebSocket) client session

use crate::connection::{ReconnectPolicy, SessionLink};
use crate::error::ClientError;
use deskwire_core::{ClientMessage, Topic};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// WebSocket endpoint for an HTTP base URL
pub fn ws_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws", base)
}

/// Connect, join `topic` and read frames until the socket closes or goes
/// idle. Pings are answered by the protocol layer.
pub(crate) async fn run_session<T>(
    url: &str,
    topic: Topic,
    policy: &ReconnectPolicy,
    link: &SessionLink<T>,
) -> Result<(), ClientError> {
    let (mut socket, _) =
        tokio::time::timeout(policy.connect_timeout, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| ClientError::Timeout)??;
    debug!(url, %topic, "Push socket open");

    let join = serde_json::to_string(&ClientMessage::JoinRoom { room: topic })?;
    socket.send(Message::Text(join)).await?;

    loop {
        let message = match tokio::time::timeout(policy.idle_timeout, socket.next()).await {
            Err(_) => return Err(ClientError::Timeout),
            Ok(None) => return Ok(()),
            Ok(Some(message)) => message?,
        };
        match message {
            Message::Text(text) => link.route(link.reconciler.ingest_push_frame(&text)),
            Message::Close(frame) => {
                debug!(?frame, "Push socket closed by server");
                return Ok(());
            }
            _ => {}
        }
    }
}
