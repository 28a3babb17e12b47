use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::ORIGIN, HeaderMap},
    response::{IntoResponse, Response},
};
use deskwire_core::{ClientMessage, Event, PushFrame};
use deskwire_hub::{
    ChannelSink, DisconnectReason, Subscriber, SubscriberId, SubscriberState, TransportKind,
    TransportSettings,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// WebSocket handler for the push channel
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let Some(transport) = state.hub.transport() else {
        return AppError::Unavailable("realtime transport not initialized".to_string())
            .into_response();
    };

    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    if !transport.is_origin_allowed(origin) {
        tracing::warn!(?origin, "Rejected push connection from disallowed origin");
        return AppError::Forbidden("origin not allowed".to_string()).into_response();
    }

    let settings = transport.settings().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, state, settings))
}

async fn handle_socket(socket: WebSocket, state: AppState, settings: TransportSettings) {
    let (mut sender, mut receiver) = socket.split();
    let mut lifecycle = SubscriberState::Connecting;

    let (sink, mut events) = ChannelSink::channel(settings.subscriber_buffer);
    let id = state
        .hub
        .register(Subscriber::new(TransportKind::Push, Arc::new(sink)));

    // Acknowledge with the subscriber id before anything else
    let ack = Event::connected(
        Some(id.to_string()),
        "Conectado ao servidor de notificações",
    );
    let reason = if send_event(&mut sender, &ack).await {
        lifecycle = lifecycle.advance(SubscriberState::Connected);
        tracing::debug!(subscriber = %id, "Push subscriber connected");
        run_connection(&state, id, &settings, &mut sender, &mut receiver, &mut events).await
    } else {
        DisconnectReason::Error
    };

    lifecycle = lifecycle.advance(SubscriberState::Disconnected(reason));
    tracing::debug!(subscriber = %id, state = ?lifecycle, "Push subscriber disconnected");

    state.hub.unregister(id);
    lifecycle = lifecycle.advance(SubscriberState::Removed);
    tracing::trace!(subscriber = %id, state = ?lifecycle, "Push subscriber removed");
}

async fn run_connection(
    state: &AppState,
    id: SubscriberId,
    settings: &TransportSettings,
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    events: &mut tokio::sync::mpsc::Receiver<Arc<Event>>,
) -> DisconnectReason {
    let mut ping = interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if !send_event(sender, &event).await {
                        return DisconnectReason::Error;
                    }
                }
                // Pruned by the hub
                None => return DisconnectReason::Error,
            },

            incoming = receiver.next() => match incoming {
                Some(Ok(msg)) => {
                    last_seen = Instant::now();
                    match msg {
                        Message::Text(text) => handle_client_message(state, id, &text),
                        Message::Close(_) => return DisconnectReason::Clean,
                        Message::Ping(data) => {
                            // Pong is handled automatically by axum
                            tracing::trace!("Received ping: {:?}", data);
                        }
                        _ => {}
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(subscriber = %id, "Push socket error: {}", e);
                    return DisconnectReason::Error;
                }
                None => return DisconnectReason::Clean,
            },

            _ = ping.tick() => {
                if last_seen.elapsed() > settings.pong_timeout {
                    tracing::info!(subscriber = %id, "Push subscriber timed out");
                    return DisconnectReason::Error;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    return DisconnectReason::Error;
                }
            }
        }
    }
}

fn handle_client_message(state: &AppState, id: SubscriberId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::JoinRoom { room }) => {
            state.hub.join(id, room);
            tracing::debug!(subscriber = %id, %room, "Joined room");
        }
        Ok(ClientMessage::LeaveRoom { room }) => {
            state.hub.leave(id, room);
            tracing::debug!(subscriber = %id, %room, "Left room");
        }
        Err(e) => {
            tracing::debug!(subscriber = %id, "Ignoring unrecognized client message: {}", e);
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &Event) -> bool {
    let frame = PushFrame::from(event.clone());
    match serde_json::to_string(&frame) {
        Ok(msg) => sender.send(Message::Text(msg)).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize event: {}", e);
            true
        }
    }
}
