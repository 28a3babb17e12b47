//! Server-Sent Events transport
//!
//! Fallback push channel for networks where the WebSocket upgrade does not
//! make it through. Each open response is one subscriber; dropping the
//! response body (client abort, tab close) unregisters it.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::header::{CACHE_CONTROL, CONNECTION},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use deskwire_core::Event;
use deskwire_hub::{ChannelSink, FanoutHub, Subscriber, SubscriberId, TransportKind};
use futures_util::Stream;
use pin_project::{pin_project, pinned_drop};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio_stream::wrappers::ReceiverStream;

pub async fn event_stream(State(state): State<AppState>) -> Response {
    let Some(transport) = state.hub.transport() else {
        return AppError::Unavailable("realtime transport not initialized".to_string())
            .into_response();
    };
    let settings = transport.settings();

    let stream = SubscriptionStream::open(Arc::clone(&state.hub), settings.subscriber_buffer);
    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(settings.heartbeat_interval)
            .text("heartbeat"),
    );

    (
        [(CACHE_CONTROL, "no-cache"), (CONNECTION, "keep-alive")],
        sse,
    )
        .into_response()
}

/// One SSE subscriber: a `connected` greeting followed by every event the
/// hub delivers to it.
#[pin_project(PinnedDrop)]
pub struct SubscriptionStream {
    id: SubscriberId,
    hub: Arc<FanoutHub>,
    greeting: Option<Event>,
    #[pin]
    events: ReceiverStream<Arc<Event>>,
}

impl SubscriptionStream {
    /// Register a stream subscriber with the hub
    pub fn open(hub: Arc<FanoutHub>, buffer: usize) -> Self {
        let (sink, receiver) = ChannelSink::channel(buffer);
        let id = hub.register(Subscriber::new(TransportKind::Stream, Arc::new(sink)));
        tracing::debug!(subscriber = %id, "Stream subscriber connected");

        Self {
            id,
            hub,
            greeting: Some(Event::connected(None, "Conectado ao stream de eventos")),
            events: ReceiverStream::new(receiver),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<SseEvent, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Some(greeting) = this.greeting.take() {
            if let Some(frame) = to_frame(&greeting) {
                return Poll::Ready(Some(Ok(frame)));
            }
        }

        loop {
            match ready!(this.events.as_mut().poll_next(cx)) {
                Some(event) => {
                    if let Some(frame) = to_frame(&event) {
                        return Poll::Ready(Some(Ok(frame)));
                    }
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

#[pinned_drop]
impl PinnedDrop for SubscriptionStream {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if this.hub.unregister(*this.id) {
            tracing::debug!(subscriber = %this.id, "Stream subscriber disconnected");
        }
    }
}

fn to_frame(event: &Event) -> Option<SseEvent> {
    match SseEvent::default().json_data(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!(kind = %event.kind(), "Failed to serialize SSE payload: {}", e);
            None
        }
    }
}
