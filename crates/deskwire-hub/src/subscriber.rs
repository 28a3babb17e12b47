//! Subscriber handles owned by the hub

use deskwire_core::{Event, Topic};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque identity of one client connection.
///
/// A reconnect always gets a fresh id; there is no session continuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which transport a subscriber is attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Bidirectional WebSocket channel
    Push,
    /// Server-Sent Events response
    Stream,
}

/// Why a write to a subscriber failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiving side is gone; the subscriber must be pruned
    #[error("subscriber handle is closed")]
    Closed,

    /// The subscriber's buffer is full; this event is dropped for it
    #[error("subscriber is lagging, event dropped")]
    Lagging,
}

/// Non-blocking write side of a subscriber connection
pub trait SubscriberSink: Send + Sync {
    fn deliver(&self, event: &Arc<Event>) -> Result<(), DeliveryError>;
}

/// Sink backed by a bounded tokio channel drained by the connection task
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Arc<Event>>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Arc<Event>>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiver the connection task reads from
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<Event>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }
}

impl SubscriberSink for ChannelSink {
    fn deliver(&self, event: &Arc<Event>) -> Result<(), DeliveryError> {
        self.sender.try_send(Arc::clone(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// One registered connection
#[derive(Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub kind: TransportKind,
    /// `None` receives every topic; `Some` only the joined ones
    topics: Option<HashSet<Topic>>,
    sink: Arc<dyn SubscriberSink>,
}

impl Subscriber {
    pub fn new(kind: TransportKind, sink: Arc<dyn SubscriberSink>) -> Self {
        Self {
            id: SubscriberId::new(),
            kind,
            topics: None,
            sink,
        }
    }

    /// Whether this subscriber should receive the event
    pub fn wants(&self, event: &Event) -> bool {
        match (&self.topics, event.topic()) {
            (None, _) | (_, None) => true,
            (Some(joined), Some(topic)) => joined.contains(&topic),
        }
    }

    pub fn join(&mut self, topic: Topic) {
        self.topics.get_or_insert_with(HashSet::new).insert(topic);
    }

    pub fn leave(&mut self, topic: Topic) {
        if let Some(joined) = self.topics.as_mut() {
            joined.remove(&topic);
        }
    }

    pub(crate) fn deliver(&self, event: &Arc<Event>) -> Result<(), DeliveryError> {
        self.sink.deliver(event)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("topics", &self.topics)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectReason {
    /// Close frame, navigation away or tab close
    Clean,
    /// Network drop, protocol error or liveness timeout
    Error,
}

/// Lifecycle of a single connection as seen by its transport task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberState {
    Connecting,
    Connected,
    Disconnected(DisconnectReason),
    Removed,
}

impl SubscriberState {
    /// Move to `next` if the transition is legal, otherwise stay put
    pub fn advance(self, next: SubscriberState) -> SubscriberState {
        use SubscriberState::*;
        match (self, next) {
            (Connecting, Connected)
            | (Connecting, Disconnected(_))
            | (Connected, Disconnected(_))
            | (Disconnected(_), Removed) => next,
            _ => self,
        }
    }
}
