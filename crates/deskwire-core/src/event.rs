//! Realtime event vocabulary and wire frames
//!
//! Events are invalidation hints: a client that receives one re-reads the
//! authoritative collection instead of trusting the payload as a state feed.
//! Delivery is at-most-once with no replay.

use crate::types::{Notice, Ticket};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A state change pushed from the server to subscribers.
///
/// Serialized with a `type` tag, e.g. `{"type":"ticket_created","ticket":{..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TicketCreated {
        ticket: Ticket,
    },
    TicketUpdated {
        ticket: Ticket,
    },
    NoticeCreated {
        notice: Notice,
    },
    NoticeUpdated {
        notice: Notice,
    },
    NoticeDeleted {
        id: u64,
    },
    /// Sent once on every new connection
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
    },
}

impl Event {
    /// Connection acknowledgement for a freshly registered subscriber
    pub fn connected(id: Option<String>, message: impl Into<String>) -> Self {
        Event::Connected {
            id,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::TicketCreated { .. } => EventKind::TicketCreated,
            Event::TicketUpdated { .. } => EventKind::TicketUpdated,
            Event::NoticeCreated { .. } => EventKind::NoticeCreated,
            Event::NoticeUpdated { .. } => EventKind::NoticeUpdated,
            Event::NoticeDeleted { .. } => EventKind::NoticeDeleted,
            Event::Connected { .. } => EventKind::Connected,
        }
    }

    /// Topic the event belongs to. Connection acks are addressed to one
    /// subscriber and have none.
    pub fn topic(&self) -> Option<Topic> {
        match self {
            Event::TicketCreated { .. } | Event::TicketUpdated { .. } => Some(Topic::Tickets),
            Event::NoticeCreated { .. }
            | Event::NoticeUpdated { .. }
            | Event::NoticeDeleted { .. } => Some(Topic::Notices),
            Event::Connected { .. } => None,
        }
    }

    /// Named channel used when the event travels over the push socket
    pub fn push_channel(&self) -> PushChannel {
        match self.topic() {
            Some(Topic::Tickets) => PushChannel::TicketUpdate,
            Some(Topic::Notices) => PushChannel::NoticeUpdate,
            None => PushChannel::Connected,
        }
    }
}

/// Every event kind a client reconciler understands, including the ones it
/// synthesizes locally from polling, focus and manual refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TicketCreated,
    TicketUpdated,
    NoticeCreated,
    NoticeUpdated,
    NoticeDeleted,
    Connected,
    PollingUpdate,
    FocusUpdate,
    ForceUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TicketCreated => "ticket_created",
            EventKind::TicketUpdated => "ticket_updated",
            EventKind::NoticeCreated => "notice_created",
            EventKind::NoticeUpdated => "notice_updated",
            EventKind::NoticeDeleted => "notice_deleted",
            EventKind::Connected => "connected",
            EventKind::PollingUpdate => "polling_update",
            EventKind::FocusUpdate => "focus_update",
            EventKind::ForceUpdate => "force_update",
        }
    }

    /// Whether this kind reports a data change (as opposed to a lifecycle ack)
    pub fn is_change(&self) -> bool {
        !matches!(self, EventKind::Connected)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical group of events a push subscriber can join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Tickets,
    Notices,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Tickets => "tickets",
            Topic::Notices => "notices",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named server-to-client channel on the push socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PushChannel {
    Connected,
    TicketUpdate,
    NoticeUpdate,
}

/// Text frame written to a push socket: `{"event":"ticket-update","data":{..}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub event: PushChannel,
    pub data: Event,
}

impl From<Event> for PushFrame {
    fn from(data: Event) -> Self {
        Self {
            event: data.push_channel(),
            data,
        }
    }
}

/// Control messages a push client may send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom { room: Topic },
    LeaveRoom { room: Topic },
}
