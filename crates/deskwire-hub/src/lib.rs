//! Deskwire Hub
//!
//! Fan-out of helpdesk change events to every connected browser tab.
//!
//! The hub is constructed once at process start and handed to request
//! handlers by reference. Event sources talk to it through the [`Notifier`]
//! trait so tests can swap in a fake.
//!
//! Delivery is best-effort: a subscriber that is not registered when an
//! event is broadcast never sees that event, and a broken subscriber is
//! pruned without affecting anyone else.

pub mod hub;
pub mod stats;
pub mod subscriber;
pub mod transport;

pub use hub::{BroadcastReport, FanoutHub, Notifier};
pub use stats::{HubMetrics, HubMetricsSnapshot};
pub use subscriber::{
    ChannelSink, DeliveryError, DisconnectReason, Subscriber, SubscriberId, SubscriberSink,
    SubscriberState, TransportKind,
};
pub use transport::{AllowedOrigins, PushTransport, TransportSettings};
