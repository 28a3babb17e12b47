//! Deskwire Client
//!
//! Keeps a local view of a helpdesk collection fresh.
//!
//! A watcher combines three pieces:
//! - a push transport (WebSocket or SSE) with bounded reconnects, whose
//!   events are treated as invalidation hints
//! - a polling fallback that re-fetches the whole collection and compares
//!   fingerprints, taking over when push is not connected within a grace
//!   period
//! - a reconciler that turns both into view updates and rate-limited toasts

pub mod connection;
pub mod error;
pub mod mode;
pub mod poller;
pub mod push;
pub mod reconciler;
pub mod resource;
pub mod sse;
pub mod watcher;

pub use connection::{ConnectionState, ReconnectPolicy};
pub use error::ClientError;
pub use mode::TransportMode;
pub use poller::{PollCadence, PollReason, Poller};
pub use reconciler::{Inbound, ReconcileHandler, Reconciler, Toast, Update, UpdateSource};
pub use resource::{CollectionSource, HttpSource, Notices, PollProfile, Resource, Tickets};
pub use sse::SseDecoder;
pub use watcher::{spawn_http_watcher, spawn_watcher, TransportChoice, WatchConfig, WatchHandle};
