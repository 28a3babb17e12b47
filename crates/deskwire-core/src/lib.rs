//! Deskwire Core
//!
//! Types shared by the helpdesk realtime server and its clients.
//!
//! This crate provides:
//! - Ticket and notice records as they travel over the read API
//! - The realtime event vocabulary and its wire frames
//! - Order-independent collection fingerprints used by the polling fallback
//! - The common error type

pub mod error;
pub mod event;
pub mod fingerprint;
pub mod types;

pub use error::{Error, Result};
pub use event::{ClientMessage, Event, EventKind, PushChannel, PushFrame, Topic};
pub use fingerprint::{fingerprint, Fingerprintable};
pub use types::{Notice, NoticeSeverity, Ticket, TicketPriority, TicketStatus};
