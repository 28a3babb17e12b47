//! Merges pushed events and polling results into the local view
//!
//! Pushed events are only hints. The view is always rebuilt from a fetched
//! collection, so out-of-order or duplicated events are harmless; the only
//! thing they drive directly is the toast, which is rate limited.

use crate::mode::TransportMode;
use crate::poller::PollReason;
use crate::resource::Resource;
use deskwire_core::{Event, EventKind, PushFrame, Topic};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default window in which repeated changes collapse into one toast
pub const DEFAULT_TOAST_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Push,
    Stream,
    Polling,
}

/// A fresh view of the collection handed to the view layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub kind: EventKind,
    pub topic: Topic,
    pub fingerprint: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: EventKind,
    pub message: String,
    /// Changes swallowed since the previous toast
    pub suppressed: usize,
}

/// What an inbound transport frame turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Connection acknowledgement, with the server-assigned id if any
    Connected(Option<String>),
    /// A change on the watched topic; the caller should re-fetch
    Change(EventKind),
    /// Malformed, or for another topic
    Ignored,
}

/// Receives reconciled output. Passed in explicitly instead of reaching for
/// any shared global.
pub trait ReconcileHandler<T>: Send + Sync {
    fn on_update(&self, update: &Update, items: &[T]);

    fn on_toast(&self, _toast: &Toast) {}

    fn on_mode_change(&self, _mode: TransportMode) {}
}

struct ToastGate {
    window: Duration,
    last_shown: Option<Instant>,
    suppressed: usize,
}

impl ToastGate {
    /// Returns the number of suppressed changes to report if a toast may be
    /// shown now.
    fn admit(&mut self, now: Instant) -> Option<usize> {
        match self.last_shown {
            Some(last) if now.duration_since(last) < self.window => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last_shown = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

pub struct Reconciler<T> {
    topic: Topic,
    label: &'static str,
    handler: Arc<dyn ReconcileHandler<T>>,
    toasts: Mutex<ToastGate>,
}

impl<T> Reconciler<T> {
    pub fn new(
        topic: Topic,
        label: &'static str,
        handler: Arc<dyn ReconcileHandler<T>>,
        toast_window: Duration,
    ) -> Self {
        Self {
            topic,
            label,
            handler,
            toasts: Mutex::new(ToastGate {
                window: toast_window,
                last_shown: None,
                suppressed: 0,
            }),
        }
    }

    pub fn for_resource<R: Resource<Item = T>>(
        handler: Arc<dyn ReconcileHandler<T>>,
        toast_window: Duration,
    ) -> Self {
        Self::new(R::TOPIC, R::LABEL, handler, toast_window)
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Classify a pushed event and surface a toast for relevant changes
    pub fn on_event(&self, event: &Event, source: UpdateSource) -> Inbound {
        match event {
            Event::Connected { id, .. } => Inbound::Connected(id.clone()),
            _ if event.topic() == Some(self.topic) => {
                let kind = event.kind();
                debug!(%kind, ?source, "Change event received");
                self.toast(kind);
                Inbound::Change(kind)
            }
            _ => Inbound::Ignored,
        }
    }

    /// Decode a WebSocket text frame
    pub fn ingest_push_frame(&self, text: &str) -> Inbound {
        match serde_json::from_str::<PushFrame>(text) {
            Ok(frame) => self.on_event(&frame.data, UpdateSource::Push),
            Err(e) => {
                warn!("Dropping malformed push frame: {}", e);
                Inbound::Ignored
            }
        }
    }

    /// Decode the data of one SSE frame
    pub fn ingest_stream_data(&self, data: &str) -> Inbound {
        match serde_json::from_str::<Event>(data) {
            Ok(event) => self.on_event(&event, UpdateSource::Stream),
            Err(e) => {
                warn!("Dropping malformed stream frame: {}", e);
                Inbound::Ignored
            }
        }
    }

    /// Hand a changed (or force-refreshed) collection to the view
    pub fn apply_snapshot(&self, reason: PollReason, items: &[T], fingerprint: &str) {
        let update = Update {
            kind: reason.kind(),
            topic: self.topic,
            fingerprint: fingerprint.to_string(),
            count: items.len(),
        };
        self.handler.on_update(&update, items);

        // Pushed changes were already toasted when the event arrived
        if !matches!(reason, PollReason::Initial | PollReason::Event(_)) {
            self.toast(update.kind);
        }
    }

    pub fn mode_changed(&self, mode: TransportMode) {
        self.handler.on_mode_change(mode);
    }

    fn toast(&self, kind: EventKind) {
        let admitted = self.toasts.lock().admit(Instant::now());
        match admitted {
            Some(suppressed) => {
                let toast = Toast {
                    kind,
                    message: toast_message(kind, self.label),
                    suppressed,
                };
                self.handler.on_toast(&toast);
            }
            None => debug!(%kind, "Toast suppressed inside dedup window"),
        }
    }
}

fn toast_message(kind: EventKind, label: &str) -> String {
    match kind {
        EventKind::TicketCreated => "Novo chamado recebido".to_string(),
        EventKind::TicketUpdated => "Chamado atualizado".to_string(),
        EventKind::NoticeCreated => "Novo aviso publicado".to_string(),
        EventKind::NoticeUpdated => "Aviso atualizado".to_string(),
        EventKind::NoticeDeleted => "Aviso removido".to_string(),
        _ => format!("{} atualizados", label),
    }
}
