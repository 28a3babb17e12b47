//! Polling fallback
//!
//! Re-fetches a whole collection through the normal read API and compares
//! fingerprints, so it needs nothing from the server beyond what the first
//! page load already uses.

use crate::mode::TransportMode;
use crate::reconciler::Reconciler;
use crate::resource::{CollectionSource, Resource};
use deskwire_core::{fingerprint, EventKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default bound on a single collection fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Why a poll was run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollReason {
    /// First load of the collection; the view gets it without a toast
    Initial,
    /// Regular polling tick
    Timer,
    /// The view regained focus
    Focus,
    /// The view became visible again
    Visible,
    /// Manual refresh; always reaches the view
    Force,
    /// A push session (re)connected; catches up on changes made while it
    /// was down
    Resync,
    /// A pushed change event asked for a re-read
    Event(EventKind),
}

impl PollReason {
    /// Event kind reported to the view for a resulting update
    pub fn kind(&self) -> EventKind {
        match self {
            PollReason::Initial | PollReason::Timer => EventKind::PollingUpdate,
            PollReason::Focus | PollReason::Visible => EventKind::FocusUpdate,
            PollReason::Force => EventKind::ForceUpdate,
            PollReason::Resync => EventKind::Connected,
            PollReason::Event(kind) => *kind,
        }
    }
}

/// How often to poll in each mode
#[derive(Debug, Clone, Copy)]
pub struct PollCadence {
    pub interval: Duration,
    /// Slow safety poll while push is healthy; `None` disables it
    pub backstop: Option<Duration>,
}

impl PollCadence {
    fn period(&self, mode: TransportMode) -> Option<Duration> {
        match mode {
            TransportMode::Polling => Some(self.interval),
            TransportMode::Push => self.backstop,
        }
    }
}

/// Polls one resource and feeds changes to its reconciler
pub struct Poller<R: Resource> {
    source: Arc<dyn CollectionSource<R::Item>>,
    reconciler: Arc<Reconciler<R::Item>>,
    snapshot: Option<String>,
    fetch_timeout: Duration,
}

impl<R: Resource> Poller<R> {
    pub fn new(
        source: Arc<dyn CollectionSource<R::Item>>,
        reconciler: Arc<Reconciler<R::Item>>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            reconciler,
            snapshot: None,
            fetch_timeout,
        }
    }

    /// Fingerprint of the last collection handed to the view
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Fetch once and hand the collection to the reconciler if it changed
    /// (or unconditionally for [`PollReason::Force`]).
    ///
    /// Fetch errors and timeouts are logged and leave the snapshot alone so
    /// the next tick retries. Returns whether an update was emitted.
    pub async fn poll_once(&mut self, reason: PollReason) -> bool {
        let items = match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                warn!(resource = R::NAME, ?reason, "Polling fetch failed: {}", e);
                return false;
            }
            Err(_) => {
                warn!(
                    resource = R::NAME,
                    ?reason,
                    timeout = ?self.fetch_timeout,
                    "Polling fetch timed out"
                );
                return false;
            }
        };

        let digest = fingerprint(&items);
        let changed = self.snapshot.as_deref() != Some(digest.as_str());
        if !changed && reason != PollReason::Force {
            debug!(resource = R::NAME, ?reason, "Collection unchanged");
            return false;
        }

        // Nothing to compare against yet, so this is a load and not a change
        let reason = match reason {
            PollReason::Timer | PollReason::Focus | PollReason::Visible | PollReason::Resync
                if self.snapshot.is_none() =>
            {
                PollReason::Initial
            }
            other => other,
        };

        debug!(resource = R::NAME, ?reason, count = items.len(), "Collection changed");
        self.reconciler.apply_snapshot(reason, &items, &digest);
        self.snapshot = Some(digest);
        true
    }

    /// Poll on the cadence for the current mode, plus on every trigger.
    ///
    /// Performs an initial load first. Switching into polling mode polls
    /// immediately. Returns when the trigger channel or the mode channel
    /// closes.
    pub async fn run(
        mut self,
        cadence: PollCadence,
        mut triggers: mpsc::Receiver<PollReason>,
        mut mode_rx: watch::Receiver<TransportMode>,
    ) {
        self.poll_once(PollReason::Initial).await;

        let mut mode = *mode_rx.borrow_and_update();
        let mut next_tick = cadence.period(mode).map(|p| Instant::now() + p);

        loop {
            let tick = async move {
                match next_tick {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = tick => {
                    self.poll_once(PollReason::Timer).await;
                    next_tick = cadence.period(mode).map(|p| Instant::now() + p);
                }
                trigger = triggers.recv() => match trigger {
                    Some(reason) => {
                        self.poll_once(reason).await;
                    }
                    None => return,
                },
                changed = mode_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let next = *mode_rx.borrow_and_update();
                    if next != mode {
                        mode = next;
                        self.reconciler.mode_changed(mode);
                        if mode == TransportMode::Polling {
                            self.poll_once(PollReason::Timer).await;
                        }
                        next_tick = cadence.period(mode).map(|p| Instant::now() + p);
                    }
                }
            }
        }
    }
}
