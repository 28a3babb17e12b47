//! Push connection state and the bounded reconnect loop

use crate::error::ClientError;
use crate::poller::PollReason;
use crate::reconciler::{Inbound, Reconciler};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Observable state of a push transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Push is switched off for this watcher
    Disabled,
    Connecting,
    Connected,
    Disconnected,
    /// Retries exhausted
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disabled => "disabled",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Consecutive failed sessions before giving up
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub connect_timeout: Duration,
    /// A session with no inbound traffic for this long is considered dead
    pub idle_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given retry (1-based), doubling up to `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// What a running push session reports into
pub(crate) struct SessionLink<T> {
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub reconciler: Arc<Reconciler<T>>,
    pub triggers: mpsc::Sender<PollReason>,
}

impl<T> Clone for SessionLink<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            reconciler: self.reconciler.clone(),
            triggers: self.triggers.clone(),
        }
    }
}

impl<T> SessionLink<T> {
    /// Act on a decoded frame: acks mark the session connected and queue a
    /// catch-up fetch, changes queue a re-fetch.
    pub fn route(&self, inbound: Inbound) {
        match inbound {
            Inbound::Connected(id) => {
                debug!(?id, "Push transport acknowledged");
                self.state.send_replace(ConnectionState::Connected);
                // Events broadcast while the socket was down are never replayed
                let _ = self.triggers.try_send(PollReason::Resync);
            }
            Inbound::Change(kind) => {
                // A full queue already holds a pending re-fetch
                let _ = self.triggers.try_send(PollReason::Event(kind));
            }
            Inbound::Ignored => {}
        }
    }
}

/// Drive `session` until it has failed `max_attempts` times in a row.
///
/// The session is expected to publish `Connected` on `state` once its
/// handshake completes. A session that got that far resets the attempt
/// counter when it ends, so only consecutive failures count.
pub async fn run_with_reconnect<F, Fut>(
    label: &'static str,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    mut session: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ClientError>>,
{
    let mut attempts = 0u32;

    loop {
        state.send_replace(ConnectionState::Connecting);
        let result = session().await;
        let was_connected = *state.borrow() == ConnectionState::Connected;
        state.send_replace(ConnectionState::Disconnected);

        match result {
            Ok(()) => info!(transport = label, "Push session closed"),
            Err(e) => warn!(transport = label, "Push session ended: {}", e),
        }

        if was_connected {
            attempts = 0;
        }
        attempts += 1;

        if attempts >= policy.max_attempts {
            warn!(
                transport = label,
                attempts, "Giving up on push transport, falling back to polling"
            );
            state.send_replace(ConnectionState::Failed);
            return;
        }

        let delay = policy.delay_for(attempts);
        debug!(transport = label, attempt = attempts, ?delay, "Reconnecting");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{ReconcileHandler, Update, DEFAULT_TOAST_WINDOW};
    use crate::resource::Tickets;
    use deskwire_core::{EventKind, Ticket};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            ..Default::default()
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_consecutive_failures() {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        run_with_reconnect("test", quick_policy(), Arc::new(tx), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Timeout)
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*rx.borrow(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_session_resets_attempts() {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        let tx = Arc::new(tx);
        let calls = Arc::new(AtomicU32::new(0));

        // Connects on every other try; never reaches three failures in a row
        let counter = calls.clone();
        let state = tx.clone();
        let task = tokio::spawn(run_with_reconnect("test", quick_policy(), tx, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let state = state.clone();
            async move {
                if n % 2 == 0 {
                    state.send_replace(ConnectionState::Connected);
                    Ok(())
                } else {
                    Err(ClientError::Closed("reset".into()))
                }
            }
        }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(calls.load(Ordering::SeqCst) > 6);
        assert_ne!(*rx.borrow(), ConnectionState::Failed);
        task.abort();
    }

    struct Discard;

    impl ReconcileHandler<Ticket> for Discard {
        fn on_update(&self, _update: &Update, _items: &[Ticket]) {}
    }

    #[test]
    fn test_every_connect_queues_catch_up_fetch() {
        let (state, _rx) = watch::channel(ConnectionState::Connecting);
        let (triggers, mut queue) = mpsc::channel(8);
        let link = SessionLink {
            state: Arc::new(state),
            reconciler: Arc::new(Reconciler::for_resource::<Tickets>(
                Arc::new(Discard),
                DEFAULT_TOAST_WINDOW,
            )),
            triggers,
        };

        link.route(Inbound::Connected(Some("a".to_string())));
        assert_eq!(*link.state.borrow(), ConnectionState::Connected);
        assert_eq!(queue.try_recv().unwrap(), PollReason::Resync);

        // Socket dropped and came back within the grace period
        link.state.send_replace(ConnectionState::Disconnected);
        link.route(Inbound::Connected(None));
        assert_eq!(queue.try_recv().unwrap(), PollReason::Resync);

        link.route(Inbound::Change(EventKind::TicketUpdated));
        link.route(Inbound::Ignored);
        assert_eq!(
            queue.try_recv().unwrap(),
            PollReason::Event(EventKind::TicketUpdated)
        );
        assert!(queue.try_recv().is_err());
    }
}
