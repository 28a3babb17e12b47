//! Chooses between push and polling based on the push connection state

use crate::connection::ConnectionState;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

/// Default time push gets to reach `Connected` before polling takes over
pub const DEFAULT_GRACE: Duration = Duration::from_secs(15);

/// Effective refresh mode of a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Push transport drives refreshes, polling only runs as a slow backstop
    Push,
    Polling,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Push => f.write_str("push"),
            TransportMode::Polling => f.write_str("polling"),
        }
    }
}

enum Grace {
    Off,
    Armed(Instant),
    Expired,
}

fn set_mode(mode_tx: &watch::Sender<TransportMode>, mode: TransportMode) {
    let changed = mode_tx.send_if_modified(|current| {
        if *current == mode {
            false
        } else {
            *current = mode;
            true
        }
    });
    if changed {
        info!(%mode, "Transport mode changed");
    }
}

/// Follow `state_rx` and publish the effective mode on `mode_tx`.
///
/// The grace deadline is armed when push first leaves `Connected` (or never
/// got there) and is not pushed back by reconnect attempts cycling through
/// `Connecting`/`Disconnected`. Returns when either channel closes.
pub async fn supervise(
    mut state_rx: watch::Receiver<ConnectionState>,
    mode_tx: watch::Sender<TransportMode>,
    grace: Duration,
) {
    let mut timer = Grace::Off;

    loop {
        let state = *state_rx.borrow_and_update();
        match state {
            ConnectionState::Connected => {
                timer = Grace::Off;
                set_mode(&mode_tx, TransportMode::Push);
            }
            ConnectionState::Disabled | ConnectionState::Failed => {
                timer = Grace::Expired;
                set_mode(&mode_tx, TransportMode::Polling);
            }
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                if let Grace::Off = timer {
                    timer = Grace::Armed(Instant::now() + grace);
                }
            }
        }

        match timer {
            Grace::Armed(deadline) => {
                tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!(?grace, "Push not connected within grace period, switching to polling");
                        timer = Grace::Expired;
                        set_mode(&mode_tx, TransportMode::Polling);
                        if state_rx.changed().await.is_err() {
                            return;
                        }
                    }
                    _ = mode_tx.closed() => return,
                }
            }
            _ => {
                tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = mode_tx.closed() => return,
                }
            }
        }
    }
}
