//! Wires a poller, a push transport and the mode supervisor together for
//! one watched resource.

use crate::connection::{run_with_reconnect, ConnectionState, ReconnectPolicy, SessionLink};
use crate::error::ClientError;
use crate::mode::{self, TransportMode, DEFAULT_GRACE};
use crate::poller::{PollCadence, PollReason, Poller, DEFAULT_FETCH_TIMEOUT};
use crate::reconciler::{ReconcileHandler, Reconciler, DEFAULT_TOAST_WINDOW};
use crate::resource::{CollectionSource, HttpSource, PollProfile, Resource};
use crate::{push, sse};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Which push transport a watcher uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TransportChoice {
    /// WebSocket push channel
    Push,
    /// Server-sent events
    Stream,
    /// No push transport at all
    Polling,
}

impl fmt::Display for TransportChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportChoice::Push => f.write_str("push"),
            TransportChoice::Stream => f.write_str("stream"),
            TransportChoice::Polling => f.write_str("polling"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Server base URL, e.g. `http://localhost:8080`
    pub base_url: String,
    pub transport: TransportChoice,
    /// Polling interval while in polling mode
    pub interval: Duration,
    /// Safety poll while push is connected
    pub backstop: Option<Duration>,
    pub grace: Duration,
    pub reconnect: ReconnectPolicy,
    pub fetch_timeout: Duration,
    pub toast_window: Duration,
}

impl WatchConfig {
    pub fn new(base_url: impl Into<String>, transport: TransportChoice) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            interval: PollProfile::List.interval(),
            backstop: Some(Duration::from_secs(60)),
            grace: DEFAULT_GRACE,
            reconnect: ReconnectPolicy::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            toast_window: DEFAULT_TOAST_WINDOW,
        }
    }

    pub fn with_profile(mut self, profile: PollProfile) -> Self {
        self.interval = profile.interval();
        self
    }
}

/// Owns every task of a running watcher; dropping it tears them all down
pub struct WatchHandle {
    triggers: mpsc::Sender<PollReason>,
    mode: watch::Receiver<TransportMode>,
    connection: watch::Receiver<ConnectionState>,
    _state: Arc<watch::Sender<ConnectionState>>,
    tasks: Vec<JoinHandle<()>>,
}

impl WatchHandle {
    /// The view regained focus
    pub fn focus(&self) -> bool {
        self.trigger(PollReason::Focus)
    }

    /// The view became visible again
    pub fn visible(&self) -> bool {
        self.trigger(PollReason::Visible)
    }

    /// Manual refresh; always produces an update
    pub fn force_refresh(&self) -> bool {
        self.trigger(PollReason::Force)
    }

    pub fn mode(&self) -> TransportMode {
        *self.mode.borrow()
    }

    pub fn connection(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Receiver that observes every mode switch
    pub fn mode_changes(&self) -> watch::Receiver<TransportMode> {
        self.mode.clone()
    }

    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    fn trigger(&self, reason: PollReason) -> bool {
        self.triggers.try_send(reason).is_ok()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Start watching `R`, fetching through `source`.
///
/// Must be called inside a tokio runtime.
pub fn spawn_watcher<R: Resource>(
    config: WatchConfig,
    source: Arc<dyn CollectionSource<R::Item>>,
    handler: Arc<dyn ReconcileHandler<R::Item>>,
) -> Result<WatchHandle, ClientError> {
    let (trigger_tx, trigger_rx) = mpsc::channel(16);

    let (initial_state, initial_mode) = match config.transport {
        TransportChoice::Polling => (ConnectionState::Disabled, TransportMode::Polling),
        _ => (ConnectionState::Connecting, TransportMode::Push),
    };
    let (state_tx, state_rx) = watch::channel(initial_state);
    let state_tx = Arc::new(state_tx);
    let (mode_tx, mode_rx) = watch::channel(initial_mode);

    let reconciler = Arc::new(Reconciler::for_resource::<R>(handler, config.toast_window));
    let poller = Poller::<R>::new(source, reconciler.clone(), config.fetch_timeout);
    let cadence = PollCadence {
        interval: config.interval,
        backstop: config.backstop,
    };

    info!(
        resource = R::NAME,
        transport = %config.transport,
        interval = ?config.interval,
        "Starting watcher"
    );

    let mut tasks = vec![
        tokio::spawn(mode::supervise(state_rx.clone(), mode_tx, config.grace)),
        tokio::spawn(poller.run(cadence, trigger_rx, mode_rx.clone())),
    ];

    let link = SessionLink {
        state: state_tx.clone(),
        reconciler,
        triggers: trigger_tx.clone(),
    };
    let policy = config.reconnect.clone();

    match config.transport {
        TransportChoice::Push => {
            let url = push::ws_url(&config.base_url);
            tasks.push(tokio::spawn(run_with_reconnect(
                "push",
                policy.clone(),
                state_tx.clone(),
                move || {
                    let link = link.clone();
                    let url = url.clone();
                    let policy = policy.clone();
                    async move { push::run_session(&url, R::TOPIC, &policy, &link).await }
                },
            )));
        }
        TransportChoice::Stream => {
            let client = sse::stream_client(&policy)?;
            let url = format!("{}/api/events/stream", config.base_url.trim_end_matches('/'));
            tasks.push(tokio::spawn(run_with_reconnect(
                "stream",
                policy.clone(),
                state_tx.clone(),
                move || {
                    let link = link.clone();
                    let url = url.clone();
                    let policy = policy.clone();
                    let client = client.clone();
                    async move { sse::run_session(&client, &url, &policy, &link).await }
                },
            )));
        }
        TransportChoice::Polling => {}
    }

    Ok(WatchHandle {
        triggers: trigger_tx,
        mode: mode_rx,
        connection: state_rx,
        _state: state_tx,
        tasks,
    })
}

/// Start watching `R` through its HTTP read endpoint
pub fn spawn_http_watcher<R: Resource>(
    config: WatchConfig,
    handler: Arc<dyn ReconcileHandler<R::Item>>,
) -> Result<WatchHandle, ClientError> {
    let source = HttpSource::<R>::new(&config.base_url, config.fetch_timeout)?;
    spawn_watcher::<R>(config, Arc::new(source), handler)
}
