use crate::board::TicketBoard;
use crate::config::ServerConfig;
use deskwire_hub::{FanoutHub, Notifier};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Realtime fan-out hub shared by the WebSocket and SSE transports
    pub hub: Arc<FanoutHub>,

    /// Ticket and notice store
    pub board: Arc<TicketBoard>,

    /// Prometheus handle for rendering `/metrics` (absent in tests)
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the state with the hub initialized and wired in as the board's notifier
    pub fn new(config: ServerConfig, metrics_handle: Option<PrometheusHandle>) -> Self {
        let hub = Arc::new(FanoutHub::new());
        let notifier: Arc<dyn Notifier> = hub.clone();
        Self::with_notifier(config, hub, notifier, metrics_handle)
    }

    /// Build the state around an explicit notifier, e.g. a fake in tests
    pub fn with_notifier(
        config: ServerConfig,
        hub: Arc<FanoutHub>,
        notifier: Arc<dyn Notifier>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        hub.initialize(config.realtime.transport_settings());
        Self {
            config: Arc::new(config),
            hub,
            board: Arc::new(TicketBoard::new(notifier)),
            metrics_handle,
        }
    }
}
