//! Watchers against a live Deskwire server

use deskwire_client::{
    spawn_http_watcher, ConnectionState, Notices, ReconcileHandler, ReconnectPolicy, Tickets,
    TransportChoice, TransportMode, Update, WatchConfig,
};
use deskwire_core::{EventKind, Notice, Ticket};
use deskwire_server::board::{NewNotice, NewTicket};
use deskwire_server::{build_app, AppState, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Forward(mpsc::UnboundedSender<Update>);

impl ReconcileHandler<Ticket> for Forward {
    fn on_update(&self, update: &Update, _items: &[Ticket]) {
        let _ = self.0.send(update.clone());
    }
}

impl ReconcileHandler<Notice> for Forward {
    fn on_update(&self, update: &Update, _items: &[Notice]) {
        let _ = self.0.send(update.clone());
    }
}

async fn spawn_server() -> (SocketAddr, AppState) {
    let state = AppState::new(ServerConfig::default(), None);
    let app = build_app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn config(addr: SocketAddr, transport: TransportChoice) -> WatchConfig {
    let mut config = WatchConfig::new(format!("http://{}", addr), transport);
    config.backstop = None;
    config
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<Update>, kind: EventKind) -> Update {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let update = rx.recv().await.expect("watcher stopped");
            if update.kind == kind {
                return update;
            }
        }
    })
    .await
    .expect("timed out waiting for update")
}

/// First update that shows `count` items. The catch-up fetch queued on
/// connect may get there before the event does.
async fn update_with_count(
    rx: &mut mpsc::UnboundedReceiver<Update>,
    kind: EventKind,
    count: usize,
) -> Update {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let update = rx.recv().await.expect("watcher stopped");
            if update.count == count {
                assert!(
                    update.kind == kind || update.kind == EventKind::Connected,
                    "unexpected update kind {}",
                    update.kind
                );
                return update;
            }
        }
    })
    .await
    .expect("timed out waiting for update")
}

async fn wait_connected(handle: &deskwire_client::WatchHandle) {
    let mut rx = handle.connection_changes();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|state| *state == ConnectionState::Connected),
    )
    .await
    .expect("push never connected")
    .unwrap();
}

fn new_ticket(title: &str) -> NewTicket {
    NewTicket {
        title: title.to_string(),
        description: String::new(),
        requester: "bea".to_string(),
        priority: Default::default(),
        assignee: None,
    }
}

#[tokio::test]
async fn test_push_watcher_refetches_on_ticket_event() {
    let (addr, state) = spawn_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle =
        spawn_http_watcher::<Tickets>(config(addr, TransportChoice::Push), Arc::new(Forward(tx)))
            .unwrap();

    let initial = next_update(&mut rx, EventKind::PollingUpdate).await;
    assert_eq!(initial.count, 0);
    wait_connected(&handle).await;
    assert_eq!(handle.mode(), TransportMode::Push);

    state.board.create_ticket(new_ticket("Impressora sem toner")).unwrap();

    update_with_count(&mut rx, EventKind::TicketCreated, 1).await;
}

#[tokio::test]
async fn test_stream_watcher_refetches_on_notice_event() {
    let (addr, state) = spawn_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle =
        spawn_http_watcher::<Notices>(config(addr, TransportChoice::Stream), Arc::new(Forward(tx)))
            .unwrap();

    next_update(&mut rx, EventKind::PollingUpdate).await;
    wait_connected(&handle).await;

    // Ticket events are for another topic and must not trigger a refresh
    state.board.create_ticket(new_ticket("Wi-Fi lento")).unwrap();
    state
        .board
        .create_notice(NewNotice {
            title: "Manutenção programada".to_string(),
            body: String::new(),
            severity: Default::default(),
            active: true,
        })
        .unwrap();

    update_with_count(&mut rx, EventKind::NoticeCreated, 1).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unreachable_push_falls_back_to_polling() {
    let (addr, state) = spawn_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    // HTTP reads work, but the push endpoint points at a closed port
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = config(closed, TransportChoice::Push);
    config.grace = Duration::from_millis(300);
    config.interval = Duration::from_millis(200);
    config.reconnect = ReconnectPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(50),
        connect_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    let source = deskwire_client::HttpSource::<Tickets>::new(
        &format!("http://{}", addr),
        Duration::from_secs(2),
    )
    .unwrap();
    let handle =
        deskwire_client::spawn_watcher::<Tickets>(config, Arc::new(source), Arc::new(Forward(tx)))
            .unwrap();

    let mut modes = handle.mode_changes();
    tokio::time::timeout(
        Duration::from_secs(5),
        modes.wait_for(|mode| *mode == TransportMode::Polling),
    )
    .await
    .expect("never fell back to polling")
    .unwrap();

    next_update(&mut rx, EventKind::PollingUpdate).await;
    state.board.create_ticket(new_ticket("Senha expirada")).unwrap();
    let update = next_update(&mut rx, EventKind::PollingUpdate).await;
    assert_eq!(update.count, 1);

    let mut connection = handle.connection_changes();
    tokio::time::timeout(
        Duration::from_secs(5),
        connection.wait_for(|state| *state == ConnectionState::Failed),
    )
    .await
    .expect("reconnects never gave up")
    .unwrap();
}

#[tokio::test]
async fn test_force_refresh_always_updates() {
    let (addr, _state) = spawn_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut config = config(addr, TransportChoice::Polling);
    config.interval = Duration::from_secs(30);
    let handle = spawn_http_watcher::<Tickets>(config, Arc::new(Forward(tx))).unwrap();

    next_update(&mut rx, EventKind::PollingUpdate).await;
    assert_eq!(handle.mode(), TransportMode::Polling);
    assert_eq!(handle.connection(), ConnectionState::Disabled);

    // Unchanged collection: focus is silent, a forced refresh is not
    assert!(handle.focus());
    assert!(handle.force_refresh());
    let update = next_update(&mut rx, EventKind::ForceUpdate).await;
    assert_eq!(update.count, 0);
}
