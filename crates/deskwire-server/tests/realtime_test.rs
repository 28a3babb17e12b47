//! End-to-end tests for the helpdesk API and its realtime transports

use axum::body::Body;
use axum::http::{Request, StatusCode};
use deskwire_core::{Event, EventKind, PushChannel, PushFrame};
use deskwire_server::{build_app, AppState, ServerConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};
use tower::ServiceExt;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Counts ERROR level events
#[derive(Clone, Default)]
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
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

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn next_frame(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> PushFrame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_create_ticket_without_subscribers() {
    let state = AppState::new(ServerConfig::default(), None);
    let app = build_app(state.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tickets",
            json!({ "title": "Sem acesso ao e-mail", "requester": "carla" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let ticket = read_json(response).await;
    assert_eq!(ticket["status"], "ABERTO");

    let status = app
        .oneshot(Request::get("/api/realtime/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = read_json(status).await;
    assert_eq!(status["initialized"], true);
    assert_eq!(status["subscribers"], 0);
    assert_eq!(status["metrics"]["delivered"], 0);
}

#[tokio::test]
async fn test_validation_and_not_found_errors() {
    let state = AppState::new(ServerConfig::default(), None);
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tickets",
            json!({ "title": " ", "requester": "carla" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tickets/404/move",
            json!({ "status": "FECHADO" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::delete("/api/notices/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_push_channel_ack_and_ticket_update() {
    let (addr, state) = spawn_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();

    let ack = next_frame(&mut ws).await;
    assert_eq!(ack.event, PushChannel::Connected);
    assert!(matches!(ack.data, Event::Connected { id: Some(_), .. }));

    ws.send(Message::Text(
        json!({ "type": "join-room", "room": "tickets" }).to_string(),
    ))
    .await
    .unwrap();

    let client = reqwest::Client::new();
    let created: Value = client
        .post(format!("http://{}/api/tickets", addr))
        .json(&json!({ "title": "Monitor piscando", "requester": "davi" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame.event, PushChannel::TicketUpdate);
    assert_eq!(frame.data.kind(), EventKind::TicketCreated);
    match frame.data {
        Event::TicketCreated { ticket } => assert_eq!(Value::from(ticket.id), created["id"]),
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(state.hub.subscriber_count(), 1);
    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_push_channel_rejects_disallowed_origin() {
    let (addr, state) = spawn_server().await;

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://evil.example".parse().unwrap());

    assert!(tokio_tungstenite::connect_async(request).await.is_err());
    assert_eq!(state.hub.subscriber_count(), 0);

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "http://localhost:3000".parse().unwrap());
    assert!(tokio_tungstenite::connect_async(request).await.is_ok());
}

#[tokio::test]
async fn test_event_stream_headers_greeting_and_events() {
    let (addr, _state) = spawn_server().await;
    let client = reqwest::Client::new();

    let mut response = client
        .get(format!("http://{}/api/events/stream", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let headers = response.headers();
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(headers["cache-control"], "no-cache");

    let mut received = String::new();
    while !received.contains("\n\n") {
        let chunk = response.chunk().await.unwrap().expect("stream ended");
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(received.starts_with("data: "));
    assert!(received.contains(r#""type":"connected""#));

    client
        .post(format!("http://{}/api/notices", addr))
        .json(&json!({ "title": "Rede instável no 3º andar" }))
        .send()
        .await
        .unwrap();

    while !received.contains("notice_created") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .expect("stream ended");
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
}

#[tokio::test]
async fn test_event_stream_abort_unregisters_subscriber() {
    let errors = ErrorCounter::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(errors.clone()));

    let (addr, state) = spawn_server().await;
    let client = reqwest::Client::new();

    let mut response = client
        .get(format!("http://{}/api/events/stream", addr))
        .send()
        .await
        .unwrap();
    response.chunk().await.unwrap();
    assert_eq!(state.hub.subscriber_count(), 1);

    drop(response);
    drop(client);

    // Broadcasting also flushes a subscriber whose socket is already gone
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.hub.subscriber_count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "subscriber never removed");
        let report = state.hub.broadcast(Event::NoticeDeleted { id: 0 });
        // The stream unregisters itself; nothing is left for pruning
        assert_eq!(report.pruned, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let report = state.hub.broadcast(Event::NoticeDeleted { id: 0 });
    assert!(!report.had_subscribers());
    assert_eq!(state.hub.metrics().pruned, 0);
    assert_eq!(errors.0.load(Ordering::SeqCst), 0);
}
