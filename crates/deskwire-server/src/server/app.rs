use crate::server::{routes, stream, websocket};
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use deskwire_hub::AllowedOrigins;
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the Axum application
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.hub.transport().map(|t| t.settings().allowed_origins.clone()));

    // API routes
    let api_routes = Router::new()
        // Tickets
        .route(
            "/tickets",
            get(routes::list_tickets).post(routes::create_ticket),
        )
        .route(
            "/tickets/:id",
            get(routes::get_ticket).patch(routes::update_ticket),
        )
        .route("/tickets/:id/move", post(routes::move_ticket))
        // Notices
        .route(
            "/notices",
            get(routes::list_notices).post(routes::create_notice),
        )
        .route(
            "/notices/:id",
            patch(routes::update_notice).delete(routes::delete_notice),
        )
        // Realtime
        .route("/realtime/status", get(routes::realtime_status));

    // The event stream stays reachable from any origin
    let stream_routes = Router::new()
        .route("/api/events/stream", get(stream::event_stream))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .nest("/api", api_routes)
        .route("/ws", get(websocket::websocket_handler))
        .layer(cors)
        .merge(stream_routes)
        .fallback(routes::fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &Option<AllowedOrigins>) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PATCH, Method::DELETE];
    match origins {
        Some(AllowedOrigins::List(list)) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(values))
                .allow_methods(methods)
                .allow_headers(Any)
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any),
    }
}

/// Run the server until `shutdown` resolves
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Deskwire listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
