use crate::board::{NewNotice, NewTicket, NoticePatch, TicketPatch};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use deskwire_core::{Notice, Ticket, TicketStatus};
use serde::Deserialize;

// ============================================================================
// Health endpoints
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics exporter not installed".to_string(),
        ),
    }
}

pub async fn fallback() -> impl IntoResponse {
    AppError::NotFound("route not found".to_string())
}

// ============================================================================
// Ticket endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<TicketStatus>,
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<ListTicketsQuery>,
) -> Json<Vec<Ticket>> {
    Json(state.board.list_tickets(query.status))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.board.get_ticket(id)?))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Json(req): Json<NewTicket>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let ticket = state.board.create_ticket(req)?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<TicketPatch>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.board.update_ticket(id, patch)?))
}

#[derive(Debug, Deserialize)]
pub struct MoveTicketRequest {
    pub status: TicketStatus,
}

pub async fn move_ticket(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<MoveTicketRequest>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.board.move_ticket(id, req.status)?))
}

// ============================================================================
// Notice endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNoticesQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_notices(
    State(state): State<AppState>,
    Query(query): Query<ListNoticesQuery>,
) -> Json<Vec<Notice>> {
    Json(state.board.list_notices(query.active_only))
}

pub async fn create_notice(
    State(state): State<AppState>,
    Json(req): Json<NewNotice>,
) -> Result<(StatusCode, Json<Notice>), AppError> {
    let notice = state.board.create_notice(req)?;
    Ok((StatusCode::CREATED, Json(notice)))
}

pub async fn update_notice(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<NoticePatch>,
) -> Result<Json<Notice>, AppError> {
    Ok(Json(state.board.update_notice(id, patch)?))
}

pub async fn delete_notice(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.board.delete_notice(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Realtime status
// ============================================================================

pub async fn realtime_status(State(state): State<AppState>) -> impl IntoResponse {
    let transport = state.hub.transport();
    Json(serde_json::json!({
        "initialized": transport.is_some(),
        "instance": transport.as_ref().map(|t| t.instance_id().to_string()),
        "startedAt": transport.as_ref().map(|t| t.started_at()),
        "subscribers": state.hub.subscriber_count(),
        "metrics": state.hub.metrics(),
    }))
}
