use super::state::AppState;
use crate::session::CallSummary;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub active_calls: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallsResponse {
    pub active: usize,
    pub calls: Vec<CallSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let active_calls = state.calls.active_count().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            started_at: state.started_at,
            active_calls,
        }),
    )
}

/// GET /calls
/// Active calls and the most recently finished ones, oldest first
pub async fn list_calls(State(state): State<AppState>) -> impl IntoResponse {
    let calls = state.calls.list().await;
    let active = calls.iter().filter(|c| c.active).count();
    (StatusCode::OK, Json(CallsResponse { active, calls }))
}

/// GET /calls/:call_id
/// State, retry count and outcome of one call
pub async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> impl IntoResponse {
    match state.calls.get(&call_id).await {
        Some(summary) => (StatusCode::OK, Json(summary)).into_response(),
        None => {
            debug!("Call {} not found", call_id);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Call {} not found", call_id),
                }),
            )
                .into_response()
        }
    }
}
