//! HTTP request handlers

use super::types::{AckResponse, ErrorResponse};
use super::AppState;
use crate::session::SessionStore;
use crate::transport::telegram::update::Update;
use crate::transport::ChatTransport;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router<S, T>(state: AppState<S, T>) -> Router
where
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    Router::new()
        // Updates from the chat service
        .route("/webhook/:token", post(receive_update::<S, T>))
        // Platform probes
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Accept one update. Once it parses, the answer is always 200 so the chat
/// service does not redeliver; per-user failures surface in the chat instead.
async fn receive_update<S, T>(
    State(state): State<AppState<S, T>>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<AckResponse>, AppError>
where
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    if token != *state.webhook_token {
        return Err(AppError::NotFound("Unknown webhook".to_string()));
    }

    let update: Update = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed update: {e}")))?;
    let update_id = update.update_id;

    match update.normalize() {
        Some(inbound) => {
            let user_id = inbound.user_id;
            if let Err(e) = state.runtime.dispatch(inbound).await {
                tracing::warn!(update_id, user_id, error = %e, "Failed to dispatch update");
            }
        }
        None => tracing::debug!(update_id, "Ignoring unsupported update"),
    }

    Ok(Json(AckResponse { ok: true }))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };
        tracing::debug!(status = %status, error = %message, "Request rejected");

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
