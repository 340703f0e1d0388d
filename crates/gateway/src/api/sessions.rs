//! Session management endpoints.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use envoy_domain::Error;

use crate::api::error_response;
use crate::state::AppState;

/// `GET /api/v1/sessions`
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_sessions().await {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /api/v1/sessions`
pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.create_session(None).await {
        Ok(session) => Json(serde_json::json!(session)).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /api/v1/sessions/:id/messages` — the transcript for UI history.
pub async fn session_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_session(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(Error::NotFound("session".into())),
        Err(e) => return error_response(e),
    }

    match state.store.list_messages(&id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => error_response(e),
    }
}

/// `DELETE /api/v1/sessions/:id` — cascades the transcript.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_session(&id).await {
        Ok(true) => Json(serde_json::json!({ "deleted": id })).into_response(),
        Ok(false) => error_response(Error::NotFound("session".into())),
        Err(e) => error_response(e),
    }
}
