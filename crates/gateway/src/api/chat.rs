//! `POST /api/v1/chat` — run one agent turn.
//!
//! The response carries the final assistant message; incremental output
//! streams to whoever is subscribed on `GET /api/v1/events`.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use envoy_domain::Error;

use crate::api::error_response;
use crate::runtime::execute_chat_turn;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    let message = match body.message.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => return error_response(Error::Invalid("message is required".into())),
    };

    // Create-or-lookup the session.
    let session_id = match body.session_id {
        Some(id) => match state.store.get_session(&id).await {
            Ok(Some(session)) => session.id,
            Ok(None) => match state.store.create_session(Some(id)).await {
                Ok(session) => session.id,
                Err(e) => return error_response(e),
            },
            Err(e) => return error_response(e),
        },
        None => match state.store.create_session(None).await {
            Ok(session) => {
                tracing::info!(session_id = %session.id, "new session created");
                session.id
            }
            Err(e) => return error_response(e),
        },
    };

    match execute_chat_turn(&state, &session_id, &message).await {
        Ok(outcome) => Json(serde_json::json!({
            "sessionId": session_id,
            "message": outcome.content,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "turn failed");
            error_response(e)
        }
    }
}
