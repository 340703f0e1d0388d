//! HTTP/SSE surface, versioned under `/api/v1`.

pub mod chat;
pub mod events;
pub mod integrations;
pub mod sessions;
pub mod tasks;
pub mod tools;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use envoy_domain::Error;

use crate::state::AppState;

/// Map a typed error onto its HTTP response: `NotFound` → 404,
/// `Invalid` → 400, everything else → 500, all with an
/// `{ "error": "<message>" }` body.
pub(crate) fn error_response(error: Error) -> Response {
    let status = match &error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Invalid(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}

pub fn router() -> Router<AppState> {
    Router::new()
        // Chat + live events
        .route("/api/v1/chat", post(chat::chat))
        .route("/api/v1/events", get(events::events))
        // Sessions
        .route("/api/v1/sessions", get(sessions::list_sessions).post(sessions::create_session))
        .route("/api/v1/sessions/:id", delete(sessions::delete_session))
        .route("/api/v1/sessions/:id/messages", get(sessions::session_messages))
        // Tools
        .route("/api/v1/tools", get(tools::list_tools))
        .route("/api/v1/tools/:name", delete(tools::delete_tool))
        // Integrations
        .route("/api/v1/integrations", get(integrations::list_integrations))
        .route("/api/v1/integrations/:name", delete(integrations::delete_integration))
        .route("/api/v1/integrations/:name/config", post(integrations::save_config))
        // Scheduled tasks
        .route("/api/v1/tasks", get(tasks::list_tasks))
        .route("/api/v1/tasks/:name", delete(tasks::delete_task))
        .route("/api/v1/tasks/:name/runs", get(tasks::task_runs))
}
