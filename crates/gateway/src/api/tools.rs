//! Tool catalog endpoints.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use envoy_domain::Error;

use crate::api::error_response;
use crate::runtime::meta_tools;
use crate::state::AppState;

/// `GET /api/v1/tools` — built-in definitions plus custom rows.
pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    let built_in = crate::runtime::tools::static_tool_definitions(&state);

    match state.store.list_custom_tools().await {
        Ok(custom) => Json(serde_json::json!({
            "builtIn": built_in,
            "custom": custom,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// `DELETE /api/v1/tools/:name`
pub async fn delete_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if is_builtin_name(&name) {
        return error_response(Error::Invalid("built-in tools cannot be deleted".into()));
    }

    match state.store.delete_tool_by_name(&name).await {
        Ok(true) => Json(serde_json::json!({ "deleted": name })).into_response(),
        Ok(false) => error_response(Error::NotFound("tool".into())),
        Err(e) => error_response(e),
    }
}

fn is_builtin_name(name: &str) -> bool {
    matches!(name, "read_file" | "write_file" | "list_dir" | "run_command")
        || meta_tools::definitions().iter().any(|d| d.name == name)
}
