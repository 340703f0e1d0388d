//! Integration endpoints: listing with config status, credential saves,
//! deletion.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use envoy_domain::Error;
use envoy_store::model::IntegrationRow;

use crate::api::error_response;
use crate::runtime::integrations;
use crate::state::AppState;

async fn integration_view(state: &AppState, integration: &IntegrationRow) -> serde_json::Value {
    let tools = state
        .store
        .list_tools_for_integration(&integration.id)
        .await
        .unwrap_or_default();

    serde_json::json!({
        "id": integration.id,
        "name": integration.name,
        "description": integration.description,
        "enabled": integration.enabled,
        "config_schema": integration.config_schema,
        "tools": tools,
        "configured": integrations::is_configured(integration),
        "masked_values": integrations::masked_values(integration),
        "created_at": integration.created_at,
        "updated_at": integration.updated_at,
    })
}

/// `GET /api/v1/integrations`
pub async fn list_integrations(State(state): State<AppState>) -> impl IntoResponse {
    let rows = match state.store.list_integrations().await {
        Ok(rows) => rows,
        Err(e) => return error_response(e),
    };

    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        views.push(integration_view(&state, row).await);
    }
    Json(views).into_response()
}

/// `POST /api/v1/integrations/:name/config` — body is `{KEY: value, …}`.
/// Persists declared keys and returns the fresh config status.
pub async fn save_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(values): Json<HashMap<String, String>>,
) -> impl IntoResponse {
    let integration = match state.store.get_integration_by_name(&name).await {
        Ok(Some(i)) => i,
        Ok(None) => return error_response(Error::NotFound("integration".into())),
        Err(e) => return error_response(e),
    };

    if let Err(e) = integrations::save_config(&state, &integration, &values).await {
        return error_response(e);
    }

    Json(serde_json::json!({
        "configured": integrations::is_configured(&integration),
        "masked_values": integrations::masked_values(&integration),
    }))
    .into_response()
}

/// `DELETE /api/v1/integrations/:name` — cascades the integration's tools.
pub async fn delete_integration(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_integration_by_name(&name).await {
        Ok(true) => Json(serde_json::json!({ "deleted": name })).into_response(),
        Ok(false) => error_response(Error::NotFound("integration".into())),
        Err(e) => error_response(e),
    }
}
