//! Scheduled task endpoints.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use envoy_domain::Error;
use envoy_store::model::TaskRunRow;

use crate::api::error_response;
use crate::state::AppState;

fn run_view(run: &TaskRunRow) -> serde_json::Value {
    // Stored trace JSON is parsed back out for the UI.
    let output = run
        .output
        .as_deref()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok());

    serde_json::json!({
        "id": run.id,
        "task_id": run.task_id,
        "status": run.status,
        "result": run.result,
        "output": output,
        "started_at": run.started_at,
        "finished_at": run.finished_at,
    })
}

/// `GET /api/v1/tasks` — tasks with their latest run.
pub async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    let tasks = match state.store.list_tasks().await {
        Ok(tasks) => tasks,
        Err(e) => return error_response(e),
    };

    let mut views = Vec::with_capacity(tasks.len());
    for task in &tasks {
        let last_run = state
            .store
            .latest_run(&task.id)
            .await
            .ok()
            .flatten()
            .map(|run| run_view(&run));
        views.push(serde_json::json!({
            "id": task.id,
            "name": task.name,
            "description": task.description,
            "cron": task.cron,
            "enabled": task.enabled,
            "created_at": task.created_at,
            "updated_at": task.updated_at,
            "lastRun": last_run,
        }));
    }
    Json(views).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// `GET /api/v1/tasks/:name/runs?limit=`
pub async fn task_runs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<RunsQuery>,
) -> impl IntoResponse {
    let task = match state.store.get_task_by_name(&name).await {
        Ok(Some(task)) => task,
        Ok(None) => return error_response(Error::NotFound("task".into())),
        Err(e) => return error_response(e),
    };

    match state.store.list_runs(&task.id, query.limit).await {
        Ok(runs) => {
            let views: Vec<_> = runs.iter().map(run_view).collect();
            Json(views).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `DELETE /api/v1/tasks/:name` — removes the row, its runs, and the
/// live cron job.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_task_by_name(&name).await {
        Ok(Some(task)) => {
            state.scheduler.unschedule_task(&task.id).await;
            Json(serde_json::json!({ "deleted": name })).into_response()
        }
        Ok(None) => error_response(Error::NotFound("task".into())),
        Err(e) => error_response(e),
    }
}
