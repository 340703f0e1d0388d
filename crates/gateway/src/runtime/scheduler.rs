//! Cron scheduler — re-enters the agent loop on a schedule under an
//! isolated synthetic session, with a concurrency guard and structured
//! trace capture.
//!
//! A process-singleton registry maps `task_id -> live cron job`. On boot
//! every enabled task is installed; every meta-tool mutation reconciles
//! the registry (install on enable, remove on disable/delete, reinstall
//! on cron change).

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use envoy_domain::tool::{ContentPart, Message, MessageContent, Role};
use envoy_store::model::{RunStatus, ScheduledTaskRow};

use crate::runtime::run_turn;
use crate::state::AppState;

pub struct Scheduler {
    sched: Mutex<JobScheduler>,
    jobs: Mutex<HashMap<String, Uuid>>,
}

impl Scheduler {
    pub async fn new() -> Result<Self, String> {
        let sched = JobScheduler::new().await.map_err(|e| e.to_string())?;
        sched.start().await.map_err(|e| e.to_string())?;
        Ok(Self { sched: Mutex::new(sched), jobs: Mutex::new(HashMap::new()) })
    }

    /// The scheduler library wants a seconds field; standard 5-field
    /// expressions get a literal `0` second prepended.
    pub fn normalize_cron(expr: &str) -> String {
        let expr = expr.trim();
        if expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        }
    }

    /// A cron expression is valid iff the scheduler library accepts it.
    /// Meta-tools must call this *before* persisting a cron change.
    pub fn validate_cron(expr: &str) -> Result<(), String> {
        let normalized = Self::normalize_cron(expr);
        Job::new_async(normalized.as_str(), |_uuid, _lock| Box::pin(async {}))
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Install jobs for every enabled task. Called once on process start.
    pub async fn schedule_all(&self, state: AppState) {
        let tasks = match state.store.list_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "failed to load tasks for scheduling");
                return;
            }
        };
        for task in tasks.iter().filter(|t| t.enabled) {
            if let Err(e) = self.schedule_task(state.clone(), task).await {
                tracing::warn!(task = %task.name, error = %e, "failed to schedule task");
            }
        }
    }

    /// Install (or reinstall) the live job for a task. Any pre-existing
    /// job for the same id is stopped first.
    ///
    /// Returns a boxed future rather than using `async fn` sugar: the job
    /// closure below boxes its own future (required by the scheduler
    /// library), and that future transitively calls back into this method
    /// through the agent loop's meta-tools. An opaque `impl Future` return
    /// type here would make rustc try to structurally resolve that cycle
    /// when checking `Send` and fail; an explicit boxed trait object
    /// breaks the cycle the same way it does for recursive data types.
    pub fn schedule_task<'a>(
        &'a self,
        state: AppState,
        task: &'a ScheduledTaskRow,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), String>> + Send + 'a>> {
        Box::pin(async move {
            self.unschedule_task(&task.id).await;

            let normalized = Self::normalize_cron(&task.cron);
            let task_id = task.id.clone();
            let job = Job::new_async(normalized.as_str(), move |_uuid, _lock| {
                let state = state.clone();
                let task_id = task_id.clone();
                Box::pin(async move {
                    fire_task(state, task_id).await;
                })
            })
            .map_err(|e| e.to_string())?;

            let job_id = self
                .sched
                .lock()
                .await
                .add(job)
                .await
                .map_err(|e| e.to_string())?;
            self.jobs.lock().await.insert(task.id.clone(), job_id);

            tracing::info!(task = %task.name, cron = %task.cron, "task scheduled");
            Ok(())
        })
    }

    /// Stop the live job for a task, if one exists.
    pub async fn unschedule_task(&self, task_id: &str) {
        let removed = self.jobs.lock().await.remove(task_id);
        if let Some(job_id) = removed {
            if let Err(e) = self.sched.lock().await.remove(&job_id).await {
                tracing::warn!(task_id, error = %e, "failed to remove cron job");
            }
        }
    }

    /// Whether a live job is installed for the task (invariant checks).
    pub async fn has_job(&self, task_id: &str) -> bool {
        self.jobs.lock().await.contains_key(task_id)
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.sched.lock().await.shutdown().await {
            tracing::warn!(error = %e, "scheduler shutdown failed");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fire
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle one fire of a task's cron job.
///
/// Looks the task up fresh (it may have been edited or deleted since the
/// job was installed), enforces the single-running-run guard, runs the
/// agent loop under a synthetic session, and records the run with its
/// structured trace.
pub async fn fire_task(state: AppState, task_id: String) {
    let task = match state.store.get_task(&task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            tracing::warn!(task_id, "fired for a task that no longer exists");
            return;
        }
        Err(e) => {
            tracing::error!(task_id, error = %e, "task lookup failed on fire");
            return;
        }
    };
    if !task.enabled {
        return;
    }

    match state.store.has_running_run(&task.id).await {
        Ok(true) => {
            tracing::warn!(task = %task.name, "previous run still in flight, skipping this fire");
            return;
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!(task = %task.name, error = %e, "running-run check failed");
            return;
        }
    }

    let run = match state.store.insert_run(&task.id).await {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(task = %task.name, error = %e, "failed to record run start");
            return;
        }
    };

    let session_id = format!("task-run-{}", run.id);
    let user_message = format!("[Scheduled Task: {}]\n\n{}", task.name, task.description);

    tracing::info!(task = %task.name, run_id = %run.id, session_id, "scheduled task fired");

    let outcome = run_turn(&state, &session_id, &user_message, Vec::new()).await;

    // A turn that produced no assistant output at all means the model
    // call itself failed; record that as an errored run.
    let produced_output = outcome.messages.iter().any(|m| m.role == Role::Assistant);
    let (status, result) = if produced_output {
        (RunStatus::Success, outcome.content.clone())
    } else {
        (RunStatus::Error, "model produced no output".to_string())
    };

    let trace = extract_trace(&outcome.messages);
    let trace_json = serde_json::to_string(&trace).unwrap_or_else(|_| "[]".into());

    if let Err(e) = state
        .store
        .complete_run(&run.id, status, Some(&result), Some(&trace_json))
        .await
    {
        tracing::error!(run_id = %run.id, error = %e, "failed to record run completion");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trace extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Distill a run's message list into the structured trace stored on the
/// run record: assistant entries with text and tool calls, tool entries
/// with results. The initial user message is skipped; malformed parts
/// are skipped, never raised.
pub fn extract_trace(messages: &[Message]) -> Value {
    let rest = match messages.first() {
        Some(m) if m.role == Role::User => &messages[1..],
        _ => messages,
    };

    let mut entries: Vec<Value> = Vec::new();
    for message in rest {
        match message.role {
            Role::Assistant => {
                let mut content = String::new();
                let mut tool_calls: Vec<Value> = Vec::new();
                match &message.content {
                    MessageContent::Text(t) => content.push_str(t),
                    MessageContent::Parts(parts) => {
                        for part in parts {
                            match part {
                                ContentPart::Text { text } => content.push_str(text),
                                ContentPart::ToolUse { name, input, .. } => {
                                    tool_calls.push(serde_json::json!({
                                        "toolName": name,
                                        "args": input,
                                    }));
                                }
                                ContentPart::ToolResult { .. } => {}
                            }
                        }
                    }
                }

                if content.is_empty() && tool_calls.is_empty() {
                    continue;
                }
                let mut entry = serde_json::Map::new();
                entry.insert("role".into(), "assistant".into());
                if !content.is_empty() {
                    entry.insert("content".into(), content.into());
                }
                if !tool_calls.is_empty() {
                    entry.insert("toolCalls".into(), Value::Array(tool_calls));
                }
                entries.push(Value::Object(entry));
            }
            Role::Tool => {
                let MessageContent::Parts(parts) = &message.content else {
                    continue;
                };
                let results: Vec<Value> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::ToolResult { name, content, .. } => Some(serde_json::json!({
                            "toolName": name,
                            "result": content,
                        })),
                        _ => None,
                    })
                    .collect();
                if !results.is_empty() {
                    entries.push(serde_json::json!({ "role": "tool", "results": results }));
                }
            }
            Role::User | Role::System => {}
        }
    }

    Value::Array(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_cron_prepends_seconds_to_5_field() {
        assert_eq!(Scheduler::normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(Scheduler::normalize_cron("0 9 * * 1-5"), "0 0 9 * * 1-5");
        // Seconds-style expressions pass through untouched.
        assert_eq!(Scheduler::normalize_cron("*/1 * * * * *"), "*/1 * * * * *");
    }

    #[test]
    fn validate_cron_accepts_both_forms() {
        assert!(Scheduler::validate_cron("*/5 * * * *").is_ok());
        assert!(Scheduler::validate_cron("0 9 * * *").is_ok());
        assert!(Scheduler::validate_cron("*/1 * * * * *").is_ok());
    }

    #[test]
    fn validate_cron_rejects_garbage() {
        assert!(Scheduler::validate_cron("every tuesday").is_err());
        assert!(Scheduler::validate_cron("99 99 * * *").is_err());
        assert!(Scheduler::validate_cron("").is_err());
    }

    #[test]
    fn trace_skips_user_and_collects_calls_and_results() {
        let messages = vec![
            Message::user("[Scheduled Task: t]\n\ndo the thing"),
            Message {
                role: Role::Assistant,
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: "working on it".into() },
                    ContentPart::ToolUse {
                        id: "c1".into(),
                        name: "read_file".into(),
                        input: serde_json::json!({"path": "x"}),
                    },
                ]),
            },
            Message::tool_result("c1", "read_file", "contents"),
            Message::assistant("done"),
        ];

        let trace = extract_trace(&messages);
        let entries = trace.as_array().unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0]["role"], "assistant");
        assert_eq!(entries[0]["content"], "working on it");
        assert_eq!(entries[0]["toolCalls"][0]["toolName"], "read_file");

        assert_eq!(entries[1]["role"], "tool");
        assert_eq!(entries[1]["results"][0]["result"], "contents");

        assert_eq!(entries[2]["role"], "assistant");
        assert_eq!(entries[2]["content"], "done");
        assert!(entries[2].get("toolCalls").is_none());
    }

    #[test]
    fn trace_reserializes_to_equivalent_json() {
        let messages = vec![
            Message::user("go"),
            Message::assistant("ok"),
        ];
        let trace = extract_trace(&messages);
        let json = serde_json::to_string(&trace).unwrap();
        let reparsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(trace, reparsed);
    }
}
