//! Row types for the persistent store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat session. `conversation_state` lives on the same row but is
/// loaded separately (it can be large).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One human-readable transcript line (UI history only — the structured
/// conversation state is what the model replays).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A user-authored tool. `integration_id` is `None` for standalone tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomToolRow {
    pub id: String,
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool input, stored as text.
    pub input_schema: String,
    /// Script body executed by the sandbox.
    pub code: String,
    pub enabled: bool,
    pub integration_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A declared credential key of an integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigKey {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
}

/// A named group of tools behind a credential schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub config_schema: Vec<ConfigKey>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cron-bound directive that re-enters the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTaskRow {
    pub id: String,
    pub name: String,
    /// Used verbatim as the user prompt when the task fires.
    pub description: String,
    pub cron: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// One execution of a scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunRow {
    pub id: String,
    pub task_id: String,
    pub status: RunStatus,
    /// Final assistant text (or the error message on failure).
    pub result: Option<String>,
    /// Serialized structured trace of the run.
    pub output: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
