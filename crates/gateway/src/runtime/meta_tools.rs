//! Meta-tools — built-in tools exposed to the model that mutate the tool
//! catalog, integrations, and the task schedule. This is the surface that
//! makes the agent self-extending.
//!
//! Every meta-tool returns a human-readable string. Failures are error
//! *strings* fed back into the model's context, never raised — the model
//! is expected to read them and recover ("try again with a valid name").

use serde_json::Value;

use envoy_domain::tool::ToolDefinition;
use envoy_sandbox::Executor;
use envoy_store::model::ConfigKey;

use crate::runtime::scheduler::Scheduler;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn name_property(description: &str) -> Value {
    serde_json::json!({ "type": "string", "description": description })
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "create_tool".into(),
            description: "Create a new custom tool. The code is a rhai script body with `input`, `env`, `http_get`/`http_post` in scope; its last expression is the result. The tool becomes callable as custom_<name> on the next turn.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": name_property("Tool name: lowercase letters, digits, underscores; must start with a letter"),
                    "description": name_property("What the tool does"),
                    "input_schema": { "description": "JSON Schema object for the tool input" },
                    "code": name_property("rhai script body")
                },
                "required": ["name", "description", "input_schema", "code"]
            }),
        },
        ToolDefinition {
            name: "update_tool".into(),
            description: "Update an existing custom tool. Only the provided fields change; updates take effect on the next turn.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": name_property("Name of the tool to update"),
                    "description": name_property("New description"),
                    "input_schema": { "description": "New JSON Schema object" },
                    "code": name_property("New rhai script body"),
                    "enabled": { "type": "boolean", "description": "Enable or disable the tool" }
                },
                "required": ["name"]
            }),
        },
        ToolDefinition {
            name: "delete_tool".into(),
            description: "Delete a custom tool by name.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "name": name_property("Name of the tool to delete") },
                "required": ["name"]
            }),
        },
        ToolDefinition {
            name: "list_tools".into(),
            description: "List all custom tools and their status.".into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "test_tool".into(),
            description: "Run a stored custom tool with the given input and return its result.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": name_property("Name of the tool to test"),
                    "test_input": { "description": "Input object passed to the tool" }
                },
                "required": ["name"]
            }),
        },
        ToolDefinition {
            name: "create_integration".into(),
            description: "Create a named integration: a group of tools behind a declared credential schema. Declared keys are filled in by the user and appear in `env`.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": name_property("Integration name: lowercase letters, digits, underscores"),
                    "description": name_property("What the integration is for"),
                    "config_schema": {
                        "type": "array",
                        "description": "Declared credential keys",
                        "items": {
                            "type": "object",
                            "properties": {
                                "key": { "type": "string" },
                                "label": { "type": "string" },
                                "required": { "type": "boolean" }
                            },
                            "required": ["key", "label"]
                        }
                    }
                },
                "required": ["name", "description", "config_schema"]
            }),
        },
        ToolDefinition {
            name: "add_integration_tool".into(),
            description: "Add a tool to an integration. It becomes callable as <integration>_<name> on the next turn.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "integration_name": name_property("Owning integration"),
                    "name": name_property("Tool name"),
                    "description": name_property("What the tool does"),
                    "input_schema": { "description": "JSON Schema object for the tool input" },
                    "code": name_property("rhai script body")
                },
                "required": ["integration_name", "name", "description", "input_schema", "code"]
            }),
        },
        ToolDefinition {
            name: "remove_integration_tool".into(),
            description: "Remove a tool from an integration.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "integration_name": name_property("Owning integration"),
                    "name": name_property("Tool name to remove")
                },
                "required": ["integration_name", "name"]
            }),
        },
        ToolDefinition {
            name: "delete_integration".into(),
            description: "Delete an integration and all of its tools.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "name": name_property("Integration name") },
                "required": ["name"]
            }),
        },
        ToolDefinition {
            name: "list_integrations".into(),
            description: "List integrations, their tools, and configuration status.".into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "schedule_task".into(),
            description: "Schedule a recurring task. The description is used verbatim as the prompt each time the task fires.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": name_property("Task name: lowercase letters, digits, underscores"),
                    "description": name_property("Prompt to run on each fire"),
                    "cron": name_property("Cron expression (5-field, or 6-field with seconds)")
                },
                "required": ["name", "description", "cron"]
            }),
        },
        ToolDefinition {
            name: "update_scheduled_task".into(),
            description: "Update a scheduled task. Only the provided fields change; the live schedule is reconciled.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": name_property("Task to update"),
                    "description": name_property("New prompt"),
                    "cron": name_property("New cron expression"),
                    "enabled": { "type": "boolean", "description": "Enable or disable the task" }
                },
                "required": ["name"]
            }),
        },
        ToolDefinition {
            name: "delete_scheduled_task".into(),
            description: "Delete a scheduled task and stop its schedule.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "name": name_property("Task name") },
                "required": ["name"]
            }),
        },
        ToolDefinition {
            name: "list_scheduled_tasks".into(),
            description: "List scheduled tasks with cron and status.".into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        },
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle a meta-tool call. Returns `None` for names that are not
/// meta-tools so the caller can fall through to dynamic dispatch.
pub async fn dispatch(state: &AppState, tool_name: &str, args: &Value) -> Option<(String, bool)> {
    let result = match tool_name {
        "create_tool" => create_tool(state, args).await,
        "update_tool" => update_tool(state, args).await,
        "delete_tool" => delete_tool(state, args).await,
        "list_tools" => list_tools(state).await,
        "test_tool" => test_tool(state, args).await,
        "create_integration" => create_integration(state, args).await,
        "add_integration_tool" => add_integration_tool(state, args).await,
        "remove_integration_tool" => remove_integration_tool(state, args).await,
        "delete_integration" => delete_integration(state, args).await,
        "list_integrations" => list_integrations(state).await,
        "schedule_task" => schedule_task(state, args).await,
        "update_scheduled_task" => update_scheduled_task(state, args).await,
        "delete_scheduled_task" => delete_scheduled_task(state, args).await,
        "list_scheduled_tasks" => list_scheduled_tasks(state).await,
        _ => return None,
    };
    Some(result)
}

// ── Argument helpers ───────────────────────────────────────────────

fn err(message: impl Into<String>) -> (String, bool) {
    (message.into(), true)
}

fn ok(message: impl Into<String>) -> (String, bool) {
    (message.into(), false)
}

fn str_arg(args: &Value, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("Error: missing required argument '{key}'"))
}

fn opt_str_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Tool and integration names: `^[a-z][a-z0-9_]*$`.
pub(crate) fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Canonicalize an `input_schema` argument into its stored string form.
/// Accepts either a JSON object or a string containing one; arrays and
/// other roots are rejected.
fn schema_arg(args: &Value, key: &str) -> Result<String, String> {
    let raw = args
        .get(key)
        .ok_or_else(|| format!("Error: missing required argument '{key}'"))?;

    let parsed: Value = match raw {
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| format!("Error: {key} is not valid JSON: {e}"))?,
        other => other.clone(),
    };

    if !parsed.is_object() {
        return Err(format!(
            "Error: {key} must be a JSON Schema object (got {})",
            json_type_name(&parsed)
        ));
    }

    serde_json::to_string(&parsed).map_err(|e| format!("Error: {key} serialization failed: {e}"))
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Custom tools ───────────────────────────────────────────────────

async fn create_tool(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    if !valid_name(&name) {
        return err(format!(
            "Error: invalid tool name '{name}' — use lowercase letters, digits, and underscores, starting with a letter"
        ));
    }
    match state.store.tool_name_exists(&name).await {
        Ok(true) => return err(format!("Error: a tool named '{name}' already exists")),
        Ok(false) => {}
        Err(e) => return err(format!("Error: {e}")),
    }

    let description = match str_arg(args, "description") {
        Ok(d) => d,
        Err(e) => return err(e),
    };
    let input_schema = match schema_arg(args, "input_schema") {
        Ok(s) => s,
        Err(e) => return err(e),
    };
    let code = match str_arg(args, "code") {
        Ok(c) => c,
        Err(e) => return err(e),
    };
    if let Err(e) = Executor::check(&code) {
        return err(format!("Error: code does not compile: {e}"));
    }

    match state
        .store
        .create_custom_tool(&name, &description, &input_schema, &code, None)
        .await
    {
        Ok(_) => ok(format!(
            "Created tool '{name}'. It is available as 'custom_{name}' starting with the next turn."
        )),
        Err(e) => err(format!("Error: failed to persist tool: {e}")),
    }
}

async fn update_tool(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    let mut tool = match state.store.get_tool_by_name(&name).await {
        Ok(Some(t)) => t,
        Ok(None) => return err(format!("Error: no tool named '{name}'")),
        Err(e) => return err(format!("Error: {e}")),
    };

    if let Some(description) = opt_str_arg(args, "description") {
        tool.description = description;
    }
    if args.get("input_schema").is_some() {
        match schema_arg(args, "input_schema") {
            Ok(s) => tool.input_schema = s,
            Err(e) => return err(e),
        }
    }
    if let Some(code) = opt_str_arg(args, "code") {
        if let Err(e) = Executor::check(&code) {
            return err(format!("Error: code does not compile: {e}"));
        }
        tool.code = code;
    }
    if let Some(enabled) = args.get("enabled").and_then(|v| v.as_bool()) {
        tool.enabled = enabled;
    }

    match state.store.update_custom_tool(&tool).await {
        Ok(()) => ok(format!("Updated tool '{name}'. Changes take effect on the next turn.")),
        Err(e) => err(format!("Error: failed to update tool: {e}")),
    }
}

async fn delete_tool(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    match state.store.delete_tool_by_name(&name).await {
        Ok(true) => ok(format!("Deleted tool '{name}'.")),
        Ok(false) => err(format!("Error: no tool named '{name}'")),
        Err(e) => err(format!("Error: {e}")),
    }
}

async fn list_tools(state: &AppState) -> (String, bool) {
    let tools = match state.store.list_custom_tools().await {
        Ok(t) => t,
        Err(e) => return err(format!("Error: {e}")),
    };
    if tools.is_empty() {
        return ok("No custom tools yet. Use create_tool to add one.");
    }

    let integrations = state.store.list_integrations().await.unwrap_or_default();
    let mut lines = vec![format!("{} custom tool(s):", tools.len())];
    for tool in tools {
        let exposed = match tool.integration_id.as_deref() {
            None => format!("custom_{}", tool.name),
            Some(id) => {
                let owner = integrations
                    .iter()
                    .find(|i| i.id == id)
                    .map(|i| i.name.as_str())
                    .unwrap_or("?");
                format!("{owner}_{}", tool.name)
            }
        };
        lines.push(format!(
            "- {} ({}) — {}",
            exposed,
            if tool.enabled { "enabled" } else { "disabled" },
            tool.description
        ));
    }
    ok(lines.join("\n"))
}

async fn test_tool(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    let tool = match state.store.get_tool_by_name(&name).await {
        Ok(Some(t)) => t,
        Ok(None) => return err(format!("Error: no tool named '{name}'")),
        Err(e) => return err(format!("Error: {e}")),
    };

    let input = args
        .get("test_input")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let result = state.sandbox.execute(&tool.code, input).await;
    ok(format!("Test result for '{name}':\n{result}"))
}

// ── Integrations ───────────────────────────────────────────────────

async fn create_integration(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    if !valid_name(&name) {
        return err(format!(
            "Error: invalid integration name '{name}' — use lowercase letters, digits, and underscores, starting with a letter"
        ));
    }
    match state.store.integration_name_exists(&name).await {
        Ok(true) => return err(format!("Error: an integration named '{name}' already exists")),
        Ok(false) => {}
        Err(e) => return err(format!("Error: {e}")),
    }

    let description = match str_arg(args, "description") {
        Ok(d) => d,
        Err(e) => return err(e),
    };
    let config_schema: Vec<ConfigKey> = match args.get("config_schema") {
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(s) => s,
            Err(e) => {
                return err(format!(
                    "Error: config_schema must be a list of {{key, label, required}} entries: {e}"
                ))
            }
        },
        None => return err("Error: missing required argument 'config_schema'"),
    };

    match state.store.create_integration(&name, &description, &config_schema).await {
        Ok(_) => {
            let keys: Vec<&str> = config_schema.iter().map(|k| k.key.as_str()).collect();
            ok(format!(
                "Created integration '{name}' with config keys [{}]. Ask the user to fill them in on the integrations page.",
                keys.join(", ")
            ))
        }
        Err(e) => err(format!("Error: failed to persist integration: {e}")),
    }
}

async fn add_integration_tool(state: &AppState, args: &Value) -> (String, bool) {
    let integration_name = match str_arg(args, "integration_name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    let integration = match state.store.get_integration_by_name(&integration_name).await {
        Ok(Some(i)) => i,
        Ok(None) => return err(format!("Error: no integration named '{integration_name}'")),
        Err(e) => return err(format!("Error: {e}")),
    };

    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    if !valid_name(&name) {
        return err(format!(
            "Error: invalid tool name '{name}' — use lowercase letters, digits, and underscores, starting with a letter"
        ));
    }
    match state.store.tool_name_exists(&name).await {
        Ok(true) => return err(format!("Error: a tool named '{name}' already exists")),
        Ok(false) => {}
        Err(e) => return err(format!("Error: {e}")),
    }

    let description = match str_arg(args, "description") {
        Ok(d) => d,
        Err(e) => return err(e),
    };
    let input_schema = match schema_arg(args, "input_schema") {
        Ok(s) => s,
        Err(e) => return err(e),
    };
    let code = match str_arg(args, "code") {
        Ok(c) => c,
        Err(e) => return err(e),
    };
    if let Err(e) = Executor::check(&code) {
        return err(format!("Error: code does not compile: {e}"));
    }

    match state
        .store
        .create_custom_tool(&name, &description, &input_schema, &code, Some(&integration.id))
        .await
    {
        Ok(_) => ok(format!(
            "Added tool '{name}' to integration '{integration_name}'. It is available as '{integration_name}_{name}' starting with the next turn."
        )),
        Err(e) => err(format!("Error: failed to persist tool: {e}")),
    }
}

async fn remove_integration_tool(state: &AppState, args: &Value) -> (String, bool) {
    let integration_name = match str_arg(args, "integration_name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };

    let integration = match state.store.get_integration_by_name(&integration_name).await {
        Ok(Some(i)) => i,
        Ok(None) => return err(format!("Error: no integration named '{integration_name}'")),
        Err(e) => return err(format!("Error: {e}")),
    };
    match state.store.get_tool_by_name(&name).await {
        Ok(Some(t)) if t.integration_id.as_deref() == Some(integration.id.as_str()) => {}
        Ok(_) => {
            return err(format!(
                "Error: integration '{integration_name}' has no tool named '{name}'"
            ))
        }
        Err(e) => return err(format!("Error: {e}")),
    }

    match state.store.delete_tool_by_name(&name).await {
        Ok(_) => ok(format!("Removed tool '{name}' from integration '{integration_name}'.")),
        Err(e) => err(format!("Error: {e}")),
    }
}

async fn delete_integration(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    match state.store.delete_integration_by_name(&name).await {
        Ok(true) => ok(format!("Deleted integration '{name}' and its tools.")),
        Ok(false) => err(format!("Error: no integration named '{name}'")),
        Err(e) => err(format!("Error: {e}")),
    }
}

async fn list_integrations(state: &AppState) -> (String, bool) {
    let integrations = match state.store.list_integrations().await {
        Ok(i) => i,
        Err(e) => return err(format!("Error: {e}")),
    };
    if integrations.is_empty() {
        return ok("No integrations yet. Use create_integration to add one.");
    }

    let mut lines = vec![format!("{} integration(s):", integrations.len())];
    for integration in integrations {
        let status = if crate::runtime::integrations::is_configured(&integration) {
            "configured"
        } else {
            "needs setup"
        };
        let tools = state
            .store
            .list_tools_for_integration(&integration.id)
            .await
            .unwrap_or_default();
        let tool_names: Vec<String> = tools
            .iter()
            .map(|t| format!("{}_{}", integration.name, t.name))
            .collect();
        lines.push(format!(
            "- {} ({status}, {} tool(s): {}) — {}",
            integration.name,
            tools.len(),
            if tool_names.is_empty() { "none".to_string() } else { tool_names.join(", ") },
            integration.description
        ));
    }
    ok(lines.join("\n"))
}

// ── Scheduled tasks ────────────────────────────────────────────────

async fn schedule_task(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    if !valid_name(&name) {
        return err(format!(
            "Error: invalid task name '{name}' — use lowercase letters, digits, and underscores, starting with a letter"
        ));
    }
    match state.store.get_task_by_name(&name).await {
        Ok(Some(_)) => return err(format!("Error: a task named '{name}' already exists")),
        Ok(None) => {}
        Err(e) => return err(format!("Error: {e}")),
    }

    let description = match str_arg(args, "description") {
        Ok(d) => d,
        Err(e) => return err(e),
    };
    let cron = match str_arg(args, "cron") {
        Ok(c) => c,
        Err(e) => return err(e),
    };
    // Validate before persisting anything.
    if let Err(e) = Scheduler::validate_cron(&cron) {
        return err(format!("Error: invalid cron expression '{cron}': {e}"));
    }

    let task = match state.store.create_task(&name, &description, &cron).await {
        Ok(t) => t,
        Err(e) => return err(format!("Error: failed to persist task: {e}")),
    };

    if let Err(e) = state.scheduler.schedule_task(state.clone(), &task).await {
        return err(format!("Error: task saved but scheduling failed: {e}"));
    }

    ok(format!("Scheduled task '{name}' with cron '{cron}'."))
}

async fn update_scheduled_task(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    let mut task = match state.store.get_task_by_name(&name).await {
        Ok(Some(t)) => t,
        Ok(None) => return err(format!("Error: no task named '{name}'")),
        Err(e) => return err(format!("Error: {e}")),
    };

    if let Some(description) = opt_str_arg(args, "description") {
        task.description = description;
    }
    if let Some(cron) = opt_str_arg(args, "cron") {
        if let Err(e) = Scheduler::validate_cron(&cron) {
            return err(format!("Error: invalid cron expression '{cron}': {e}"));
        }
        task.cron = cron;
    }
    if let Some(enabled) = args.get("enabled").and_then(|v| v.as_bool()) {
        task.enabled = enabled;
    }

    if let Err(e) = state.store.update_task(&task).await {
        return err(format!("Error: failed to update task: {e}"));
    }

    // Reconcile the live job registry with the new row.
    if task.enabled {
        if let Err(e) = state.scheduler.schedule_task(state.clone(), &task).await {
            return err(format!("Error: task saved but scheduling failed: {e}"));
        }
    } else {
        state.scheduler.unschedule_task(&task.id).await;
    }

    ok(format!(
        "Updated task '{name}' (cron '{}', {}).",
        task.cron,
        if task.enabled { "enabled" } else { "disabled" }
    ))
}

async fn delete_scheduled_task(state: &AppState, args: &Value) -> (String, bool) {
    let name = match str_arg(args, "name") {
        Ok(n) => n,
        Err(e) => return err(e),
    };
    match state.store.delete_task_by_name(&name).await {
        Ok(Some(task)) => {
            state.scheduler.unschedule_task(&task.id).await;
            ok(format!("Deleted task '{name}' and stopped its schedule."))
        }
        Ok(None) => err(format!("Error: no task named '{name}'")),
        Err(e) => err(format!("Error: {e}")),
    }
}

async fn list_scheduled_tasks(state: &AppState) -> (String, bool) {
    let tasks = match state.store.list_tasks().await {
        Ok(t) => t,
        Err(e) => return err(format!("Error: {e}")),
    };
    if tasks.is_empty() {
        return ok("No scheduled tasks. Use schedule_task to add one.");
    }

    let mut lines = vec![format!("{} scheduled task(s):", tasks.len())];
    for task in tasks {
        let last = match state.store.latest_run(&task.id).await {
            Ok(Some(run)) => format!(", last run {}", run.status.as_str()),
            _ => String::new(),
        };
        lines.push(format!(
            "- {} (cron '{}', {}{last}) — {}",
            task.name,
            task.cron,
            if task.enabled { "enabled" } else { "disabled" },
            task.description
        ));
    }
    ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_pattern() {
        assert!(valid_name("get_github_user"));
        assert!(valid_name("a"));
        assert!(valid_name("tool2"));
        assert!(!valid_name(""));
        assert!(!valid_name("2tool"));
        assert!(!valid_name("_tool"));
        assert!(!valid_name("Tool"));
        assert!(!valid_name("my-tool"));
        assert!(!valid_name("my tool"));
    }

    #[test]
    fn schema_arg_accepts_object_and_object_string() {
        let args = serde_json::json!({"input_schema": {"type": "object", "properties": {}}});
        assert!(schema_arg(&args, "input_schema").is_ok());

        let args = serde_json::json!({"input_schema": "{\"type\":\"object\"}"});
        assert!(schema_arg(&args, "input_schema").is_ok());
    }

    #[test]
    fn schema_arg_rejects_arrays_and_garbage() {
        let args = serde_json::json!({"input_schema": [1, 2]});
        let e = schema_arg(&args, "input_schema").unwrap_err();
        assert!(e.contains("an array"), "{e}");

        let args = serde_json::json!({"input_schema": "not json {"});
        assert!(schema_arg(&args, "input_schema").is_err());

        let args = serde_json::json!({});
        assert!(schema_arg(&args, "input_schema").is_err());
    }

    #[test]
    fn definitions_cover_every_meta_tool() {
        let names: Vec<String> = definitions().into_iter().map(|d| d.name).collect();
        for expected in [
            "create_tool",
            "update_tool",
            "delete_tool",
            "list_tools",
            "test_tool",
            "create_integration",
            "add_integration_tool",
            "remove_integration_tool",
            "delete_integration",
            "list_integrations",
            "schedule_task",
            "update_scheduled_task",
            "delete_scheduled_task",
            "list_scheduled_tasks",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
