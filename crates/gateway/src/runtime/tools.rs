//! Tool catalog — builds the tool set exposed to the model at each step
//! and dispatches tool calls to built-ins, meta-tools, or the sandbox.

use std::collections::HashSet;

use serde_json::Value;

use envoy_domain::tool::ToolDefinition;
use envoy_store::model::CustomToolRow;

use crate::runtime::meta_tools;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The static half of the catalog: built-ins plus meta-tools.
pub fn static_tool_definitions(state: &AppState) -> Vec<ToolDefinition> {
    let mut defs = builtin_defs(state);
    defs.extend(meta_tools::definitions());
    defs
}

/// Build the full tool set for one model step: built-ins, meta-tools,
/// then enabled custom and integration tools from the store.
pub async fn load_tool_definitions(state: &AppState) -> Vec<ToolDefinition> {
    let mut defs = static_tool_definitions(state);

    let reserved: HashSet<String> = defs.iter().map(|d| d.name.clone()).collect();

    match state.store.list_enabled_standalone_tools().await {
        Ok(tools) => {
            for tool in tools {
                push_dynamic_def(&mut defs, &reserved, &format!("custom_{}", tool.name), &tool);
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to load standalone tools"),
    }

    match state.store.list_enabled_integration_tools().await {
        Ok(tools) => {
            for (integration, tool) in tools {
                push_dynamic_def(
                    &mut defs,
                    &reserved,
                    &format!("{integration}_{}", tool.name),
                    &tool,
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to load integration tools"),
    }

    defs
}

fn push_dynamic_def(
    defs: &mut Vec<ToolDefinition>,
    reserved: &HashSet<String>,
    exposed: &str,
    tool: &CustomToolRow,
) {
    // Collisions resolve in favor of the built-in.
    if reserved.contains(exposed) {
        tracing::warn!(tool = exposed, "dynamic tool shadows a built-in, skipping");
        return;
    }
    let Some(parameters) = normalize_schema(&tool.input_schema, exposed) else {
        return;
    };
    defs.push(ToolDefinition {
        name: exposed.to_string(),
        description: tool.description.clone(),
        parameters,
    });
}

/// Parse and salvage a stored input schema.
///
/// Tool schemas originate from model text and may be imperfect: a root
/// that is not an object (or an object missing `type`) is normalized
/// rather than dropped. Only an outright parse failure omits the tool.
pub fn normalize_schema(raw: &str, exposed: &str) -> Option<Value> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(tool = exposed, error = %e, "unparseable input schema, omitting tool");
            return None;
        }
    };

    match parsed {
        Value::Object(mut obj) => {
            if !obj.contains_key("type") {
                tracing::warn!(tool = exposed, "schema missing root type, normalizing to object");
                obj.insert("type".into(), Value::String("object".into()));
            }
            Some(Value::Object(obj))
        }
        other => {
            tracing::warn!(
                tool = exposed,
                found = %other,
                "schema root is not an object, normalizing"
            );
            Some(serde_json::json!({"type": "object"}))
        }
    }
}

fn builtin_defs(state: &AppState) -> Vec<ToolDefinition> {
    let mut defs = vec![
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a file from the workspace. The path is relative to the workspace root.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Relative path of the file" }
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: "write_file".into(),
            description: "Write a file in the workspace, creating parent directories as needed.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Relative path of the file" },
                    "content": { "type": "string", "description": "Full file content" }
                },
                "required": ["path", "content"]
            }),
        },
        ToolDefinition {
            name: "list_dir".into(),
            description: "List a workspace directory.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Relative directory path (default '.')" }
                }
            }),
        },
    ];

    if state.config.shell_enabled {
        defs.push(ToolDefinition {
            name: "run_command".into(),
            description: "Run a shell command and return its output.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Shell command to execute" },
                    "timeout_sec": { "type": "integer", "description": "Hard timeout in seconds" }
                },
                "required": ["command"]
            }),
        });
    }

    defs
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Dispatch a single tool call. Returns `(result, is_error)` — failure is
/// data handed back to the model, never a thrown error.
pub async fn dispatch_tool(state: &AppState, tool_name: &str, arguments: &Value) -> (String, bool) {
    match tool_name {
        "read_file" => dispatch_read_file(state, arguments).await,
        "write_file" => dispatch_write_file(state, arguments).await,
        "list_dir" => dispatch_list_dir(state, arguments).await,
        "run_command" if state.config.shell_enabled => dispatch_run_command(arguments).await,
        _ => {
            if let Some(result) = meta_tools::dispatch(state, tool_name, arguments).await {
                return result;
            }
            dispatch_dynamic(state, tool_name, arguments).await
        }
    }
}

async fn dispatch_read_file(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: envoy_tools::file_ops::FileReadRequest =
        match serde_json::from_value(arguments.clone()) {
            Ok(r) => r,
            Err(e) => return (format!("invalid read_file arguments: {e}"), true),
        };
    match envoy_tools::file_ops::file_read(&state.config.tools_fs_root, req).await {
        Ok(v) => (v["content"].as_str().unwrap_or_default().to_string(), false),
        Err(e) => (e, true),
    }
}

async fn dispatch_write_file(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: envoy_tools::file_ops::FileWriteRequest =
        match serde_json::from_value(arguments.clone()) {
            Ok(r) => r,
            Err(e) => return (format!("invalid write_file arguments: {e}"), true),
        };
    match envoy_tools::file_ops::file_write(&state.config.tools_fs_root, req).await {
        Ok(v) => (v.to_string(), false),
        Err(e) => (e, true),
    }
}

async fn dispatch_list_dir(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: envoy_tools::file_ops::FileListRequest =
        match serde_json::from_value(arguments.clone()) {
            Ok(r) => r,
            Err(e) => return (format!("invalid list_dir arguments: {e}"), true),
        };
    match envoy_tools::file_ops::file_list(&state.config.tools_fs_root, req).await {
        Ok(v) => (serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string()), false),
        Err(e) => (e, true),
    }
}

async fn dispatch_run_command(arguments: &Value) -> (String, bool) {
    let req: envoy_tools::shell::ShellRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid run_command arguments: {e}"), true),
    };
    match envoy_tools::shell::run_command(req).await {
        Ok(v) => (serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string()), false),
        Err(e) => (e, true),
    }
}

/// Route a `custom_<name>` or `<integration>_<name>` call into the
/// sandbox with the stored body.
async fn dispatch_dynamic(state: &AppState, tool_name: &str, arguments: &Value) -> (String, bool) {
    match resolve_dynamic(state, tool_name).await {
        Ok(tool) => {
            let result = state.sandbox.execute(&tool.code, arguments.clone()).await;
            let is_error = result.starts_with("Error");
            (result, is_error)
        }
        Err(message) => (message, true),
    }
}

async fn resolve_dynamic(state: &AppState, tool_name: &str) -> Result<CustomToolRow, String> {
    if let Some(name) = tool_name.strip_prefix("custom_") {
        let tool = state
            .store
            .get_tool_by_name(name)
            .await
            .map_err(|e| format!("Error: tool lookup failed: {e}"))?;
        return match tool {
            Some(t) if t.enabled && t.integration_id.is_none() => Ok(t),
            _ => Err(format!("Unknown tool: '{tool_name}'")),
        };
    }

    // Integration tools are exposed as `<integration>_<tool>`.
    let integrations = state
        .store
        .list_integrations()
        .await
        .map_err(|e| format!("Error: integration lookup failed: {e}"))?;

    for integration in integrations.iter().filter(|i| i.enabled) {
        let prefix = format!("{}_", integration.name);
        if let Some(name) = tool_name.strip_prefix(&prefix) {
            let tool = state
                .store
                .get_tool_by_name(name)
                .await
                .map_err(|e| format!("Error: tool lookup failed: {e}"))?;
            if let Some(t) = tool {
                if t.enabled && t.integration_id.as_deref() == Some(integration.id.as_str()) {
                    return Ok(t);
                }
            }
        }
    }

    Err(format!("Unknown tool: '{tool_name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_well_formed_schema() {
        let raw = r#"{"type":"object","properties":{"q":{"type":"string"}},"required":["q"]}"#;
        let schema = normalize_schema(raw, "t").unwrap();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["q"]["type"], "string");
    }

    #[test]
    fn normalize_inserts_missing_type() {
        let raw = r#"{"properties":{"q":{"type":"string"}}}"#;
        let schema = normalize_schema(raw, "t").unwrap();
        assert_eq!(schema["type"], "object");
        // Properties survive the salvage.
        assert_eq!(schema["properties"]["q"]["type"], "string");
    }

    #[test]
    fn normalize_rejects_array_root() {
        let schema = normalize_schema(r#"[1,2,3]"#, "t").unwrap();
        assert_eq!(schema, serde_json::json!({"type": "object"}));
    }

    #[test]
    fn normalize_omits_unparseable() {
        assert!(normalize_schema("not json {", "t").is_none());
    }
}
