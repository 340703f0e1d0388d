//! System prompt assembly.
//!
//! Rebuilt on every model step, never cached: the set of custom tools,
//! integrations, and scheduled tasks changes at runtime (often inside the
//! current turn), and the prompt enumerates them so the model knows what
//! it can already do and what it has already scheduled.

use crate::runtime::integrations;
use crate::state::AppState;

const BASE_PROMPT: &str = "\
You are Envoy, a conversational assistant that can extend its own \
capabilities at runtime.

You can create new tools for yourself with `create_tool`: the body is a \
rhai script with three ambient bindings — `input` (the parsed arguments), \
`env` (a read view of the environment), and `http_get(url)` / \
`http_post(url, body)` for outbound HTTP. The script's last expression is \
the tool's result. Newly created tools become callable on your next turn.

Group related tools that share credentials into an integration \
(`create_integration` + `add_integration_tool`); declared config keys are \
filled in by the user and appear in `env`. Recurring work is handled with \
`schedule_task` using a cron expression (5-field, or 6-field with seconds).

When a tool returns a string starting with \"Error\", read it, adjust, and \
try again or explain the failure.";

pub async fn build_system_prompt(state: &AppState) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    // ── Custom tools ─────────────────────────────────────────────────
    match state.store.list_enabled_standalone_tools().await {
        Ok(tools) if !tools.is_empty() => {
            prompt.push_str("\n\n## Your custom tools\n");
            for tool in &tools {
                prompt.push_str(&format!(
                    "- `custom_{}` — {}\n",
                    tool.name,
                    summary(&tool.description)
                ));
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to enumerate custom tools for prompt"),
    }

    // ── Integrations ─────────────────────────────────────────────────
    match state.store.list_integrations().await {
        Ok(list) if !list.is_empty() => {
            prompt.push_str("\n## Integrations\n");
            for integration in &list {
                let badge = if integrations::is_configured(integration) {
                    "configured".to_string()
                } else {
                    let missing: Vec<&str> = integration
                        .config_schema
                        .iter()
                        .filter(|k| k.required)
                        .map(|k| k.key.as_str())
                        .collect();
                    format!("needs setup: {}", missing.join(", "))
                };
                prompt.push_str(&format!("- `{}` ({badge})", integration.name));

                match state.store.list_tools_for_integration(&integration.id).await {
                    Ok(tools) if !tools.is_empty() => {
                        let names: Vec<String> = tools
                            .iter()
                            .map(|t| format!("`{}_{}`", integration.name, t.name))
                            .collect();
                        prompt.push_str(&format!(" — tools: {}", names.join(", ")));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to enumerate integration tools")
                    }
                }
                prompt.push('\n');
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to enumerate integrations for prompt"),
    }

    // ── Scheduled tasks ──────────────────────────────────────────────
    match state.store.list_tasks().await {
        Ok(tasks) if !tasks.is_empty() => {
            prompt.push_str("\n## Scheduled tasks\n");
            for task in &tasks {
                prompt.push_str(&format!(
                    "- `{}` (cron `{}`, {})\n",
                    task.name,
                    task.cron,
                    if task.enabled { "enabled" } else { "disabled" }
                ));
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "failed to enumerate tasks for prompt"),
    }

    prompt
}

fn summary(description: &str) -> &str {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        "(no description)"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_handles_empty_descriptions() {
        assert_eq!(summary(""), "(no description)");
        assert_eq!(summary("  fetches PRs  "), "fetches PRs");
    }
}
