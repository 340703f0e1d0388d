//! Core runtime — the step loop that drives a streaming model call,
//! interleaves tool execution, re-enters the model with spliced tool
//! results, and publishes fine-grained events to the session bus.
//!
//! The loop is explicit rather than delegated to any SDK continuation:
//! each step's model call must see the freshly-spliced tool results in
//! `messages`, so the cycle is driven here and the model stays stateless
//! from the loop's point of view.

pub mod integrations;
pub mod meta_tools;
pub mod prompt;
pub mod scheduler;
pub mod tools;

use std::collections::HashMap;

use futures_util::StreamExt;
use serde_json::Value;

use envoy_domain::error::Result;
use envoy_domain::stream::StreamEvent;
use envoy_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};
use envoy_providers::ChatRequest;

use crate::bus::{AgentEvent, ToolCallInfo, ToolResultInfo};
use crate::state::AppState;

/// Hard bound on model steps per turn. Reaching it terminates with
/// whatever text has accumulated — normal completion, not an error.
pub const MAX_STEPS: usize = 10;

/// What a completed turn hands back to its caller.
pub struct TurnOutcome {
    /// The accumulated assistant text across all steps.
    pub content: String,
    /// The updated structured history (without the system prompt).
    pub messages: Vec<Message>,
}

/// Run one agent turn against the given history.
///
/// Emits `start`, `delta`, `tool_calls`, `tool_results`, and `done` on the
/// session bus as the turn progresses. Model/stream failures are logged
/// and terminate the loop; the partially-accumulated text is still
/// returned so the caller can persist it.
pub async fn run_turn(
    state: &AppState,
    session_id: &str,
    user_message: &str,
    history: Vec<Message>,
) -> TurnOutcome {
    let mut messages = history;
    messages.push(Message::user(user_message));

    state.bus.emit(session_id, AgentEvent::Start);

    let mut full_text = String::new();

    for step in 1..=MAX_STEPS {
        // The system prompt and tool set are reassembled every step — the
        // catalog of custom tools, integrations, and tasks is dynamic and
        // may have changed inside this very turn (self-extension).
        let system_prompt = prompt::build_system_prompt(state).await;
        let tool_defs = tools::load_tool_definitions(state).await;

        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(Message::system(&system_prompt));
        wire.extend(messages.iter().cloned());

        let req = ChatRequest {
            messages: wire,
            tools: tool_defs,
            temperature: Some(0.2),
            max_tokens: None,
        };

        tracing::debug!(session_id, step, "model step");

        let mut stream = match state.llm.chat_stream(&req).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(session_id, error = %e, "model call failed");
                break;
            }
        };

        let mut step_text = String::new();
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut stream_failed = false;

        // Tool call assembly: call_id -> (name, accumulated args json).
        let mut tc_bufs: HashMap<String, (String, String)> = HashMap::new();

        while let Some(event_result) = stream.next().await {
            let event = match event_result {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(session_id, error = %e, "stream error");
                    stream_failed = true;
                    break;
                }
            };

            match event {
                StreamEvent::Token { text } => {
                    state
                        .bus
                        .emit(session_id, AgentEvent::Delta { content: text.clone() });
                    step_text.push_str(&text);
                }
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    tc_bufs.insert(call_id, (tool_name, String::new()));
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    if let Some((_, args)) = tc_bufs.get_mut(&call_id) {
                        args.push_str(&delta);
                    }
                }
                StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                    tc_bufs.remove(&call_id);
                    pending.push(ToolCall { call_id, tool_name, arguments });
                }
                StreamEvent::Done { finish_reason, .. } => {
                    tracing::debug!(session_id, step, ?finish_reason, "stream closed");
                }
                StreamEvent::Error { message } => {
                    tracing::error!(session_id, error = %message, "model reported stream error");
                    stream_failed = true;
                    break;
                }
            }
        }

        // Assemble calls that only came through started/delta.
        for (call_id, (name, args_str)) in tc_bufs.drain() {
            let arguments = if args_str.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&args_str).unwrap_or_else(|e| {
                    tracing::warn!(
                        call_id = %call_id,
                        tool = %name,
                        error = %e,
                        "tool call arguments are not valid JSON; defaulting to empty object"
                    );
                    Value::Object(Default::default())
                })
            };
            pending.push(ToolCall { call_id, tool_name: name, arguments });
        }

        full_text.push_str(&step_text);

        if stream_failed {
            // The partial text still becomes part of the history.
            if !step_text.is_empty() {
                messages.push(Message::assistant(step_text));
            }
            break;
        }

        // No tool calls requested: this step's text is the final answer.
        if pending.is_empty() {
            if !step_text.is_empty() {
                messages.push(Message::assistant(step_text));
            }
            break;
        }

        // ── Tool dispatch ──────────────────────────────────────────
        messages.push(build_assistant_message(&step_text, &pending));

        for tc in &pending {
            state.bus.emit(
                session_id,
                AgentEvent::ToolCalls {
                    tool_calls: vec![ToolCallInfo {
                        id: tc.call_id.clone(),
                        name: tc.tool_name.clone(),
                        args: tc.arguments.clone(),
                    }],
                },
            );

            let (result, is_error) =
                tools::dispatch_tool(state, &tc.tool_name, &tc.arguments).await;

            if is_error {
                tracing::debug!(session_id, tool = %tc.tool_name, "tool returned an error string");
            }

            state.bus.emit(
                session_id,
                AgentEvent::ToolResults {
                    tool_results: vec![ToolResultInfo {
                        id: tc.call_id.clone(),
                        name: tc.tool_name.clone(),
                        result: result.clone(),
                    }],
                },
            );

            messages.push(Message::tool_result(&tc.call_id, &tc.tool_name, &result));
        }

        if step == MAX_STEPS {
            tracing::warn!(session_id, "step limit reached, ending turn");
        }
    }

    state
        .bus
        .emit(session_id, AgentEvent::Done { content: full_text.clone() });

    TurnOutcome { content: full_text, messages }
}

/// Run a turn for a chat session: load the persisted conversation state,
/// run the loop, then persist the updated state and the transcript rows.
/// The state write is a single blob update — on disk the session always
/// reflects the previous turn or the completed turn, never a partial one.
pub async fn execute_chat_turn(
    state: &AppState,
    session_id: &str,
    user_message: &str,
) -> Result<TurnOutcome> {
    let history = state.store.get_conversation_state(session_id).await?;

    state.store.maybe_set_title(session_id, user_message).await?;

    let outcome = run_turn(state, session_id, user_message, history).await;

    state
        .store
        .set_conversation_state(session_id, &outcome.messages)
        .await?;
    state.store.append_message(session_id, "user", user_message).await?;
    state
        .store
        .append_message(session_id, "assistant", &outcome.content)
        .await?;

    Ok(outcome)
}

fn build_assistant_message(text: &str, tool_calls: &[ToolCall]) -> Message {
    let mut parts = Vec::new();

    if !text.is_empty() {
        parts.push(ContentPart::Text { text: text.to_string() });
    }

    for tc in tool_calls {
        parts.push(ContentPart::ToolUse {
            id: tc.call_id.clone(),
            name: tc.tool_name.clone(),
            input: tc.arguments.clone(),
        });
    }

    Message { role: Role::Assistant, content: MessageContent::Parts(parts) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_message_carries_text_and_calls() {
        let calls = vec![ToolCall {
            call_id: "c1".into(),
            tool_name: "list_dir".into(),
            arguments: serde_json::json!({"path": "."}),
        }];
        let msg = build_assistant_message("checking", &calls);
        match msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(&parts[0], ContentPart::Text { text } if text == "checking"));
                assert!(matches!(&parts[1], ContentPart::ToolUse { id, .. } if id == "c1"));
            }
            _ => panic!("expected parts"),
        }
    }

    #[test]
    fn assistant_message_without_text_has_only_calls() {
        let calls = vec![ToolCall {
            call_id: "c1".into(),
            tool_name: "t".into(),
            arguments: serde_json::json!({}),
        }];
        let msg = build_assistant_message("", &calls);
        match msg.content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 1),
            _ => panic!("expected parts"),
        }
    }
}
