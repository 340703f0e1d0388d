//! Scripted provider for deterministic tests.
//!
//! Each call to [`MockProvider::chat_stream`] pops the next scripted turn
//! and replays its events; every received [`ChatRequest`] is recorded so
//! tests can assert exactly what the model was shown (message order,
//! spliced tool results, available tool definitions).

use std::collections::VecDeque;

use parking_lot::Mutex;

use envoy_domain::error::Result;
use envoy_domain::stream::{BoxStream, StreamEvent};

use crate::traits::{ChatRequest, LlmProvider};

#[derive(Default)]
pub struct MockProvider {
    turns: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw event script for the next call.
    pub fn push_turn(&self, events: Vec<StreamEvent>) {
        self.turns.lock().push_back(events);
    }

    /// Queue a plain text answer (token per word, then stop).
    pub fn push_text_turn(&self, text: &str) {
        let mut events: Vec<StreamEvent> = text
            .split_inclusive(' ')
            .map(|w| StreamEvent::Token { text: w.to_string() })
            .collect();
        events.push(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        });
        self.push_turn(events);
    }

    /// Queue a turn that requests a single tool call.
    pub fn push_tool_call_turn(&self, call_id: &str, tool_name: &str, args: serde_json::Value) {
        self.push_turn(vec![
            StreamEvent::ToolCallStarted {
                call_id: call_id.into(),
                tool_name: tool_name.into(),
            },
            StreamEvent::ToolCallFinished {
                call_id: call_id.into(),
                tool_name: tool_name.into(),
                arguments: args,
            },
            StreamEvent::Done {
                usage: None,
                finish_reason: Some("tool_calls".into()),
            },
        ]);
    }

    /// Every request this provider has received, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Number of chat calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.requests.lock().push(req.clone());

        let events = self.turns.lock().pop_front().unwrap_or_else(|| {
            vec![StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            }]
        });

        Ok(Box::pin(futures_util::stream::iter(
            events.into_iter().map(Ok),
        )))
    }

    fn provider_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn scripted_turns_replay_in_order() {
        let provider = MockProvider::new();
        provider.push_text_turn("hello world");

        let req = ChatRequest::default();
        let mut stream = provider.chat_stream(&req).await.unwrap();

        let mut text = String::new();
        let mut finished = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::Token { text: t } => text.push_str(&t),
                StreamEvent::Done { .. } => finished = true,
                _ => {}
            }
        }
        assert_eq!(text, "hello world");
        assert!(finished);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_script_yields_bare_done() {
        let provider = MockProvider::new();
        let mut stream = provider.chat_stream(&ChatRequest::default()).await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert!(matches!(event, StreamEvent::Done { .. }));
    }
}
