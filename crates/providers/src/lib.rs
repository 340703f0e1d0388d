//! LLM provider adapters for the Envoy runtime.
//!
//! The agent loop only depends on the [`LlmProvider`] trait: a streaming
//! chat call that yields ordered [`envoy_domain::stream::StreamEvent`]s and
//! a finish reason. One adapter speaks the OpenAI chat-completions wire
//! format (which also covers Ollama, vLLM, Together, and friends); the
//! [`mock`] module provides a scripted provider for deterministic tests.

pub mod mock;
pub mod openai_compat;
mod sse;
mod traits;

pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatRequest, LlmProvider};
