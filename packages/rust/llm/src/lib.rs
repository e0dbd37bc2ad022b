//! Language-model access for Debrief.
//!
//! This crate provides:
//! - [`LlmClient`]: the completion seam used by the pipeline
//! - [`OpenAiClient`]: an OpenAI-compatible chat-completions client with retries
//! - [`prompt`]: templates for relevance, summary, and briefing prompts

pub mod openai;
pub mod prompt;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use debrief_shared::Result;

pub use openai::OpenAiClient;
pub use prompt::{PromptTemplate, briefing_prompt, is_relevant, relevance_prompt, summary_prompt};

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockLlmClient;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A finished completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: String,
    pub latency_ms: u64,
}

impl Completion {
    /// A completion carrying only text (cache hits, mocks).
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Trait for chat-completion clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Complete a chat prompt.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_serializes_role_lowercase() {
        let msg = ChatMessage::system("You are helpful");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"You are helpful"}"#);
    }

    #[test]
    fn completion_text_constructor() {
        let c = Completion::text("gpt-test", "hello");
        assert_eq!(c.text, "hello");
        assert_eq!(c.model, "gpt-test");
        assert_eq!(c.tokens_in, 0);
    }
}
