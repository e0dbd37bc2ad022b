//! Scripted LLM client for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use debrief_shared::Result;

use crate::{ChatMessage, Completion, LlmClient};

type Responder = dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync;

/// Mock LLM client whose answers are computed from the prompt.
///
/// Responses are derived from message content rather than call order, so the
/// mock stays deterministic under concurrent fan-out.
pub struct MockLlmClient {
    model: String,
    responder: Box<Responder>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    /// Create a mock that answers each prompt with `responder`.
    pub fn new(
        responder: impl Fn(&[ChatMessage]) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            model: "mock-model".into(),
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always returns the same text.
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = (self.responder)(messages)?;
        Ok(Completion::text(self.model.clone(), text))
    }
}
