//! Completion cache in front of the language model.
//!
//! Identical prompts sent to the same model are answered from storage, so
//! re-running a persona only pays for headlines the map has not shown before.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use debrief_llm::{ChatMessage, LlmClient};
use debrief_shared::Result;
use debrief_storage::Storage;

/// Pipeline stage a completion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Relevance,
    Summary,
    Briefing,
}

impl Stage {
    /// Storage key for the completion cache.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Summary => "summary",
            Self::Briefing => "briefing",
        }
    }
}

/// Compute the cache key for a prompt sent to `model`.
pub fn prompt_hash(model: &str, messages: &[ChatMessage]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    for message in messages {
        // NUL separators keep ("ab", "c") and ("a", "bc") apart
        hasher.update([0u8]);
        hasher.update(format!("{:?}", message.role).as_bytes());
        hasher.update([0u8]);
        hasher.update(message.content.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// LLM client wrapper that consults the completion cache first.
pub struct CachedLlm {
    inner: Arc<dyn LlmClient>,
    storage: Option<Arc<Storage>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CachedLlm {
    /// Wrap `inner`; with `storage` absent every call goes to the model.
    pub fn new(inner: Arc<dyn LlmClient>, storage: Option<Arc<Storage>>) -> Self {
        Self {
            inner,
            storage,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn model(&self) -> &str {
        self.inner.model()
    }

    /// Complete a prompt, answering from cache when possible.
    ///
    /// Cache read and write failures are logged and otherwise ignored.
    pub async fn complete(&self, stage: Stage, messages: &[ChatMessage]) -> Result<String> {
        let model = self.inner.model();
        let hash = self.storage.as_ref().map(|_| prompt_hash(model, messages));

        if let (Some(storage), Some(hash)) = (&self.storage, &hash) {
            match storage.get_completion(hash, model).await {
                Ok(Some(text)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(stage = stage.as_str(), "completion cache hit");
                    return Ok(text);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "completion cache read failed"),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let completion = self.inner.complete(messages).await?;

        if let (Some(storage), Some(hash)) = (&self.storage, &hash) {
            if let Err(e) = storage
                .set_completion(hash, model, stage.as_str(), &completion.text)
                .await
            {
                warn!(error = %e, "failed to cache completion");
            }
        }

        Ok(completion.text)
    }

    /// Number of completions answered from cache.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of completions sent to the model.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debrief_llm::MockLlmClient;

    fn prompt(user: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system("You are terse."), ChatMessage::user(user)]
    }

    #[test]
    fn prompt_hash_deterministic() {
        let a = prompt_hash("gpt", &prompt("hello"));
        let b = prompt_hash("gpt", &prompt("hello"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn prompt_hash_differs_by_model_and_content() {
        let base = prompt_hash("gpt", &prompt("hello"));
        assert_ne!(base, prompt_hash("other", &prompt("hello")));
        assert_ne!(base, prompt_hash("gpt", &prompt("hello!")));
    }

    #[test]
    fn prompt_hash_respects_message_boundaries() {
        let split_a = vec![ChatMessage::system("ab"), ChatMessage::user("c")];
        let split_b = vec![ChatMessage::system("a"), ChatMessage::user("bc")];
        assert_ne!(prompt_hash("m", &split_a), prompt_hash("m", &split_b));
    }

    #[tokio::test]
    async fn second_call_is_a_cache_hit() {
        let mock = Arc::new(MockLlmClient::always("cached answer"));
        let storage = Arc::new(Storage::open_in_memory().await.unwrap());
        let llm = CachedLlm::new(mock.clone(), Some(storage));

        let first = llm.complete(Stage::Summary, &prompt("x")).await.unwrap();
        let second = llm.complete(Stage::Summary, &prompt("x")).await.unwrap();

        assert_eq!(first, "cached answer");
        assert_eq!(second, "cached answer");
        assert_eq!(mock.calls(), 1);
        assert_eq!(llm.hits(), 1);
        assert_eq!(llm.misses(), 1);
    }

    #[tokio::test]
    async fn without_storage_every_call_hits_the_model() {
        let mock = Arc::new(MockLlmClient::always("fresh"));
        let llm = CachedLlm::new(mock.clone(), None);

        llm.complete(Stage::Relevance, &prompt("x")).await.unwrap();
        llm.complete(Stage::Relevance, &prompt("x")).await.unwrap();

        assert_eq!(mock.calls(), 2);
        assert_eq!(llm.hits(), 0);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let mock = Arc::new(MockLlmClient::new(|_| {
            Err(debrief_shared::DebriefError::Llm("boom".into()))
        }));
        let storage = Arc::new(Storage::open_in_memory().await.unwrap());
        let llm = CachedLlm::new(mock.clone(), Some(storage.clone()));

        assert!(llm.complete(Stage::Briefing, &prompt("x")).await.is_err());
        let hash = prompt_hash("mock-model", &prompt("x"));
        assert!(storage.get_completion(&hash, "mock-model").await.unwrap().is_none());
    }
}
