//! OpenAI-compatible chat-completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use debrief_shared::{DebriefError, LlmConfig, Result};

use crate::{ChatMessage, Completion, LlmClient};

/// Attempts per request (first try included).
const MAX_ATTEMPTS: u32 = 3;

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("Debrief/", env!("CARGO_PKG_VERSION"));

/// Chat-completions client for OpenAI and API-compatible providers.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    retry_base_delay: Duration,
}

impl OpenAiClient {
    /// Create a client from config and the resolved API key.
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DebriefError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let url = self.endpoint();
        let started = Instant::now();

        // Retry logic with exponential backoff
        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = self.retry_base_delay * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            let resp = match response {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "completion request failed");
                    last_error = Some(DebriefError::Network(format!("{url}: {e}")));
                    continue;
                }
            };

            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
                    DebriefError::Llm(format!(
                        "invalid completion response: {e} (got: {})",
                        body.chars().take(200).collect::<String>()
                    ))
                })?;
                let completion = into_completion(parsed, &self.model, started.elapsed())?;
                debug!(
                    tokens_in = completion.tokens_in,
                    tokens_out = completion.tokens_out,
                    latency_ms = completion.latency_ms,
                    "completion received"
                );
                return Ok(completion);
            } else if status.as_u16() == 429 || status.is_server_error() {
                warn!(attempt = attempt + 1, %status, "retryable completion error");
                last_error = Some(DebriefError::Llm(format!(
                    "HTTP {status} (attempt {}): {body}",
                    attempt + 1
                )));
                continue;
            } else {
                // Client error, don't retry
                return Err(DebriefError::Llm(format!("HTTP {status}: {body}")));
            }
        }

        Err(last_error.unwrap_or_else(|| DebriefError::Llm("all retry attempts failed".into())))
    }
}

fn into_completion(response: ChatResponse, model: &str, elapsed: Duration) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DebriefError::Llm("completion response has no choices".into()))?;

    let usage = response.usage.unwrap_or_default();

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        tokens_in: usage.prompt_tokens,
        tokens_out: usage.completion_tokens,
        model: response.model.unwrap_or_else(|| model.to_string()),
        latency_ms: elapsed.as_millis() as u64,
    })
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> OpenAiClient {
        let config = LlmConfig {
            base_url: format!("{}/", server.uri()),
            model: "gpt-test".into(),
            retry_base_delay_ms: 1,
            ..LlmConfig::default()
        };
        OpenAiClient::new(&config, "sk-test").unwrap()
    }

    fn ok_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-test-0613",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": text }, "finish_reason": "stop" }
            ],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        })
    }

    #[test]
    fn request_serializes_without_max_tokens() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-test",
            messages: &messages,
            temperature: 0.8,
            max_tokens: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn empty_choices_is_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let err = into_completion(response, "gpt-test", Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn complete_parses_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({ "model": "gpt-test" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("[\"RELEVANT\"]")))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let completion = client
            .complete(&[ChatMessage::system("sys"), ChatMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(completion.text, "[\"RELEVANT\"]");
        assert_eq!(completion.tokens_in, 12);
        assert_eq!(completion.tokens_out, 3);
        assert_eq!(completion.model, "gpt-test-0613");
    }

    #[tokio::test]
    async fn complete_retries_server_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("done")))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let completion = client.complete(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(completion.text, "done");
    }

    #[tokio::test]
    async fn complete_gives_up_after_max_attempts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn complete_does_not_retry_client_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, DebriefError::Llm(_)));
        assert!(err.to_string().contains("bad request"));
    }
}
