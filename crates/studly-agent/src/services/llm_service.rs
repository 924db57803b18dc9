use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::services::generator::PlanGenerator;
use crate::services::prompts;

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Failure of a single HTTP attempt.
struct AttemptError {
    error: anyhow::Error,
    retryable: bool,
}

impl AttemptError {
    fn retryable(error: anyhow::Error) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn fatal(error: anyhow::Error) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Chat completion client for an OpenAI-compatible endpoint (Gemini by default).
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
    retry_backoff: Duration,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        if config.api_key.is_empty() {
            warn!("LLM api key is empty, generation requests will likely be rejected");
        }

        Ok(Self {
            client,
            config,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Non-streaming completion with retries on transient failures.
    pub async fn generate_chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.send_once(&request).await {
                Ok(content) => return Ok(content),
                Err(err) if err.retryable && attempt < attempts => {
                    let delay = self.retry_backoff * attempt;
                    warn!(
                        "LLM attempt {}/{} failed: {:#}, retrying in {:?}",
                        attempt, attempts, err.error, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.error),
            }
        }
    }

    async fn send_once(&self, request: &ChatCompletionRequest<'_>) -> Result<String, AttemptError> {
        debug!(
            "Calling {} with {} messages",
            self.config.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::retryable(anyhow!("Failed to call LLM API: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = anyhow!("LLM API error: {} - {}", status, body);
            return Err(if is_retryable_status(status) {
                AttemptError::retryable(error)
            } else {
                AttemptError::fatal(error)
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(anyhow!("Failed to parse LLM response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AttemptError::fatal(anyhow!("No content returned from LLM")))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

#[async_trait]
impl PlanGenerator for LlmService {
    async fn generate_plan(&self, query: &str, context: &str) -> Result<String> {
        if query.trim().is_empty() {
            bail!("empty query");
        }
        self.generate_chat(vec![
            ChatMessage::system(prompts::PLAN_SYSTEM_PROMPT),
            ChatMessage::user(prompts::study_plan_prompt(query, context)),
        ])
        .await
    }

    async fn generate_summary(&self, history: &str) -> Result<String> {
        self.generate_chat(vec![
            ChatMessage::system(prompts::SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(prompts::summary_prompt(history)),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockServer {
        replies: Arc<Mutex<VecDeque<(StatusCode, Value)>>>,
        requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn handler(
        State(server): State<MockServer>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        server.requests.lock().await.push((auth, body));
        let (status, body) = server
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!({})));
        (status, Json(body))
    }

    async fn spawn(replies: Vec<(StatusCode, Value)>) -> (String, MockServer) {
        let server = MockServer {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Default::default()
        };
        let app = Router::new()
            .route("/chat/completions", post(handler))
            .with_state(server.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), server)
    }

    fn service(base_url: String, max_retries: u32) -> LlmService {
        LlmService::new(LlmConfig {
            base_url,
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            temperature: 0.3,
            max_tokens: 256,
            timeout_seconds: 5,
            max_retries,
        })
        .unwrap()
        .with_retry_backoff(Duration::from_millis(1))
    }

    fn completion(text: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
    }

    #[tokio::test]
    async fn test_generate_plan_sends_prompt_and_key() {
        let (url, server) = spawn(vec![(StatusCode::OK, completion("## Duration\n2 weeks"))]).await;
        let llm = service(url, 1);

        let plan = llm
            .generate_plan("Learn Rust", "No previous conversation history.")
            .await
            .unwrap();
        assert_eq!(plan, "## Duration\n2 weeks");

        let requests = server.requests.lock().await;
        assert_eq!(requests.len(), 1);
        let (auth, body) = &requests[0];
        assert_eq!(auth.as_deref(), Some("Bearer test-key"));
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], false);
        let user_prompt = body["messages"][1]["content"].as_str().unwrap();
        assert!(user_prompt.contains("Learn Rust"));
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let (url, server) = spawn(vec![
            (StatusCode::SERVICE_UNAVAILABLE, json!({"error": "busy"})),
            (StatusCode::OK, completion("summary")),
        ])
        .await;
        let llm = service(url, 3);

        let summary = llm.generate_summary("user: hi").await.unwrap();
        assert_eq!(summary, "summary");
        assert_eq!(server.requests.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (url, server) =
            spawn(vec![(StatusCode::UNAUTHORIZED, json!({"error": "bad key"}))]).await;
        let llm = service(url, 3);

        let err = llm.generate_summary("user: hi").await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert_eq!(server.requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (url, server) = spawn(vec![]).await;
        let llm = service(url, 2);

        assert!(llm.generate_summary("user: hi").await.is_err());
        assert_eq!(server.requests.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let (url, _server) = spawn(vec![(StatusCode::OK, json!({"choices": []}))]).await;
        let llm = service(url, 1);

        assert!(llm.generate_plan("Learn Rust", "ctx").await.is_err());
    }
}
