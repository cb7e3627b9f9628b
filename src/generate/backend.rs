/// Text-generation backends.
///
/// `ChatBackend` speaks the OpenAI-compatible chat-completions wire shape
/// (Groq, OpenAI, vLLM, Ollama, LocalAI all serve it); `ScriptedBackend`
/// replays canned completions for tests.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API credential configured for {0}")]
    MissingCredentials(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("no completion choices in response")]
    EmptyResponse,
    #[error("no JSON object found in model output")]
    MissingPayload,
    #[error("payload parse error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Why the model stopped emitting tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// Output hit the token budget — the payload is likely truncated.
    Length,
    Other,
}

impl FinishReason {
    pub fn is_truncated(&self) -> bool {
        *self == FinishReason::Length
    }
}

/// One completion call: a single user prompt plus sampling parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub finish_reason: FinishReason,
}

/// Abstraction over a text-generation endpoint.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GenerationError>;

    /// False when a required credential is absent; callers surface this
    /// case instead of masking it with a fallback.
    fn is_configured(&self) -> bool {
        true
    }
}

// Wire shapes for the chat-completions endpoint.

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible HTTP backend.
pub struct ChatBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    key_required: bool,
}

impl ChatBackend {
    /// Endpoint requiring a bearer credential. A `None` key is reported as
    /// [`GenerationError::MissingCredentials`] at call time, before any
    /// request is made.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> ChatBackend {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .unwrap_or_default();

        ChatBackend {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            key_required: true,
        }
    }

    /// Groq-hosted endpoint, reading `GROQ_API_KEY` at construction.
    pub fn groq_from_env(model: &str) -> ChatBackend {
        Self::new(
            "https://api.groq.com/openai/v1",
            model,
            std::env::var("GROQ_API_KEY").ok(),
        )
    }

    /// OpenAI-hosted endpoint.
    pub fn openai(model: &str, api_key: impl Into<String>) -> ChatBackend {
        Self::new("https://api.openai.com/v1", model, Some(api_key.into()))
    }

    /// Local keyless server (vLLM, Ollama, LocalAI).
    pub fn local(port: u16, model: &str) -> ChatBackend {
        let mut backend = Self::new(format!("http://localhost:{}/v1", port), model, None);
        backend.key_required = false;
        backend
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }
}

#[async_trait]
impl GenerationBackend for ChatBackend {
    fn is_configured(&self) -> bool {
        !self.key_required || self.api_key.is_some()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GenerationError> {
        if !self.is_configured() {
            return Err(GenerationError::MissingCredentials(self.base_url.clone()));
        }

        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %self.model,
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            "sending completion request"
        );

        let mut http_request = self.client.post(self.chat_completions_url());
        if let Some(auth) = self.auth_header() {
            http_request = http_request.header(header::AUTHORIZATION, auth);
        }

        let response = http_request.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "completion endpoint returned an error");
            return Err(GenerationError::Endpoint { status, body });
        }

        let chat_response: ChatResponse = response.json().await?;
        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or(GenerationError::EmptyResponse)?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("stop") | None => FinishReason::Stop,
            Some(_) => FinishReason::Other,
        };

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            finish_reason,
        })
    }
}

/// In-memory backend replaying a queue of canned outcomes, in order.
/// An exhausted queue reports [`GenerationError::EmptyResponse`].
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<Completion, GenerationError>>>,
    call_count: AtomicU32,
    configured: bool,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> ScriptedBackend {
        ScriptedBackend {
            replies: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
            configured: true,
        }
    }

    /// A backend that reports missing credentials on every call.
    pub fn unconfigured() -> ScriptedBackend {
        let mut backend = Self::new();
        backend.configured = false;
        backend
    }

    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.push(Ok(Completion {
            content: content.into(),
            finish_reason: FinishReason::Stop,
        }));
        self
    }

    /// A reply whose finish reason reports truncation.
    pub fn with_truncated(self, content: impl Into<String>) -> Self {
        self.push(Ok(Completion {
            content: content.into(),
            finish_reason: FinishReason::Length,
        }));
        self
    }

    pub fn with_failure(self, error: GenerationError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, outcome: Result<Completion, GenerationError>) {
        match self.replies.lock() {
            Ok(mut queue) => queue.push_back(outcome),
            Err(poisoned) => poisoned.into_inner().push_back(outcome),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, GenerationError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if !self.configured {
            return Err(GenerationError::MissingCredentials("scripted".to_string()));
        }
        let next = match self.replies.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_backend_replays_in_order() {
        let backend = ScriptedBackend::new()
            .with_reply("first")
            .with_truncated("second");

        let request = CompletionRequest {
            prompt: "hi".to_string(),
            temperature: 0.5,
            max_tokens: 100,
        };

        let first = backend.complete(request.clone()).await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(first.finish_reason, FinishReason::Stop);

        let second = backend.complete(request.clone()).await.unwrap();
        assert!(second.finish_reason.is_truncated());

        assert!(matches!(
            backend.complete(request).await,
            Err(GenerationError::EmptyResponse)
        ));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn unconfigured_backend_reports_missing_credentials() {
        let backend = ScriptedBackend::unconfigured();
        assert!(!backend.is_configured());
        let result = backend
            .complete(CompletionRequest {
                prompt: "hi".to_string(),
                temperature: 0.5,
                max_tokens: 100,
            })
            .await;
        assert!(matches!(
            result,
            Err(GenerationError::MissingCredentials(_))
        ));
    }

    #[test]
    fn missing_key_leaves_backend_unconfigured() {
        let backend = ChatBackend::new("https://api.groq.com/openai/v1", "llama", None);
        assert!(!backend.is_configured());

        let keyed = ChatBackend::openai("gpt-4o-mini", "sk-test");
        assert!(keyed.is_configured());

        let local = ChatBackend::local(11434, "llama3.2");
        assert!(local.is_configured());
    }
}
