use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm transport failed: {0}")]
    Transport(String),
    #[error("llm request timed out")]
    Timeout,
    #[error("llm provider rejected the request ({status}): {detail}")]
    Provider { status: u16, detail: String },
    #[error("llm circuit breaker is open")]
    CircuitOpen,
    #[error("llm response was malformed: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Circuit accounting: provider hiccups count, our own parsing does not.
    fn counts_as_failure(&self) -> bool {
        !matches!(self, Self::MalformedResponse(_) | Self::CircuitOpen)
    }
}

/// External model contract: JSON-mode classification, grounded plain-text
/// answers, and query embeddings.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn classify(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError>;

    async fn answer(&self, system_prompt: &str, question: &str) -> Result<String, LlmError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

#[async_trait]
impl<T> LlmClient for std::sync::Arc<T>
where
    T: LlmClient + ?Sized,
{
    async fn classify(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        (**self).classify(system_prompt, messages).await
    }

    async fn answer(&self, system_prompt: &str, question: &str) -> Result<String, LlmError> {
        (**self).answer(system_prompt, question).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        (**self).embed(text).await
    }
}

/// Opens after `threshold` consecutive failures and stays open for
/// `cooldown`; while open, calls degrade to the rule-based fallback
/// without touching the network.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: AtomicU32,
    open_until: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            consecutive_failures: AtomicU32::new(0),
            open_until: Mutex::new(None),
        }
    }

    pub fn check(&self) -> Result<(), LlmError> {
        let mut open_until = self.open_until.lock().expect("circuit lock");
        match *open_until {
            Some(deadline) if Instant::now() < deadline => Err(LlmError::CircuitOpen),
            Some(_) => {
                *open_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.threshold {
            let mut open_until = self.open_until.lock().expect("circuit lock");
            *open_until = Some(Instant::now() + self.cooldown);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            warn!(
                event_name = "llm.circuit_opened",
                failures,
                cooldown_secs = self.cooldown.as_secs(),
                "llm circuit breaker opened"
            );
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

/// HTTP client for OpenAI-compatible chat-completion and embedding
/// endpoints. One instance is shared by the analyzer and the embedding
/// service; the underlying `reqwest::Client` is connection-pooled.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    chat_model: String,
    embed_model: String,
    timeout: Duration,
    circuit: CircuitBreaker,
}

impl OpenAiCompatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        chat_model: impl Into<String>,
        embed_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            chat_model: chat_model.into(),
            embed_model: embed_model.into(),
            timeout,
            circuit: CircuitBreaker::default(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, LlmError> {
        self.circuit.check()?;

        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url).timeout(self.timeout).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let outcome = async {
            let response = request.send().await.map_err(|error| {
                if error.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(error.to_string())
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(LlmError::Provider { status: status.as_u16(), detail });
            }

            response
                .json::<Value>()
                .await
                .map_err(|error| LlmError::Transport(error.to_string()))
        }
        .await;

        match &outcome {
            Ok(_) => self.circuit.record_success(),
            Err(error) if error.counts_as_failure() => self.circuit.record_failure(),
            Err(_) => {}
        }
        outcome
    }

    fn chat_body(&self, system_prompt: &str, messages: &[ChatMessage], json_mode: bool) -> Value {
        let mut rendered = vec![json!({"role": "system", "content": system_prompt})];
        rendered.extend(messages.iter().map(|message| {
            json!({"role": message.role.as_str(), "content": message.content})
        }));

        let mut body = json!({
            "model": self.chat_model,
            "messages": rendered,
            "temperature": if json_mode { 0.1 } else { 0.2 },
            "max_tokens": if json_mode { 300 } else { 250 },
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

fn first_choice_content(response: &Value) -> Result<String, LlmError> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LlmError::MalformedResponse("missing choices[0].message.content".to_string()))
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn classify(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let body = self.chat_body(system_prompt, messages, true);
        let response = self.post("/chat/completions", body).await?;
        first_choice_content(&response)
    }

    async fn answer(&self, system_prompt: &str, question: &str) -> Result<String, LlmError> {
        let messages = [ChatMessage::user(question)];
        let body = self.chat_body(system_prompt, &messages, false);
        let response = self.post("/chat/completions", body).await?;
        first_choice_content(&response)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = json!({
            "model": self.embed_model,
            "input": text,
        });
        let response = self.post("/embeddings", body).await?;

        let values = response["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| LlmError::MalformedResponse("missing data[0].embedding".to_string()))?;

        values
            .iter()
            .map(|value| {
                value
                    .as_f64()
                    .map(|float| float as f32)
                    .ok_or_else(|| LlmError::MalformedResponse("non-numeric embedding".to_string()))
            })
            .collect()
    }
}
