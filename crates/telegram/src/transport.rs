use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("chat transport failed: {0}")]
    Send(String),
    #[error("chat platform rejected the message ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}

/// Inline button; the payload round-trips back as `callback_query.data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self { text: text.into(), callback_data: callback_data.into() }
    }
}

/// Outbound side of the chat platform. The engine composes replies
/// against this seam; production wires the Bot API client, tests a
/// recorder.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        markdown: &str,
        buttons: Option<Vec<Vec<InlineButton>>>,
    ) -> Result<(), TransportError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        url: &str,
        caption: Option<&str>,
    ) -> Result<(), TransportError>;
}

/// Telegram Bot API client over the pooled HTTP client.
pub struct TelegramApi {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(client: reqwest::Client, bot_token: &SecretString) -> Self {
        Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", bot_token.expose_secret()),
        }
    }

    /// Points the platform's webhook at our endpoint, with the shared
    /// secret it must echo back on every delivery.
    pub async fn set_webhook(
        &self,
        webhook_url: &str,
        secret: &SecretString,
    ) -> Result<(), TransportError> {
        let payload = json!({
            "url": webhook_url,
            "secret_token": secret.expose_secret(),
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("setWebhook", payload).await
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<(), TransportError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(
                event_name = "transport.send_rejected",
                method,
                status = status.as_u16(),
                "chat platform rejected the call"
            );
            return Err(TransportError::Rejected { status: status.as_u16(), detail });
        }

        debug!(event_name = "transport.sent", method, "chat platform call delivered");
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramApi {
    async fn send_text(
        &self,
        chat_id: i64,
        markdown: &str,
        buttons: Option<Vec<Vec<InlineButton>>>,
    ) -> Result<(), TransportError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": markdown,
            "parse_mode": "Markdown",
        });
        if let Some(rows) = buttons {
            let keyboard: Vec<Vec<serde_json::Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| {
                            json!({"text": button.text, "callback_data": button.callback_data})
                        })
                        .collect()
                })
                .collect();
            payload["reply_markup"] = json!({ "inline_keyboard": keyboard });
        }
        self.call("sendMessage", payload).await
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        url: &str,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "photo": url,
            "parse_mode": "Markdown",
        });
        if let Some(caption) = caption {
            payload["caption"] = json!(caption);
        }
        self.call("sendPhoto", payload).await
    }
}

/// Captures everything sent, for assertions in engine and server tests.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentMessage {
    Text {
        chat_id: i64,
        markdown: String,
        buttons: Option<Vec<Vec<InlineButton>>>,
    },
    Photo {
        chat_id: i64,
        url: String,
        caption: Option<String>,
    },
}

impl RecordingTransport {
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|message| match message {
                SentMessage::Text { markdown, .. } => Some(markdown.clone()),
                SentMessage::Photo { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        markdown: &str,
        buttons: Option<Vec<Vec<InlineButton>>>,
    ) -> Result<(), TransportError> {
        self.sent.lock().await.push(SentMessage::Text {
            chat_id,
            markdown: markdown.to_string(),
            buttons,
        });
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        url: &str,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        self.sent.lock().await.push(SentMessage::Photo {
            chat_id,
            url: url.to_string(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }
}
