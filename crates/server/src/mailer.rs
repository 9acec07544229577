//! Outbound email through an HTTPS provider API. The core only sees
//! `send_mail`; the provider may return a hosted URL for the attachment,
//! which flows back into `orders.pdf_url`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::invoice::InvoiceArtifact;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail provider rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}

impl MailError {
    /// 4xx responses are permanent (bad address, bad payload); retrying
    /// cannot help. Everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
        }
    }
}

#[async_trait]
pub trait MailSender: Send + Sync {
    /// Sends one mail; returns the hosted attachment URL when the
    /// provider exposes one.
    async fn send_mail(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        attachments: &[InvoiceArtifact],
    ) -> Result<Option<String>, MailError>;
}

pub struct HttpApiMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<SecretString>,
    sender_email: String,
    sender_name: String,
}

impl HttpApiMailer {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        api_key: Option<SecretString>,
        sender_email: impl Into<String>,
        sender_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key,
            sender_email: sender_email.into(),
            sender_name: sender_name.into(),
        }
    }
}

#[async_trait]
impl MailSender for HttpApiMailer {
    async fn send_mail(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        attachments: &[InvoiceArtifact],
    ) -> Result<Option<String>, MailError> {
        let rendered_attachments: Vec<serde_json::Value> = attachments
            .iter()
            .map(|attachment| {
                json!({
                    "filename": attachment.filename,
                    "content_type": attachment.content_type,
                    "content": BASE64.encode(&attachment.bytes),
                })
            })
            .collect();

        let payload = json!({
            "from": { "email": self.sender_email, "name": self.sender_name },
            "to": [{ "email": to }],
            "subject": subject,
            "html": html_body,
            "attachments": rendered_attachments,
        });

        let mut request = self.client.post(&self.api_url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| MailError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status: status.as_u16(), detail });
        }

        let parsed: serde_json::Value = response.json().await.unwrap_or_default();
        Ok(parsed["artifact_url"].as_str().map(str::to_string))
    }
}

/// Test double: records sends and yields scripted outcomes.
#[derive(Default)]
pub struct RecordingMailer {
    outcomes: Mutex<Vec<Result<Option<String>, MailError>>>,
    sent: Mutex<Vec<SentMail>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub attachment_names: Vec<String>,
}

impl RecordingMailer {
    pub async fn script(&self, outcomes: Vec<Result<Option<String>, MailError>>) {
        *self.outcomes.lock().await = outcomes;
    }

    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send_mail(
        &self,
        to: &str,
        subject: &str,
        _html_body: &str,
        attachments: &[InvoiceArtifact],
    ) -> Result<Option<String>, MailError> {
        self.sent.lock().await.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            attachment_names: attachments
                .iter()
                .map(|attachment| attachment.filename.clone())
                .collect(),
        });

        let mut outcomes = self.outcomes.lock().await;
        if outcomes.is_empty() {
            Ok(None)
        } else {
            outcomes.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MailError;

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        assert!(MailError::Transport("connection reset".to_string()).is_retryable());
        assert!(MailError::Rejected { status: 503, detail: String::new() }.is_retryable());
        assert!(!MailError::Rejected { status: 422, detail: String::new() }.is_retryable());
    }
}
