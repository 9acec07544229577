//! Inbound webhook endpoint. Delivery is at-least-once; the endpoint
//! validates the shared secret, hands the update to the orchestrator
//! under the request deadline, and always acknowledges with an empty 200
//! so the platform does not redeliver what we have already seen.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, warn};

use ferrobot_engine::Orchestrator;
use ferrobot_telegram::render::Outbound;
use ferrobot_telegram::update::{InboundUpdate, Update};
use ferrobot_telegram::ChatTransport;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub struct WebhookState {
    pub orchestrator: Arc<Orchestrator>,
    pub transport: Arc<dyn ChatTransport>,
    pub secret: SecretString,
    pub request_timeout: Duration,
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new().route("/webhook", post(webhook)).with_state(state)
}

pub async fn webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let presented = headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
    if presented != Some(state.secret.expose_secret()) {
        warn!(event_name = "webhook.bad_secret", "webhook secret mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let update: Update = match serde_json::from_value(body) {
        Ok(update) => update,
        Err(parse_error) => {
            // Unexpected shapes are logged and acknowledged; retrying the
            // same malformed body would never succeed.
            warn!(
                event_name = "webhook.malformed_update",
                error = %parse_error,
                "webhook body did not match the update schema"
            );
            return StatusCode::OK;
        }
    };
    let update_id = update.update_id;

    let Some(inbound) = InboundUpdate::from_raw(update) else {
        debug!(
            event_name = "webhook.no_content",
            update_id,
            "update carried nothing actionable"
        );
        return StatusCode::OK;
    };
    let chat_id = inbound.chat_id;

    match tokio::time::timeout(state.request_timeout, state.orchestrator.handle_update(inbound))
        .await
    {
        Ok(Some(reply)) => {
            deliver(&*state.transport, chat_id, reply).await;
        }
        Ok(None) => {}
        Err(_) => {
            error!(
                event_name = "webhook.deadline_exceeded",
                chat_id,
                update_id,
                timeout_secs = state.request_timeout.as_secs(),
                "orchestrator exceeded the request deadline"
            );
        }
    }

    StatusCode::OK
}

async fn deliver(transport: &dyn ChatTransport, chat_id: i64, reply: ferrobot_telegram::Reply) {
    for message in reply.messages {
        let sent = match message {
            Outbound::Text { markdown, buttons } => {
                transport.send_text(chat_id, &markdown, buttons).await
            }
            Outbound::Photo { url, caption } => {
                transport.send_photo(chat_id, &url, caption.as_deref()).await
            }
        };
        if let Err(transport_error) = sent {
            error!(
                event_name = "webhook.reply_send_failed",
                chat_id,
                error = %transport_error,
                "outbound reply could not be delivered"
            );
        }
    }
}
