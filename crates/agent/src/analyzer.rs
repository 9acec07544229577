use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use ferrobot_core::commands::parse_slash_command;
use ferrobot_core::domain::product::Sku;
use ferrobot_core::intent::{Classification, ClassifierSource, Intent, ProductRef};
use ferrobot_core::prompts;

use crate::fingerprint;
use crate::llm::{ChatMessage, LlmClient, LlmError};

/// At most this many prior turns are shown to the classifier.
const MAX_HISTORY_TURNS: usize = 6;

/// Conversation window handed to the analyzer alongside the message.
#[derive(Clone, Debug, Default)]
pub struct AnalyzerContext {
    /// `(sku, name)` pairs of the last listing, in presentation order.
    pub recent_products: Vec<(String, String)>,
    /// Prior turns, oldest first.
    pub history: Vec<ChatMessage>,
    pub checkout_active: bool,
}

/// Produces a validated `(intent, entities)` classification for a chat
/// message: slash commands short-circuit, the model is asked once with a
/// single jittered retry, and schema or transport failures degrade to
/// keyword fingerprinting.
pub struct AiAnalyzer<C> {
    llm: C,
    max_retries: u32,
}

impl<C> AiAnalyzer<C>
where
    C: LlmClient,
{
    pub fn new(llm: C) -> Self {
        Self { llm, max_retries: 1 }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub async fn analyze(&self, text: &str, context: &AnalyzerContext) -> Classification {
        if let Some(intent) = parse_slash_command(text) {
            return Classification::command(intent);
        }

        let mut messages: Vec<ChatMessage> = context
            .history
            .iter()
            .rev()
            .take(MAX_HISTORY_TURNS)
            .rev()
            .cloned()
            .collect();
        messages.push(ChatMessage::user(prompts::classifier_user_turn(
            text,
            &context.recent_products,
            context.checkout_active,
        )));

        let mut attempt = 0;
        let raw = loop {
            match self.llm.classify(prompts::CLASSIFIER_SYSTEM_PROMPT, &messages).await {
                Ok(raw) => break Some(raw),
                Err(LlmError::CircuitOpen) => {
                    debug!(event_name = "analyzer.circuit_open", "classifier circuit open");
                    break None;
                }
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "analyzer.classify_retry",
                        attempt,
                        error = %error,
                        "classifier call failed, retrying"
                    );
                    tokio::time::sleep(retry_jitter(attempt)).await;
                }
                Err(error) => {
                    warn!(
                        event_name = "analyzer.classify_failed",
                        error = %error,
                        "classifier unavailable, using keyword fallback"
                    );
                    break None;
                }
            }
        };

        let Some(raw) = raw else {
            return fingerprint::classify(text, context.checkout_active);
        };

        match parse_model_output(&raw) {
            Ok(classification) => classification,
            Err(reason) => {
                warn!(
                    event_name = "analyzer.schema_violation",
                    reason = %reason,
                    "classifier output failed validation, using keyword fallback"
                );
                fingerprint::classify(text, context.checkout_active)
            }
        }
    }
}

/// Base delay plus sub-250ms jitter derived from the clock; enough to
/// spread retries without a PRNG dependency.
fn retry_jitter(attempt: u32) -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(200 * u64::from(attempt) + u64::from(nanos % 250_000_000) / 1_000_000)
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    keywords: Option<String>,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    quantity: Option<i64>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    question: Option<String>,
}

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

/// Models occasionally wrap JSON in a markdown fence despite json-mode;
/// unwrap it before parsing.
fn strip_markdown_fence(content: &str) -> &str {
    let re = FENCE_RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("static fence regex")
    });
    match re.captures(content) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or(content),
        None => content.trim(),
    }
}

fn parse_model_output(raw: &str) -> Result<Classification, String> {
    let json = strip_markdown_fence(raw);
    let parsed: RawClassification =
        serde_json::from_str(json).map_err(|error| format!("invalid JSON: {error}"))?;

    let confidence = parsed.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
    let target = resolve_target(&parsed)?;
    let quantity = parsed
        .quantity
        .map(|qty| u32::try_from(qty.max(1)).map_err(|_| format!("quantity out of range: {qty}")))
        .transpose()?
        .unwrap_or(1);

    let intent = match parsed.intent.as_str() {
        "product_search" => Intent::ProductSearch {
            keywords: parsed
                .keywords
                .filter(|keywords| !keywords.trim().is_empty())
                .ok_or_else(|| "product_search without keywords".to_string())?,
        },
        "product_detail" => Intent::ProductDetail {
            target: target.ok_or_else(|| "product_detail without target".to_string())?,
        },
        "add_to_cart" => Intent::AddToCart {
            target: target.ok_or_else(|| "add_to_cart without target".to_string())?,
            quantity,
        },
        "update_quantity" => Intent::UpdateQuantity {
            target: target.ok_or_else(|| "update_quantity without target".to_string())?,
            quantity,
        },
        "remove_from_cart" => Intent::RemoveFromCart {
            target: target.ok_or_else(|| "remove_from_cart without target".to_string())?,
        },
        "view_cart" => Intent::ViewCart,
        "clear_cart" => Intent::ClearCart,
        "checkout_start" => Intent::CheckoutStart,
        "checkout_answer" => Intent::CheckoutAnswer {
            value: parsed.value.unwrap_or_default(),
        },
        "technical_question" => Intent::TechnicalQuestion {
            target,
            question: parsed
                .question
                .filter(|question| !question.trim().is_empty())
                .ok_or_else(|| "technical_question without question".to_string())?,
        },
        "greeting" => Intent::Greeting,
        "help" => Intent::Help,
        "unknown" => Intent::Unknown,
        other => return Err(format!("intent `{other}` is not in the closed set")),
    };

    Ok(Classification { intent, confidence, source: ClassifierSource::Model })
}

/// Normalization: SKUs are uppercased, positions must be >= 1, and an
/// explicit SKU wins when the model returns both.
fn resolve_target(parsed: &RawClassification) -> Result<Option<ProductRef>, String> {
    if let Some(sku) = parsed.sku.as_ref().filter(|sku| !sku.trim().is_empty()) {
        return Ok(Some(ProductRef::Sku(Sku::new(sku))));
    }
    match parsed.position {
        Some(position) if position >= 1 => Ok(Some(ProductRef::Position(position as usize))),
        Some(position) => Err(format!("position must be 1-based, got {position}")),
        None => Ok(None),
    }
}
