use std::sync::Arc;

use tracing::{debug, error, info};

use ferrobot_agent::analyzer::{AiAnalyzer, AnalyzerContext};
use ferrobot_agent::llm::LlmClient;
use ferrobot_core::commands::parse_callback_data;
use ferrobot_core::errors::AssistantError;
use ferrobot_core::flows::states::CheckoutState;
use ferrobot_core::intent::{Classification, Intent};
use ferrobot_db::repositories::ProductCatalog;
use ferrobot_db::session::SessionStore;
use ferrobot_telegram::render;
use ferrobot_telegram::update::{InboundText, InboundUpdate};
use ferrobot_telegram::Reply;

use crate::cart::CartHandler;
use crate::checkout::CheckoutHandler;
use crate::products::ProductHandler;
use crate::ChatLocks;

/// Receives normalized webhook updates, enforces idempotency and
/// per-chat serialization, routes between the active checkout and the
/// intent handlers, and composes the outbound reply.
pub struct Orchestrator {
    session: Arc<dyn SessionStore>,
    catalog: Arc<dyn ProductCatalog>,
    analyzer: AiAnalyzer<Arc<dyn LlmClient>>,
    products: ProductHandler,
    cart: CartHandler,
    checkout: CheckoutHandler,
    locks: ChatLocks,
}

impl Orchestrator {
    pub fn new(
        session: Arc<dyn SessionStore>,
        catalog: Arc<dyn ProductCatalog>,
        analyzer: AiAnalyzer<Arc<dyn LlmClient>>,
        products: ProductHandler,
        cart: CartHandler,
        checkout: CheckoutHandler,
    ) -> Self {
        Self {
            session,
            catalog,
            analyzer,
            products,
            cart,
            checkout,
            locks: ChatLocks::default(),
        }
    }

    /// Processes one update to completion. Returns `None` when the update
    /// is a duplicate or carries nothing actionable; otherwise the reply
    /// for the transport. Errors are already mapped to user-facing text.
    pub async fn handle_update(&self, inbound: InboundUpdate) -> Option<Reply> {
        let chat_id = inbound.chat_id;
        let update_id = inbound.update_id;

        let _guard = self.locks.acquire(chat_id).await;

        match self.session.mark_update_seen(update_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    event_name = "orchestrator.duplicate_dropped",
                    chat_id,
                    update_id,
                    "duplicate update dropped"
                );
                return None;
            }
            Err(session_error) => {
                error!(
                    event_name = "orchestrator.session_unavailable",
                    chat_id,
                    update_id,
                    error = %session_error,
                    "session store unavailable during dedup"
                );
                return Some(Reply::text(AssistantError::SessionUnavailable.user_message()));
            }
        }

        match self.route(chat_id, &inbound.text).await {
            Ok(reply) => reply,
            Err(assistant_error) => {
                error!(
                    event_name = "orchestrator.handler_failed",
                    chat_id,
                    update_id,
                    error = %assistant_error,
                    "handler failed; replying with generic error"
                );
                Some(Reply::text(assistant_error.user_message()))
            }
        }
    }

    async fn route(
        &self,
        chat_id: i64,
        text: &InboundText,
    ) -> Result<Option<Reply>, AssistantError> {
        match text {
            InboundText::Callback(data) => match parse_callback_data(data) {
                Some(intent) => {
                    self.dispatch(chat_id, Classification::command(intent), data).await.map(Some)
                }
                None => {
                    debug!(
                        event_name = "orchestrator.callback_ignored",
                        chat_id,
                        "unrecognized callback payload"
                    );
                    Ok(None)
                }
            },
            InboundText::Text(message) => self.route_text(chat_id, message).await.map(Some),
        }
    }

    async fn route_text(&self, chat_id: i64, message: &str) -> Result<Reply, AssistantError> {
        let checkout_state =
            self.session.get_checkout_state(chat_id).await.map_err(crate::from_session)?;

        let context = self.analyzer_context(chat_id, checkout_state.is_some()).await?;
        let classification = self.analyzer.analyze(message, &context).await;

        info!(
            event_name = "orchestrator.classified",
            chat_id,
            intent = classification.intent.name(),
            confidence = classification.confidence,
            source = ?classification.source,
            "message classified"
        );

        if let Some((state, draft)) = checkout_state {
            // A question mid-checkout is answered and then steered back;
            // anything else feeds the active step. The confirmation step
            // accepts no detours so a stray "yes" cannot be misread.
            let interrupts = state != CheckoutState::AskConfirm
                && classification.intent.interrupts_checkout();
            if !interrupts {
                return self.checkout.handle_answer(chat_id, message).await;
            }

            let reply = self.dispatch(chat_id, classification, message).await?;
            return Ok(reply.with_resume_reminder(state, &draft));
        }

        if classification.needs_clarification(message) {
            return Ok(render::clarifying_question());
        }

        self.dispatch(chat_id, classification, message).await
    }

    async fn dispatch(
        &self,
        chat_id: i64,
        classification: Classification,
        raw_message: &str,
    ) -> Result<Reply, AssistantError> {
        match classification.intent {
            Intent::ProductSearch { keywords } => {
                self.products.search(chat_id, &keywords).await
            }
            Intent::ProductDetail { target } => self.products.detail(chat_id, &target).await,
            Intent::AddToCart { target, quantity } => {
                self.cart.add(chat_id, &self.products, &target, quantity).await
            }
            Intent::UpdateQuantity { target, quantity } => {
                self.cart.update(chat_id, &self.products, &target, quantity).await
            }
            Intent::RemoveFromCart { target } => {
                self.cart.remove(chat_id, &self.products, &target).await
            }
            Intent::ViewCart => self.cart.view(chat_id).await,
            Intent::ClearCart => self.cart.clear(chat_id).await,
            Intent::CheckoutStart => self.checkout.start(chat_id, &self.cart).await,
            Intent::CheckoutAnswer { value } => {
                let answer = if value.trim().is_empty() { raw_message } else { value.as_str() };
                self.checkout.handle_answer(chat_id, answer).await
            }
            Intent::TechnicalQuestion { target, question } => {
                let question =
                    if question.trim().is_empty() { raw_message } else { question.as_str() };
                self.products.answer_technical(chat_id, target.as_ref(), question).await
            }
            Intent::Greeting => {
                let categories =
                    self.catalog.root_categories().await.map_err(crate::from_repository)?;
                Ok(render::greeting(&categories))
            }
            Intent::Help => Ok(render::help()),
            Intent::Unknown => Ok(render::clarifying_question()),
        }
    }

    /// Positional context for the classifier: the last shown listing as
    /// `(sku, name)` pairs.
    async fn analyzer_context(
        &self,
        chat_id: i64,
        checkout_active: bool,
    ) -> Result<AnalyzerContext, AssistantError> {
        let recent =
            self.session.get_recent_products(chat_id).await.map_err(crate::from_session)?;
        let products = self.catalog.find_many(&recent).await.map_err(crate::from_repository)?;

        let recent_products = recent
            .iter()
            .map(|sku| {
                let name = products
                    .iter()
                    .find(|product| &product.sku == sku)
                    .map(|product| product.name.clone())
                    .unwrap_or_default();
                (sku.as_str().to_string(), name)
            })
            .collect();

        Ok(AnalyzerContext { recent_products, history: Vec::new(), checkout_active })
    }
}
