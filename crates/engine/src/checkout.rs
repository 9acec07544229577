use std::sync::Arc;

use tracing::{error, info};

use ferrobot_core::errors::AssistantError;
use ferrobot_core::flows::engine::{CheckoutFlow, StepAction, StepReply};
use ferrobot_core::flows::states::{CheckoutEvent, CheckoutState, CustomerDraft};
use ferrobot_db::repositories::{CheckoutCommit, ClientDirectory, OrderLedger};
use ferrobot_db::session::SessionStore;
use ferrobot_telegram::render;
use ferrobot_telegram::Reply;

use crate::cart::CartHandler;
use crate::invoice::InvoiceQueue;

pub struct CheckoutHandler {
    session: Arc<dyn SessionStore>,
    clients: Arc<dyn ClientDirectory>,
    ledger: Arc<dyn OrderLedger>,
    invoices: Arc<dyn InvoiceQueue>,
    flow: CheckoutFlow,
}

impl CheckoutHandler {
    pub fn new(
        session: Arc<dyn SessionStore>,
        clients: Arc<dyn ClientDirectory>,
        ledger: Arc<dyn OrderLedger>,
        invoices: Arc<dyn InvoiceQueue>,
    ) -> Self {
        Self { session, clients, ledger, invoices, flow: CheckoutFlow }
    }

    /// Opens the checkout dialog. Requires a non-empty cart; any prior
    /// draft is discarded for the fresh run.
    pub async fn start(
        &self,
        chat_id: i64,
        cart_handler: &CartHandler,
    ) -> Result<Reply, AssistantError> {
        let cart = self.session.get_cart(chat_id).await.map_err(crate::from_session)?;
        if cart.is_empty() {
            return Ok(render::checkout_empty_cart());
        }

        self.session
            .set_checkout_state(chat_id, self.flow.initial_state(), CustomerDraft::default())
            .await
            .map_err(crate::from_session)?;

        info!(event_name = "checkout.started", chat_id, "checkout dialog opened");

        let (lines, total) = cart_handler.view_lines(&cart).await?;
        Ok(render::checkout_started(&lines, total))
    }

    /// Feeds one user answer into the state machine and performs whatever
    /// side effect the transition requests.
    pub async fn handle_answer(
        &self,
        chat_id: i64,
        answer: &str,
    ) -> Result<Reply, AssistantError> {
        let Some((state, draft)) =
            self.session.get_checkout_state(chat_id).await.map_err(crate::from_session)?
        else {
            return Ok(render::no_active_checkout());
        };

        let outcome = self
            .flow
            .apply(state, &draft, &CheckoutEvent::Answer(answer.to_string()))
            .map_err(AssistantError::invariant)?;

        match outcome.action {
            StepAction::LookupClient { email } => {
                self.run_lookup(chat_id, state, &outcome.draft, email).await
            }
            StepAction::Commit => self.run_commit(chat_id, outcome.draft).await,
            StepAction::None => {
                self.persist(chat_id, outcome.next, &outcome.draft).await?;
                Ok(render::step_reply(&outcome.reply, &outcome.draft))
            }
        }
    }

    /// Second phase of the returning-customer branch: resolve the email,
    /// then feed the result back into the flow as an event.
    async fn run_lookup(
        &self,
        chat_id: i64,
        state: CheckoutState,
        draft: &CustomerDraft,
        email: String,
    ) -> Result<Reply, AssistantError> {
        let found =
            self.clients.find_by_email(&email).await.map_err(crate::from_repository)?;

        let event = match &found {
            Some(client) => CheckoutEvent::ClientFound {
                name: client.name.clone(),
                email: client.email.clone(),
                phone: client.phone.clone(),
                address: client.address.clone(),
            },
            None => CheckoutEvent::ClientMissing { email },
        };

        let outcome =
            self.flow.apply(state, draft, &event).map_err(AssistantError::invariant)?;
        self.persist(chat_id, outcome.next, &outcome.draft).await?;

        match found {
            Some(client) => {
                let mut reply = render::returning_client_found(
                    &client.name,
                    client.phone.as_deref(),
                    client.address.as_deref(),
                );
                reply.messages.extend(
                    render::step_reply(&outcome.reply, &outcome.draft).messages,
                );
                Ok(reply)
            }
            None => Ok(render::step_reply(&outcome.reply, &outcome.draft)),
        }
    }

    /// The commit path. Clearing cart and checkout state is the LAST step
    /// so a crash or failure before it leaves everything retryable; the
    /// invoice worker only ever receives the order id.
    async fn run_commit(
        &self,
        chat_id: i64,
        draft: CustomerDraft,
    ) -> Result<Reply, AssistantError> {
        let cart = self.session.get_cart(chat_id).await.map_err(crate::from_session)?;
        if cart.is_empty() {
            self.session.clear_checkout_state(chat_id).await.map_err(crate::from_session)?;
            return Ok(render::checkout_empty_cart());
        }

        let commit = CheckoutCommit {
            chat_id,
            customer: draft.clone(),
            items: cart.to_order_items(),
        };

        match self.ledger.commit_checkout(commit).await {
            Ok(order) => {
                self.session.clear_cart(chat_id).await.map_err(crate::from_session)?;
                self.session
                    .clear_checkout_state(chat_id)
                    .await
                    .map_err(crate::from_session)?;

                self.invoices.enqueue(order.order_id.clone()).await;

                info!(
                    event_name = "checkout.committed",
                    chat_id,
                    order_id = %order.order_id,
                    total = %order.total_amount,
                    "checkout committed, invoice enqueued"
                );

                Ok(render::order_confirmed(
                    &order.customer_name,
                    order.order_id.as_str(),
                    &order.customer_email,
                ))
            }
            Err(repository_error) => {
                // Cart and checkout state stay put so the user can retry
                // from the confirmation step.
                error!(
                    event_name = "checkout.commit_failed",
                    chat_id,
                    error = %repository_error,
                    "order commit failed; cart and draft preserved"
                );
                Ok(render::checkout_commit_failed())
            }
        }
    }

    async fn persist(
        &self,
        chat_id: i64,
        next: Option<CheckoutState>,
        draft: &CustomerDraft,
    ) -> Result<(), AssistantError> {
        match next {
            Some(state) => self
                .session
                .set_checkout_state(chat_id, state, draft.clone())
                .await
                .map_err(crate::from_session),
            None => {
                self.session.clear_checkout_state(chat_id).await.map_err(crate::from_session)
            }
        }
    }
}
