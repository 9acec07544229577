//! Background invoice delivery. The queue payload is the order id alone;
//! the worker re-loads everything on its own pool session, so it keeps
//! working long after the originating request returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ferrobot_core::domain::order::OrderId;
use ferrobot_db::repositories::{InvoiceRecord, OrderLedger};
use ferrobot_engine::InvoiceQueue;
use ferrobot_telegram::render::format_money;

use crate::invoice::InvoiceRenderer;
use crate::mailer::MailSender;

/// Whole-task budget; rendering plus all mail attempts must fit in it.
const TASK_BUDGET: Duration = Duration::from_secs(120);

/// Mail attempts and the backoff before each retry.
const MAX_MAIL_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(10), Duration::from_secs(30)];

/// Engine-facing queue handle; sends never block.
pub struct ChannelInvoiceQueue {
    sender: mpsc::UnboundedSender<OrderId>,
}

#[async_trait]
impl InvoiceQueue for ChannelInvoiceQueue {
    async fn enqueue(&self, order_id: OrderId) {
        if self.sender.send(order_id.clone()).is_err() {
            // Worker gone during shutdown; the order itself is committed.
            error!(
                event_name = "invoice.enqueue_dropped",
                order_id = %order_id,
                "invoice worker is not running; delivery skipped"
            );
        }
    }
}

pub struct InvoiceDispatcher {
    ledger: Arc<dyn OrderLedger>,
    renderer: Arc<InvoiceRenderer>,
    mailer: Arc<dyn MailSender>,
}

impl InvoiceDispatcher {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        renderer: Arc<InvoiceRenderer>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        Self { ledger, renderer, mailer }
    }

    /// Starts the worker task and returns the queue handle for the
    /// engine.
    pub fn spawn(self) -> ChannelInvoiceQueue {
        let (sender, mut receiver) = mpsc::unbounded_channel::<OrderId>();

        tokio::spawn(async move {
            while let Some(order_id) = receiver.recv().await {
                let outcome =
                    tokio::time::timeout(TASK_BUDGET, self.deliver(&order_id)).await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(detail)) => {
                        // Order status is untouched; the failure is an
                        // operator concern, not a user-visible one.
                        error!(
                            event_name = "invoice.delivery_failed",
                            order_id = %order_id,
                            detail,
                            "invoice delivery failed after retries"
                        );
                    }
                    Err(_) => {
                        error!(
                            event_name = "invoice.delivery_timeout",
                            order_id = %order_id,
                            budget_secs = TASK_BUDGET.as_secs(),
                            "invoice delivery exceeded its budget"
                        );
                    }
                }
            }
        });

        ChannelInvoiceQueue { sender }
    }

    async fn deliver(&self, order_id: &OrderId) -> Result<(), String> {
        let invoice = self
            .ledger
            .load_invoice(order_id)
            .await
            .map_err(|error| format!("load failed: {error}"))?
            .ok_or_else(|| "order not found".to_string())?;

        let artifact = self
            .renderer
            .render(&invoice)
            .await
            .map_err(|error| format!("render failed: {error}"))?;

        let subject = format!("Tu factura {}", invoice.order.order_id);
        let body = invoice_mail_body(&invoice);

        let mut last_error = String::new();
        for attempt in 1..=MAX_MAIL_ATTEMPTS {
            match self
                .mailer
                .send_mail(
                    &invoice.order.customer_email,
                    &subject,
                    &body,
                    std::slice::from_ref(&artifact),
                )
                .await
            {
                Ok(artifact_url) => {
                    info!(
                        event_name = "invoice.delivered",
                        order_id = %order_id,
                        attempt,
                        "invoice email delivered"
                    );
                    if let Some(url) = artifact_url {
                        if let Err(error) = self.ledger.set_pdf_url(order_id, &url).await {
                            warn!(
                                event_name = "invoice.pdf_url_update_failed",
                                order_id = %order_id,
                                error = %error,
                                "could not record hosted invoice url"
                            );
                        }
                    }
                    return Ok(());
                }
                Err(mail_error) => {
                    last_error = mail_error.to_string();
                    warn!(
                        event_name = "invoice.send_retry",
                        order_id = %order_id,
                        attempt,
                        error = %mail_error,
                        "invoice email attempt failed"
                    );
                    if !mail_error.is_retryable() || attempt == MAX_MAIL_ATTEMPTS {
                        break;
                    }
                    tokio::time::sleep(RETRY_BACKOFF[(attempt - 1) as usize]).await;
                }
            }
        }

        Err(last_error)
    }
}

fn invoice_mail_body(invoice: &InvoiceRecord) -> String {
    format!(
        "<p>Hola {name},</p>\
         <p>Gracias por tu pedido <strong>{order_id}</strong> por un total de \
         <strong>{total}</strong>. Adjuntamos tu factura.</p>\
         <p>Un saludo,<br>el equipo de ventas</p>",
        name = invoice.order.customer_name,
        order_id = invoice.order.order_id,
        total = format_money(invoice.order.total_amount),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::InvoiceDispatcher;
    use crate::invoice::InvoiceRenderer;
    use crate::mailer::{MailError, RecordingMailer};
    use ferrobot_core::domain::order::OrderItem;
    use ferrobot_core::domain::product::Sku;
    use ferrobot_core::flows::states::CustomerDraft;
    use ferrobot_db::repositories::{CheckoutCommit, InMemoryOrderLedger, OrderLedger};
    use ferrobot_engine::InvoiceQueue;

    async fn committed_ledger() -> Arc<InMemoryOrderLedger> {
        let names = HashMap::from([(
            Sku::new("SKU00010"),
            "Taladro percutor 850W".to_string(),
        )]);
        let ledger = Arc::new(InMemoryOrderLedger::with_product_names(names).await);

        ledger
            .commit_checkout(CheckoutCommit {
                chat_id: 42,
                customer: CustomerDraft {
                    email: Some("buyer@example.com".to_string()),
                    name: Some("Jane".to_string()),
                    company: None,
                    address: Some("1 Main St".to_string()),
                    phone: Some("555-0001".to_string()),
                },
                items: vec![OrderItem {
                    product_sku: Sku::new("SKU00010"),
                    quantity: 2,
                    unit_price: Decimal::new(4500, 2),
                }],
            })
            .await
            .expect("commit");

        ledger
    }

    fn renderer_without_converter() -> Arc<InvoiceRenderer> {
        // The HTML fallback keeps the test independent of wkhtmltopdf.
        Arc::new(InvoiceRenderer::without_converter().expect("renderer"))
    }

    #[tokio::test]
    async fn delivery_works_on_an_independent_session_after_the_request_returned() {
        let ledger = committed_ledger().await;
        let order_id = ledger.orders().await[0].order_id.clone();

        let mailer = Arc::new(RecordingMailer::default());
        mailer.script(vec![Ok(Some("https://files.example/f.pdf".to_string()))]).await;

        let queue = InvoiceDispatcher::new(
            ledger.clone(),
            renderer_without_converter(),
            mailer.clone(),
        )
        .spawn();

        // The enqueue happens "after the request": only the order id
        // crosses the boundary.
        queue.enqueue(order_id.clone()).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if !mailer.sent().await.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("mail should be sent");

        let sent = mailer.sent().await;
        assert_eq!(sent[0].to, "buyer@example.com");
        assert!(sent[0].subject.contains("ORD00001"));
        assert_eq!(sent[0].attachment_names, vec!["ORD00001.html".to_string()]);

        // Hosted URL lands on the order.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let invoice = ledger.load_invoice(&order_id).await.expect("load");
                if invoice.expect("present").order.pdf_url.is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pdf url recorded");
    }

    #[tokio::test]
    async fn permanent_rejection_does_not_retry_and_leaves_order_committed() {
        let ledger = committed_ledger().await;
        let order_id = ledger.orders().await[0].order_id.clone();

        let mailer = Arc::new(RecordingMailer::default());
        mailer
            .script(vec![Err(MailError::Rejected { status: 422, detail: "bad".to_string() })])
            .await;

        let queue = InvoiceDispatcher::new(
            ledger.clone(),
            renderer_without_converter(),
            mailer.clone(),
        )
        .spawn();
        queue.enqueue(order_id.clone()).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if !mailer.sent().await.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("one attempt");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(mailer.sent().await.len(), 1, "permanent failure must not retry");
        let order = &ledger.orders().await[0];
        assert!(order.pdf_url.is_none());
        assert_eq!(order.status, ferrobot_core::domain::order::OrderStatus::Pending);
    }
}
