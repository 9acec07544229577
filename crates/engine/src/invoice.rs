use async_trait::async_trait;
use tokio::sync::Mutex;

use ferrobot_core::domain::order::OrderId;

/// Hand-off to the background invoice worker. The payload is the order id
/// alone; the worker re-loads the order on its own database session, so a
/// long-gone request cannot leak its resources into background work.
#[async_trait]
pub trait InvoiceQueue: Send + Sync {
    async fn enqueue(&self, order_id: OrderId);
}

/// Test double that records enqueued order ids.
#[derive(Default)]
pub struct RecordingInvoiceQueue {
    enqueued: Mutex<Vec<OrderId>>,
}

impl RecordingInvoiceQueue {
    pub async fn enqueued(&self) -> Vec<OrderId> {
        self.enqueued.lock().await.clone()
    }
}

#[async_trait]
impl InvoiceQueue for RecordingInvoiceQueue {
    async fn enqueue(&self, order_id: OrderId) {
        self.enqueued.lock().await.push(order_id);
    }
}
