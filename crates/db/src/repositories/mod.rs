use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use ferrobot_core::domain::client::Client;
use ferrobot_core::domain::order::{Order, OrderId, OrderItem};
use ferrobot_core::domain::product::{Category, Product, Sku};
use ferrobot_core::flows::states::CustomerDraft;

pub mod client;
pub mod memory;
pub mod order;
pub mod product;

pub use client::SqlClientDirectory;
pub use memory::{InMemoryClientDirectory, InMemoryOrderLedger, InMemoryProductCatalog};
pub use order::SqlOrderLedger;
pub use product::SqlProductCatalog;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid commit request: {0}")]
    InvalidRequest(String),
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_by_sku(&self, sku: &Sku) -> Result<Option<Product>, RepositoryError>;

    /// Resolves SKUs preserving the input order; SKUs missing from the
    /// catalog are dropped (the vector index may briefly know points the
    /// catalog no longer has).
    async fn find_many(&self, skus: &[Sku]) -> Result<Vec<Product>, RepositoryError>;

    async fn root_categories(&self) -> Result<Vec<Category>, RepositoryError>;
}

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Client>, RepositoryError>;
}

/// Everything the checkout commit needs. The draft must be complete
/// (email, name, address, phone) before this is constructed.
#[derive(Clone, Debug)]
pub struct CheckoutCommit {
    pub chat_id: i64,
    pub customer: CustomerDraft,
    pub items: Vec<OrderItem>,
}

/// One invoice line with the product name resolved for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceLine {
    pub product_sku: Sku,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl InvoiceLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceRecord {
    pub order: Order,
    pub lines: Vec<InvoiceLine>,
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Atomically resolves or creates the client by email, assigns the
    /// next order id, inserts the order with its items and decrements
    /// stock. Rolls back completely on any failure.
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<Order, RepositoryError>;

    /// Loads an order with items and product names eagerly resolved, for
    /// invoice rendering on a session independent from the request's.
    async fn load_invoice(&self, id: &OrderId) -> Result<Option<InvoiceRecord>, RepositoryError>;

    async fn set_pdf_url(&self, id: &OrderId, url: &str) -> Result<(), RepositoryError>;
}
