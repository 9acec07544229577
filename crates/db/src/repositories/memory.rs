use std::collections::HashMap;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use ferrobot_core::chrono::Utc;
use ferrobot_core::domain::client::{Client, ClientId};
use ferrobot_core::domain::order::{Order, OrderId, OrderItem, OrderStatus};
use ferrobot_core::domain::product::{Category, Product, Sku};

use super::{
    CheckoutCommit, ClientDirectory, InvoiceLine, InvoiceRecord, OrderLedger, ProductCatalog,
    RepositoryError,
};

/// Catalog fake for handler tests; stores full products keyed by SKU.
#[derive(Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<HashMap<Sku, Product>>,
    categories: RwLock<Vec<Category>>,
}

impl InMemoryProductCatalog {
    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.sku.clone(), product);
    }

    pub async fn insert_category(&self, category: Category) {
        self.categories.write().await.push(category);
    }
}

#[async_trait::async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find_by_sku(&self, sku: &Sku) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(sku).cloned())
    }

    async fn find_many(&self, skus: &[Sku]) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(skus.iter().filter_map(|sku| products.get(sku).cloned()).collect())
    }

    async fn root_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = self.categories.read().await;
        Ok(categories.iter().filter(|c| c.parent_id.is_none()).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryClientDirectory {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientDirectory {
    pub async fn insert(&self, client: Client) {
        self.clients.write().await.insert(client.email.clone(), client);
    }
}

#[async_trait::async_trait]
impl ClientDirectory for InMemoryClientDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Client>, RepositoryError> {
        Ok(self.clients.read().await.get(&email.trim().to_lowercase()).cloned())
    }
}

#[derive(Default)]
struct LedgerState {
    orders: Vec<Order>,
    clients: HashMap<String, Client>,
    product_names: HashMap<Sku, String>,
}

/// Ledger fake mirroring the SQL commit semantics: idempotent client
/// resolution by email, sequential order ids, all-or-nothing item
/// validation.
#[derive(Default)]
pub struct InMemoryOrderLedger {
    state: RwLock<LedgerState>,
    fail_commits: RwLock<bool>,
}

impl InMemoryOrderLedger {
    pub async fn with_product_names(names: HashMap<Sku, String>) -> Self {
        let ledger = Self::default();
        ledger.state.write().await.product_names = names;
        ledger
    }

    /// Makes every subsequent commit fail, for retry-path tests.
    pub async fn set_fail_commits(&self, fail: bool) {
        *self.fail_commits.write().await = fail;
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.read().await.orders.clone()
    }

    pub async fn clients(&self) -> Vec<Client> {
        self.state.read().await.clients.values().cloned().collect()
    }

    pub async fn seed_client(&self, client: Client) {
        self.state.write().await.clients.insert(client.email.clone(), client);
    }
}

#[async_trait::async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<Order, RepositoryError> {
        if *self.fail_commits.read().await {
            return Err(RepositoryError::Conflict("commit rejected by test switch".to_string()));
        }
        if commit.items.is_empty() {
            return Err(RepositoryError::InvalidRequest(
                "order needs at least one item".to_string(),
            ));
        }
        if !commit.customer.is_complete() {
            return Err(RepositoryError::InvalidRequest(
                "customer draft is missing required fields".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        let email = commit
            .customer
            .email
            .clone()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let next_client_sequence = state
            .clients
            .values()
            .filter_map(|client| client.client_id.sequence())
            .max()
            .map(|sequence| sequence + 1)
            .unwrap_or(ClientId::FIRST_SEQUENCE);
        let client = state
            .clients
            .entry(email.clone())
            .or_insert_with(|| Client {
                client_id: ClientId::from_sequence(next_client_sequence),
                name: commit.customer.name.clone().unwrap_or_default(),
                email,
                phone: commit.customer.phone.clone(),
                address: commit.customer.address.clone(),
            })
            .clone();

        let total_amount: Decimal = commit.items.iter().map(OrderItem::line_total).sum();
        let now = Utc::now();
        let order = Order {
            order_id: OrderId::from_sequence(state.orders.len() as i64 + 1),
            client_id: Some(client.client_id),
            chat_id: commit.chat_id,
            customer_name: client.name,
            customer_email: client.email,
            shipping_address: commit.customer.address.clone().unwrap_or_default(),
            total_amount,
            status: OrderStatus::Pending,
            pdf_url: None,
            items: commit.items,
            created_at: now,
            updated_at: now,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn load_invoice(&self, id: &OrderId) -> Result<Option<InvoiceRecord>, RepositoryError> {
        let state = self.state.read().await;
        let Some(order) = state.orders.iter().find(|order| &order.order_id == id).cloned() else {
            return Ok(None);
        };

        let lines = order
            .items
            .iter()
            .map(|item| InvoiceLine {
                product_sku: item.product_sku.clone(),
                product_name: state
                    .product_names
                    .get(&item.product_sku)
                    .cloned()
                    .unwrap_or_else(|| item.product_sku.as_str().to_string()),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Ok(Some(InvoiceRecord { order, lines }))
    }

    async fn set_pdf_url(&self, id: &OrderId, url: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(order) = state.orders.iter_mut().find(|order| &order.order_id == id) {
            order.pdf_url = Some(url.to_string());
        }
        Ok(())
    }
}
