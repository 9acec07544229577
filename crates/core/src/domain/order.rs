use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::client::ClientId;
use super::product::Sku;

/// Business key with the `ORDnnnnn` shape, zero-padded to five digits.
/// The sequence is monotone across the whole system, serialized by the
/// database.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn from_sequence(sequence: i64) -> Self {
        Self(format!("ORD{sequence:05}"))
    }

    pub fn sequence(&self) -> Option<i64> {
        self.0.strip_prefix("ORD")?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_sku: Sku,
    pub quantity: u32,
    /// Unit price captured at the time the line entered the cart, not the
    /// product's current price.
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A committed order. Append-only after commit except for `pdf_url`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub client_id: Option<ClientId>,
    pub chat_id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub pdf_url: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
