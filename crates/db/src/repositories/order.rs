use ferrobot_core::chrono::{DateTime, Utc};
use ferrobot_core::domain::client::ClientId;
use ferrobot_core::domain::order::{Order, OrderId, OrderItem, OrderStatus};
use ferrobot_core::domain::product::Sku;
use rust_decimal::Decimal;
use sqlx::Row;
use tracing::info;

use super::{client, CheckoutCommit, InvoiceLine, InvoiceRecord, OrderLedger, RepositoryError};
use crate::DbPool;

pub struct SqlOrderLedger {
    pool: DbPool,
}

impl SqlOrderLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderLedger for SqlOrderLedger {
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<Order, RepositoryError> {
        validate_commit(&commit)?;

        let customer = &commit.customer;
        let email = customer.email.as_deref().unwrap_or_default();
        let name = customer.name.as_deref().unwrap_or_default();

        // Client resolution is idempotent on email and retried internally;
        // a client row persisted by a later-failing order transaction is
        // harmless and reused on retry.
        let client_row = client::get_or_create(
            &self.pool,
            name,
            email,
            customer.phone.as_deref(),
            customer.address.as_deref(),
        )
        .await?;

        let total_amount: Decimal = commit.items.iter().map(OrderItem::line_total).sum();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let order_id = next_order_id(&mut tx).await?;
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_id,
                client_id,
                chat_id,
                customer_name,
                customer_email,
                shipping_address,
                total_amount,
                status,
                pdf_url,
                created_at,
                updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', NULL, ?, ?)
            "#,
        )
        .bind(order_id.as_str())
        .bind(client_row.client_id.as_str())
        .bind(commit.chat_id)
        .bind(&client_row.name)
        .bind(&client_row.email)
        .bind(customer.address.as_deref().unwrap_or_default())
        .bind(total_amount.to_string())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for item in &commit.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_sku, quantity, unit_price)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(order_id.as_str())
            .bind(item.product_sku.as_str())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.to_string())
            .execute(&mut *tx)
            .await?;

            deduct_stock(&mut tx, &item.product_sku, item.quantity).await?;
        }

        tx.commit().await?;

        info!(
            event_name = "orders.checkout_committed",
            order_id = %order_id,
            client_id = %client_row.client_id,
            chat_id = commit.chat_id,
            total = %total_amount,
            "order committed"
        );

        Ok(Order {
            order_id,
            client_id: Some(client_row.client_id),
            chat_id: commit.chat_id,
            customer_name: client_row.name,
            customer_email: client_row.email,
            shipping_address: customer.address.clone().unwrap_or_default(),
            total_amount,
            status: OrderStatus::Pending,
            pdf_url: None,
            items: commit.items,
            created_at: now,
            updated_at: now,
        })
    }

    async fn load_invoice(&self, id: &OrderId) -> Result<Option<InvoiceRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                o.order_id,
                o.client_id,
                o.chat_id,
                o.customer_name,
                o.customer_email,
                o.shipping_address,
                o.total_amount,
                o.status,
                o.pdf_url,
                o.created_at,
                o.updated_at,
                oi.product_sku,
                oi.quantity,
                oi.unit_price,
                p.name AS product_name
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.order_id
            JOIN products p ON p.sku = oi.product_sku
            WHERE o.order_id = ?
            ORDER BY oi.id ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let mut order = decode_order(first)?;
        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            let quantity_raw: i64 = row.try_get("quantity")?;
            let quantity = u32::try_from(quantity_raw).map_err(|_| {
                RepositoryError::Decode(format!("invalid order item quantity `{quantity_raw}`"))
            })?;
            let unit_price = parse_decimal(row, "unit_price")?;
            let product_sku = Sku::new(row.try_get::<String, _>("product_sku")?);

            order.items.push(OrderItem {
                product_sku: product_sku.clone(),
                quantity,
                unit_price,
            });
            lines.push(InvoiceLine {
                product_sku,
                product_name: row.try_get("product_name")?,
                quantity,
                unit_price,
            });
        }

        Ok(Some(InvoiceRecord { order, lines }))
    }

    async fn set_pdf_url(&self, id: &OrderId, url: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE orders SET pdf_url = ?, updated_at = ? WHERE order_id = ?",
        )
        .bind(url)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn validate_commit(commit: &CheckoutCommit) -> Result<(), RepositoryError> {
    if commit.items.is_empty() {
        return Err(RepositoryError::InvalidRequest("order needs at least one item".to_string()));
    }
    if commit.items.iter().any(|item| item.quantity == 0) {
        return Err(RepositoryError::InvalidRequest("item quantity must be positive".to_string()));
    }
    if !commit.customer.is_complete() {
        return Err(RepositoryError::InvalidRequest(
            "customer draft is missing required fields".to_string(),
        ));
    }
    Ok(())
}

/// Monotone `ORDnnnnn` sequence, serialized by the surrounding write
/// transaction.
async fn next_order_id(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
) -> Result<OrderId, RepositoryError> {
    let max: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(CAST(SUBSTR(order_id, 4) AS INTEGER))
        FROM orders
        WHERE order_id LIKE 'ORD%'
        "#,
    )
    .fetch_one(&mut **tx)
    .await?;

    Ok(OrderId::from_sequence(max.unwrap_or(0) + 1))
}

/// Single-warehouse decrement, floored at zero. Cross-warehouse
/// reservation is out of scope; the row with the most stock absorbs the
/// order.
async fn deduct_stock(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    sku: &Sku,
    quantity: u32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        UPDATE stock
        SET quantity = MAX(quantity - ?, 0)
        WHERE product_sku = ?
          AND warehouse_id = (
              SELECT warehouse_id FROM stock
              WHERE product_sku = ?
              ORDER BY quantity DESC, warehouse_id ASC
              LIMIT 1
          )
        "#,
    )
    .bind(i64::from(quantity))
    .bind(sku.as_str())
    .bind(sku.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn decode_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = match status_raw.as_str() {
        "pending" => OrderStatus::Pending,
        other => return Err(RepositoryError::Decode(format!("invalid order status `{other}`"))),
    };

    Ok(Order {
        order_id: OrderId(row.try_get("order_id")?),
        client_id: row.try_get::<Option<String>, _>("client_id")?.map(ClientId),
        chat_id: row.try_get("chat_id")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        shipping_address: row.try_get("shipping_address")?,
        total_amount: parse_decimal(row, "total_amount")?,
        status,
        pdf_url: row.try_get("pdf_url")?,
        items: Vec::new(),
        created_at: parse_datetime(row, "created_at")?,
        updated_at: parse_datetime(row, "updated_at")?,
    })
}

fn parse_decimal(
    row: &sqlx::sqlite::SqliteRow,
    field: &str,
) -> Result<Decimal, RepositoryError> {
    let raw: String = row.try_get(field)?;
    raw.parse::<Decimal>()
        .map_err(|error| RepositoryError::Decode(format!("invalid {field} `{raw}`: {error}")))
}

fn parse_datetime(
    row: &sqlx::sqlite::SqliteRow,
    field: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = row.try_get(field)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid {field} `{raw}`: {error}")))
}
