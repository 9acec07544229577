use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sqlx::Row;

use ferrobot_core::domain::product::{Category, CategoryId, Product, Sku};

use super::{ProductCatalog, RepositoryError};
use crate::DbPool;

pub struct SqlProductCatalog {
    pool: DbPool,
}

impl SqlProductCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn image_urls(&self, sku: &Sku) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT i.url
            FROM product_images pi
            JOIN images i ON i.id = pi.image_id
            WHERE pi.product_sku = ?
            ORDER BY pi.position ASC
            "#,
        )
        .bind(sku.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("url").map_err(RepositoryError::Database))
            .collect()
    }
}

#[async_trait::async_trait]
impl ProductCatalog for SqlProductCatalog {
    async fn find_by_sku(&self, sku: &Sku) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                sku,
                name,
                description,
                brand,
                price,
                category_id,
                spec_json
            FROM products
            WHERE sku = ?
            "#,
        )
        .bind(sku.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut product = decode_product(&row)?;
        product.image_urls = self.image_urls(sku).await?;
        Ok(Some(product))
    }

    async fn find_many(&self, skus: &[Sku]) -> Result<Vec<Product>, RepositoryError> {
        let mut products = Vec::with_capacity(skus.len());
        for sku in skus {
            if let Some(product) = self.find_by_sku(sku).await? {
                products.push(product);
            }
        }
        Ok(products)
    }

    async fn root_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, parent_id FROM categories WHERE parent_id IS NULL ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Category {
                    id: CategoryId(row.try_get::<i64, _>("id")?),
                    name: row.try_get("name")?,
                    parent_id: row
                        .try_get::<Option<i64>, _>("parent_id")?
                        .map(CategoryId),
                })
            })
            .collect()
    }
}

pub(crate) fn decode_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    let sku: String = row.try_get("sku")?;
    let price_raw: String = row.try_get("price")?;
    let price = price_raw.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid price `{price_raw}` for product `{sku}`: {error}"))
    })?;

    let spec_json: Option<String> = row.try_get("spec_json")?;
    let specs: BTreeMap<String, String> = match spec_json {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid spec_json for product `{sku}`: {error}"))
        })?,
        _ => BTreeMap::new(),
    };

    Ok(Product {
        sku: Sku::new(&sku),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        brand: row.try_get("brand")?,
        price,
        category_id: row.try_get::<Option<i64>, _>("category_id")?.map(CategoryId),
        specs,
        image_urls: Vec::new(),
    })
}
