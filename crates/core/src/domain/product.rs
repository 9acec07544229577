use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stock-keeping unit, the product's stable business key. Stored uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Sku(pub String);

impl Sku {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub sku: Sku,
    pub name: String,
    pub description: String,
    pub brand: Option<String>,
    pub price: Decimal,
    pub category_id: Option<CategoryId>,
    pub specs: BTreeMap<String, String>,
    pub image_urls: Vec<String>,
}

impl Product {
    /// Short description used in list rows; full text stays on the detail view.
    pub fn short_description(&self, max_chars: usize) -> String {
        if self.description.chars().count() <= max_chars {
            return self.description.clone();
        }
        let truncated: String = self.description.chars().take(max_chars).collect();
        format!("{}…", truncated.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use super::{Product, Sku};

    #[test]
    fn sku_normalizes_case_and_whitespace() {
        assert_eq!(Sku::new(" sku00010 ").as_str(), "SKU00010");
        assert_eq!(Sku::new("SKU00010"), Sku::new("sku00010"));
    }

    #[test]
    fn short_description_truncates_long_text() {
        let product = Product {
            sku: Sku::new("SKU00001"),
            name: "Taladro percutor".to_string(),
            description: "Taladro percutor profesional con mandril de 13 mm".to_string(),
            brand: Some("Hilti".to_string()),
            price: Decimal::new(4500, 2),
            category_id: None,
            specs: BTreeMap::new(),
            image_urls: Vec::new(),
        };

        let short = product.short_description(20);
        assert!(short.ends_with('…'));
        assert!(short.chars().count() <= 21);

        let full = product.short_description(200);
        assert_eq!(full, product.description);
    }
}
