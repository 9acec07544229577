use std::sync::Arc;

use tracing::info;

use ferrobot_core::domain::cart::Cart;
use ferrobot_core::domain::product::Sku;
use ferrobot_core::errors::AssistantError;
use ferrobot_core::intent::ProductRef;
use ferrobot_db::repositories::ProductCatalog;
use ferrobot_db::session::SessionStore;
use ferrobot_telegram::render::{self, CartLineView};
use ferrobot_telegram::Reply;

use crate::products::{ProductHandler, Resolution};

pub struct CartHandler {
    catalog: Arc<dyn ProductCatalog>,
    session: Arc<dyn SessionStore>,
}

impl CartHandler {
    pub fn new(catalog: Arc<dyn ProductCatalog>, session: Arc<dyn SessionStore>) -> Self {
        Self { catalog, session }
    }

    /// Adds units of a product, freezing the current catalog price on the
    /// first add. Existing lines merge quantities.
    pub async fn add(
        &self,
        chat_id: i64,
        products: &ProductHandler,
        target: &ProductRef,
        quantity: u32,
    ) -> Result<Reply, AssistantError> {
        let sku = match products.resolve(chat_id, target).await? {
            Resolution::Sku(sku) => sku,
            Resolution::Miss(reply) => return Ok(reply),
        };
        let Some(product) = products.lookup(&sku).await? else {
            return Ok(render::product_unknown(&sku));
        };

        let quantity = quantity.max(1);
        let mut cart = self.session.get_cart(chat_id).await.map_err(crate::from_session)?;
        cart.add(sku.clone(), quantity, product.price);
        self.session.set_cart(chat_id, &cart).await.map_err(crate::from_session)?;

        info!(
            event_name = "cart.line_added",
            chat_id,
            sku = %sku,
            quantity,
            "cart line added"
        );

        let action = format!("He añadido {quantity} × *{}* al carrito.", product.name);
        let (lines, total) = self.view_lines(&cart).await?;
        Ok(render::cart_updated(&action, &lines, total))
    }

    /// Sets a line to exactly `quantity`; zero removes it.
    pub async fn update(
        &self,
        chat_id: i64,
        products: &ProductHandler,
        target: &ProductRef,
        quantity: u32,
    ) -> Result<Reply, AssistantError> {
        let sku = match products.resolve(chat_id, target).await? {
            Resolution::Sku(sku) => sku,
            Resolution::Miss(reply) => return Ok(reply),
        };

        let mut cart = self.session.get_cart(chat_id).await.map_err(crate::from_session)?;
        if !cart.set_quantity(&sku, quantity) && quantity > 0 {
            return Ok(render::cart_line_missing(&sku));
        }
        self.session.set_cart(chat_id, &cart).await.map_err(crate::from_session)?;

        let action = if quantity == 0 {
            format!("He quitado `{sku}` del carrito.")
        } else {
            format!("He dejado `{sku}` en {quantity} unidades.")
        };
        let (lines, total) = self.view_lines(&cart).await?;
        Ok(render::cart_updated(&action, &lines, total))
    }

    pub async fn remove(
        &self,
        chat_id: i64,
        products: &ProductHandler,
        target: &ProductRef,
    ) -> Result<Reply, AssistantError> {
        let sku = match products.resolve(chat_id, target).await? {
            Resolution::Sku(sku) => sku,
            Resolution::Miss(reply) => return Ok(reply),
        };

        let mut cart = self.session.get_cart(chat_id).await.map_err(crate::from_session)?;
        if !cart.remove(&sku) {
            return Ok(render::cart_line_missing(&sku));
        }
        self.session.set_cart(chat_id, &cart).await.map_err(crate::from_session)?;

        let action = format!("He quitado `{sku}` del carrito.");
        let (lines, total) = self.view_lines(&cart).await?;
        Ok(render::cart_updated(&action, &lines, total))
    }

    pub async fn view(&self, chat_id: i64) -> Result<Reply, AssistantError> {
        let cart = self.session.get_cart(chat_id).await.map_err(crate::from_session)?;
        let (lines, total) = self.view_lines(&cart).await?;
        Ok(render::cart_view(&lines, total))
    }

    pub async fn clear(&self, chat_id: i64) -> Result<Reply, AssistantError> {
        self.session.clear_cart(chat_id).await.map_err(crate::from_session)?;
        info!(event_name = "cart.cleared", chat_id, "cart cleared");
        Ok(render::cart_cleared())
    }

    /// Enriches cart lines with product names for presentation. A SKU
    /// that vanished from the catalog still renders, under its raw key.
    pub(crate) async fn view_lines(
        &self,
        cart: &Cart,
    ) -> Result<(Vec<CartLineView>, rust_decimal::Decimal), AssistantError> {
        let skus: Vec<Sku> = cart.lines().map(|(sku, _)| sku.clone()).collect();
        let products = self.catalog.find_many(&skus).await.map_err(crate::from_repository)?;

        let lines = cart
            .lines()
            .map(|(sku, line)| CartLineView {
                sku: sku.clone(),
                name: products
                    .iter()
                    .find(|product| &product.sku == sku)
                    .map(|product| product.name.clone())
                    .unwrap_or_else(|| sku.as_str().to_string()),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        Ok((lines, cart.total()))
    }
}
