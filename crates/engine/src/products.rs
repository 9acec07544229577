use std::sync::Arc;

use tracing::{info, warn};

use ferrobot_agent::embeddings::EmbeddingService;
use ferrobot_agent::llm::LlmClient;
use ferrobot_core::domain::product::{Product, Sku};
use ferrobot_core::errors::AssistantError;
use ferrobot_core::intent::ProductRef;
use ferrobot_core::prompts;
use ferrobot_db::repositories::ProductCatalog;
use ferrobot_db::session::SessionStore;
use ferrobot_index::{VectorIndex, DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP_K, FALLBACK_SCORE_THRESHOLD};
use ferrobot_telegram::render;
use ferrobot_telegram::Reply;

/// At most this many products are rendered in a listing; the full hit
/// list (up to `DEFAULT_TOP_K`) still lands in `recent_products` so
/// positional references beyond the rendered rows keep working.
const SHOWN_LIMIT: usize = 3;

/// How a product reference resolved: either to a SKU or to a user-facing
/// miss (which is a complete reply on its own, with no state change).
pub(crate) enum Resolution {
    Sku(Sku),
    Miss(Reply),
}

pub struct ProductHandler {
    catalog: Arc<dyn ProductCatalog>,
    index: Arc<dyn VectorIndex>,
    embeddings: Arc<EmbeddingService<Arc<dyn LlmClient>>>,
    llm: Arc<dyn LlmClient>,
    session: Arc<dyn SessionStore>,
}

impl ProductHandler {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        index: Arc<dyn VectorIndex>,
        embeddings: Arc<EmbeddingService<Arc<dyn LlmClient>>>,
        llm: Arc<dyn LlmClient>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        Self { catalog, index, embeddings, llm, session }
    }

    /// Semantic search: embed the query, pull candidates from the vector
    /// index, enrich from the catalog, remember the shown list, render.
    /// Zero hits above the main threshold trigger one relaxed pass before
    /// giving up.
    pub async fn search(&self, chat_id: i64, keywords: &str) -> Result<Reply, AssistantError> {
        let vector = self
            .embeddings
            .embed(keywords)
            .await
            .map_err(crate::from_llm)?;

        let mut related = false;
        let mut hits = self
            .index
            .search(&vector, DEFAULT_TOP_K, DEFAULT_SCORE_THRESHOLD)
            .await
            .map_err(crate::from_index)?;

        if hits.is_empty() {
            related = true;
            hits = self
                .index
                .search(&vector, DEFAULT_TOP_K, FALLBACK_SCORE_THRESHOLD)
                .await
                .map_err(crate::from_index)?;
        }

        let skus: Vec<Sku> = hits.iter().map(|hit| hit.sku.clone()).collect();
        let products =
            self.catalog.find_many(&skus).await.map_err(crate::from_repository)?;
        if products.len() < skus.len() {
            // Catalog and index are eventually consistent; stale points
            // are dropped silently from the user's view.
            warn!(
                event_name = "products.index_catalog_drift",
                chat_id,
                indexed = skus.len(),
                resolved = products.len(),
                "vector index returned SKUs missing from the catalog"
            );
        }

        if products.is_empty() {
            return Ok(render::no_results(keywords));
        }

        let ordered: Vec<Sku> = products.iter().map(|product| product.sku.clone()).collect();
        self.session
            .set_recent_products(chat_id, ordered)
            .await
            .map_err(crate::from_session)?;

        info!(
            event_name = "products.search_served",
            chat_id,
            query = keywords,
            results = products.len(),
            related,
            "product search served"
        );

        if products.len() == 1 {
            return Ok(render::product_detail(&products[0]));
        }

        let shown = &products[..products.len().min(SHOWN_LIMIT)];
        Ok(if related {
            render::related_results(keywords, shown, products.len())
        } else {
            render::product_list(keywords, shown, products.len())
        })
    }

    pub async fn detail(
        &self,
        chat_id: i64,
        target: &ProductRef,
    ) -> Result<Reply, AssistantError> {
        let sku = match self.resolve(chat_id, target).await? {
            Resolution::Sku(sku) => sku,
            Resolution::Miss(reply) => return Ok(reply),
        };

        match self.catalog.find_by_sku(&sku).await.map_err(crate::from_repository)? {
            Some(product) => Ok(render::product_detail(&product)),
            None => Ok(render::product_unknown(&sku)),
        }
    }

    /// Grounded Q&A over the product's stored description and specs. The
    /// model is not allowed to answer from outside the datasheet; its
    /// uncertainty sentinel maps to a polite hand-off to sales.
    pub async fn answer_technical(
        &self,
        chat_id: i64,
        target: Option<&ProductRef>,
        question: &str,
    ) -> Result<Reply, AssistantError> {
        let sku = match target {
            Some(target) => match self.resolve(chat_id, target).await? {
                Resolution::Sku(sku) => sku,
                Resolution::Miss(reply) => return Ok(reply),
            },
            // Without an explicit reference the question is about the
            // most recently shown product.
            None => {
                let recent = self
                    .session
                    .get_recent_products(chat_id)
                    .await
                    .map_err(crate::from_session)?;
                match recent.into_iter().next() {
                    Some(sku) => sku,
                    None => return Ok(render::position_out_of_range(1, 0)),
                }
            }
        };

        let Some(product) =
            self.catalog.find_by_sku(&sku).await.map_err(crate::from_repository)?
        else {
            return Ok(render::product_unknown(&sku));
        };

        let specs: Vec<(String, String)> = product
            .specs
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let system_prompt = prompts::technical_answer_prompt(
            &product.name,
            product.sku.as_str(),
            &product.description,
            &specs,
        );

        match self.llm.answer(&system_prompt, question).await {
            Ok(answer) if answer.contains(prompts::TECHNICAL_UNCERTAIN_SENTINEL) => {
                Ok(render::technical_uncertain())
            }
            Ok(answer) => Ok(render::technical_answer(answer.trim())),
            Err(error) => {
                warn!(
                    event_name = "products.technical_answer_failed",
                    chat_id,
                    sku = %sku,
                    error = %error,
                    "technical answer unavailable"
                );
                Ok(render::technical_unavailable())
            }
        }
    }

    /// Resolves a product reference. Positions index 1-based into the
    /// last shown listing; out-of-range positions produce a user-facing
    /// miss rather than a guess.
    pub(crate) async fn resolve(
        &self,
        chat_id: i64,
        target: &ProductRef,
    ) -> Result<Resolution, AssistantError> {
        match target {
            ProductRef::Sku(sku) => Ok(Resolution::Sku(sku.clone())),
            ProductRef::Position(position) => {
                let recent = self
                    .session
                    .get_recent_products(chat_id)
                    .await
                    .map_err(crate::from_session)?;
                match position.checked_sub(1).and_then(|index| recent.get(index)) {
                    Some(sku) => Ok(Resolution::Sku(sku.clone())),
                    None => Ok(Resolution::Miss(render::position_out_of_range(
                        *position,
                        recent.len(),
                    ))),
                }
            }
        }
    }

    /// Product with resolved name for cart views, shared with the cart
    /// handler.
    pub(crate) async fn lookup(&self, sku: &Sku) -> Result<Option<Product>, AssistantError> {
        self.catalog.find_by_sku(sku).await.map_err(crate::from_repository)
    }
}
