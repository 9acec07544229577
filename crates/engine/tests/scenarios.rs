//! Scripted conversation scenarios exercising the full dispatch path:
//! orchestrator + analyzer fallback + handlers over in-memory stores.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use ferrobot_agent::analyzer::AiAnalyzer;
use ferrobot_agent::embeddings::EmbeddingService;
use ferrobot_agent::llm::{ChatMessage, LlmClient, LlmError};
use ferrobot_core::domain::client::{Client, ClientId};
use ferrobot_core::domain::product::{Category, CategoryId, Product, Sku};
use ferrobot_core::flows::states::CheckoutState;
use ferrobot_db::repositories::{
    ClientDirectory, InMemoryClientDirectory, InMemoryOrderLedger, InMemoryProductCatalog,
    ProductCatalog, OrderLedger,
};
use ferrobot_db::session::{InMemorySessionStore, SessionStore};
use ferrobot_engine::{
    CartHandler, CheckoutHandler, Orchestrator, ProductHandler, RecordingInvoiceQueue,
};
use ferrobot_index::{InMemoryVectorIndex, PointPayload, VectorIndex};
use ferrobot_telegram::render::Outbound;
use ferrobot_telegram::update::{InboundText, InboundUpdate};
use ferrobot_telegram::Reply;

const DIM: usize = 4;

struct ScriptedLlm {
    classify_script: Mutex<VecDeque<Result<String, LlmError>>>,
}

impl ScriptedLlm {
    fn new() -> Self {
        Self { classify_script: Mutex::new(VecDeque::new()) }
    }

    async fn push_classify(&self, result: Result<String, LlmError>) {
        self.classify_script.lock().await.push_back(result);
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn classify(
        &self,
        _system_prompt: &str,
        _messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        self.classify_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(LlmError::Transport("classifier offline".to_string())))
    }

    async fn answer(&self, _system_prompt: &str, _question: &str) -> Result<String, LlmError> {
        Ok("Según la ficha, sí.".to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let lowered = text.to_lowercase();
        Ok(if lowered.contains("taladr") {
            vec![1.0, 0.0, 0.0, 0.0]
        } else if lowered.contains("martillo") {
            vec![0.0, 1.0, 0.0, 0.0]
        } else if lowered.contains("adhesivo") {
            vec![0.0, 0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 0.0, 1.0]
        })
    }
}

struct Harness {
    orchestrator: Orchestrator,
    session: Arc<InMemorySessionStore>,
    ledger: Arc<InMemoryOrderLedger>,
    clients: Arc<InMemoryClientDirectory>,
    invoices: Arc<RecordingInvoiceQueue>,
    llm: Arc<ScriptedLlm>,
    next_update_id: Mutex<i64>,
}

fn product(sku: &str, name: &str, cents: i64) -> Product {
    Product {
        sku: Sku::new(sku),
        name: name.to_string(),
        description: format!("{name} de uso profesional"),
        brand: Some("Hilti".to_string()),
        price: Decimal::new(cents, 2),
        category_id: None,
        specs: BTreeMap::new(),
        image_urls: Vec::new(),
    }
}

async fn harness() -> Harness {
    let catalog = Arc::new(InMemoryProductCatalog::default());
    let index = Arc::new(InMemoryVectorIndex::new(DIM));

    // Three drills with decreasing relevance, one hammer, one adhesive.
    let seeds: Vec<(Product, Vec<f32>)> = vec![
        (product("SKU00010", "Taladro percutor 850W", 4500), vec![1.0, 0.0, 0.0, 0.0]),
        (product("SKU00011", "Taladro compacto 12V", 3990), vec![0.95, 0.05, 0.0, 0.0]),
        (product("SKU00012", "Taladro de columna", 19900), vec![0.9, 0.1, 0.0, 0.0]),
        (product("SKU00020", "Martillo de bola 500g", 1275), vec![0.0, 1.0, 0.0, 0.0]),
        (product("SKU00042", "Adhesivo de montaje", 1250), vec![0.0, 0.0, 1.0, 0.0]),
    ];
    for (item, vector) in seeds {
        index
            .upsert(&item.sku, vector, PointPayload { name: item.name.clone(), ..PointPayload::default() })
            .await
            .expect("seed index");
        catalog.insert(item).await;
    }
    catalog
        .insert_category(Category {
            id: CategoryId(1),
            name: "Herramientas".to_string(),
            parent_id: None,
        })
        .await;
    catalog
        .insert_category(Category {
            id: CategoryId(2),
            name: "Taladros".to_string(),
            parent_id: Some(CategoryId(1)),
        })
        .await;

    let session = Arc::new(InMemorySessionStore::new());
    let ledger = Arc::new(InMemoryOrderLedger::default());
    let clients = Arc::new(InMemoryClientDirectory::default());
    let invoices = Arc::new(RecordingInvoiceQueue::default());
    let llm = Arc::new(ScriptedLlm::new());

    let llm_dyn: Arc<dyn LlmClient> = llm.clone();
    let session_dyn: Arc<dyn SessionStore> = session.clone();
    let catalog_dyn: Arc<dyn ProductCatalog> = catalog.clone();
    let ledger_dyn: Arc<dyn OrderLedger> = ledger.clone();
    let clients_dyn: Arc<dyn ClientDirectory> = clients.clone();
    let index_dyn: Arc<dyn VectorIndex> = index;

    let embeddings = Arc::new(EmbeddingService::new(llm_dyn.clone()));
    let analyzer = AiAnalyzer::new(llm_dyn.clone()).with_max_retries(0);

    let products = ProductHandler::new(
        catalog_dyn.clone(),
        index_dyn,
        embeddings,
        llm_dyn.clone(),
        session_dyn.clone(),
    );
    let cart = CartHandler::new(catalog_dyn.clone(), session_dyn.clone());
    let checkout = CheckoutHandler::new(
        session_dyn.clone(),
        clients_dyn,
        ledger_dyn,
        invoices.clone() as Arc<dyn ferrobot_engine::InvoiceQueue>,
    );

    let orchestrator =
        Orchestrator::new(session_dyn, catalog_dyn, analyzer, products, cart, checkout);

    Harness {
        orchestrator,
        session,
        ledger,
        clients,
        invoices,
        llm,
        next_update_id: Mutex::new(1000),
    }
}

impl Harness {
    /// Seeds CUST0007 into both the directory the checkout consults and
    /// the ledger that resolves the client at commit time.
    async fn seed_returning_client(&self) {
        let client = Client {
            client_id: ClientId("CUST0007".to_string()),
            name: "Repeat Buyer".to_string(),
            email: "repeat@example.com".to_string(),
            phone: Some("555-0007".to_string()),
            address: Some("7 Repeat Rd".to_string()),
        };
        self.clients.insert(client.clone()).await;
        self.ledger.seed_client(client).await;
    }

    async fn send(&self, chat_id: i64, text: &str) -> Option<Reply> {
        let update_id = {
            let mut next = self.next_update_id.lock().await;
            *next += 1;
            *next
        };
        self.send_with_id(chat_id, update_id, text).await
    }

    async fn send_with_id(&self, chat_id: i64, update_id: i64, text: &str) -> Option<Reply> {
        self.orchestrator
            .handle_update(InboundUpdate {
                update_id,
                chat_id,
                username: Some("tester".to_string()),
                text: InboundText::Text(text.to_string()),
            })
            .await
    }
}

fn reply_text(reply: &Reply) -> String {
    reply
        .messages
        .iter()
        .map(|message| match message {
            Outbound::Text { markdown, .. } => markdown.clone(),
            Outbound::Photo { caption, .. } => caption.clone().unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn new_customer_happy_path() {
    let h = harness().await;
    let chat = 42;

    // Search runs through the keyword fallback (classifier offline).
    let listing = h.send(chat, "busco taladros").await.expect("reply");
    let listing_text = reply_text(&listing);
    assert!(listing_text.contains("*1. Taladro percutor 850W*"), "{listing_text}");
    assert!(listing_text.contains("*2. Taladro compacto 12V*"));
    assert!(listing_text.contains("*3. Taladro de columna*"));

    let added = h.send(chat, "/agregar SKU00010 2").await.expect("reply");
    assert!(reply_text(&added).contains("90,00 €"));

    let cart = h.session.get_cart(chat).await.expect("cart");
    assert_eq!(cart.get(&Sku::new("SKU00010")).expect("line").quantity, 2);
    assert_eq!(cart.total(), Decimal::new(9000, 2));

    let started = h.send(chat, "/finalizar_compra").await.expect("reply");
    assert!(reply_text(&started).contains("¿ya eres cliente nuestro?"));

    let answers = [
        ("no", "correo"),
        ("buyer@example.com", "nombre"),
        ("Jane", "empresa"),
        ("Acme", "dirección"),
        ("1 Main St", "teléfono"),
        ("555-0001", "Revisa tus datos"),
    ];
    for (answer, expected) in answers {
        let reply = h.send(chat, answer).await.expect("reply");
        let text = reply_text(&reply);
        assert!(
            text.to_lowercase().contains(&expected.to_lowercase()),
            "answer `{answer}` should prompt for `{expected}`, got: {text}"
        );
    }

    let confirmed = h.send(chat, "sí").await.expect("reply");
    let confirmed_text = reply_text(&confirmed);
    assert!(confirmed_text.contains("ORD00001"), "{confirmed_text}");
    assert!(confirmed_text.contains("buyer@example.com"));

    let orders = h.ledger.orders().await;
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.customer_email, "buyer@example.com");
    assert_eq!(order.total_amount, Decimal::new(9000, 2));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.client_id.as_ref().expect("client").as_str(), "CUST1000");

    assert!(h.session.get_cart(chat).await.expect("cart").is_empty());
    assert!(h.session.get_checkout_state(chat).await.expect("state").is_none());
    assert_eq!(h.invoices.enqueued().await.len(), 1);
    assert_eq!(h.invoices.enqueued().await[0], order.order_id);
}

#[tokio::test]
async fn returning_customer_fast_path() {
    let h = harness().await;
    let chat = 43;
    h.seed_returning_client().await;

    h.send(chat, "/agregar SKU00042 1").await.expect("reply");

    h.send(chat, "/finalizar_compra").await.expect("reply");
    let lookup = h.send(chat, "sí").await.expect("reply");
    assert!(reply_text(&lookup).contains("correo"));

    let found = h.send(chat, "repeat@example.com").await.expect("reply");
    let found_text = reply_text(&found);
    assert!(found_text.contains("Repeat Buyer"), "{found_text}");
    assert!(found_text.contains("7 Repeat Rd"));
    assert!(found_text.contains("Revisa tus datos"));

    let confirmed = h.send(chat, "sí").await.expect("reply");
    assert!(reply_text(&confirmed).contains("ORD00001"));

    let orders = h.ledger.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].client_id.as_ref().expect("client").as_str(), "CUST0007");
    assert_eq!(orders[0].customer_name, "Repeat Buyer");
    assert_eq!(orders[0].shipping_address, "7 Repeat Rd");
    assert_eq!(h.ledger.clients().await.len(), 1, "no new client row");
}

#[tokio::test]
async fn positional_reference_resolves_against_last_listing() {
    let h = harness().await;
    let chat = 44;

    h.send(chat, "busco taladros").await.expect("listing");

    h.llm
        .push_classify(Ok(
            r#"{"intent": "product_detail", "position": 2, "confidence": 0.93}"#.to_string(),
        ))
        .await;
    let detail = h.send(chat, "dame detalles del segundo").await.expect("reply");
    let text = reply_text(&detail);
    assert!(text.contains("Taladro compacto 12V"), "{text}");
    assert!(text.contains("SKU00011"));

    // A later non-listing message leaves recent_products unchanged.
    h.send(chat, "/ver_carrito").await.expect("reply");
    let recent = h.session.get_recent_products(chat).await.expect("recent");
    assert_eq!(recent[1], Sku::new("SKU00011"));
}

#[tokio::test]
async fn out_of_range_position_is_reported_not_guessed() {
    let h = harness().await;
    let chat = 45;

    h.send(chat, "busco taladros").await.expect("listing");

    h.llm
        .push_classify(Ok(
            r#"{"intent": "product_detail", "position": 9, "confidence": 0.9}"#.to_string(),
        ))
        .await;
    let reply = h.send(chat, "dame el noveno").await.expect("reply");
    assert!(reply_text(&reply).contains("No veo el número 9"));
}

#[tokio::test]
async fn interruption_preserves_checkout_state() {
    let h = harness().await;
    let chat = 46;

    h.send(chat, "/agregar SKU00010 1").await.expect("reply");
    h.send(chat, "/finalizar_compra").await.expect("reply");
    for answer in ["no", "buyer@example.com", "Jane", "Acme"] {
        h.send(chat, answer).await.expect("reply");
    }

    let state = h.session.get_checkout_state(chat).await.expect("state").expect("active");
    assert_eq!(state.0, CheckoutState::AskAddress);

    // A product question interrupts, is answered, and appends the resume
    // reminder; the checkout state must not move.
    h.llm
        .push_classify(Ok(
            r#"{"intent": "product_search", "keywords": "martillos", "confidence": 0.9}"#
                .to_string(),
        ))
        .await;
    let interrupted = h.send(chat, "¿tienes martillos?").await.expect("reply");
    let text = reply_text(&interrupted);
    assert!(text.contains("Martillo de bola"), "{text}");
    assert!(text.contains("Continuamos con tu pedido"));
    assert!(text.contains("dirección de envío"));

    let state = h.session.get_checkout_state(chat).await.expect("state").expect("active");
    assert_eq!(state.0, CheckoutState::AskAddress, "interruption must not advance the flow");

    // The flow resumes where it paused.
    let resumed = h.send(chat, "1 Main St").await.expect("reply");
    assert!(reply_text(&resumed).contains("teléfono"));
}

#[tokio::test]
async fn quantity_update_sets_the_line_exactly() {
    let h = harness().await;
    let chat = 53;

    h.send(chat, "/agregar SKU00010 2").await.expect("reply");

    h.llm
        .push_classify(Ok(
            r#"{"intent": "update_quantity", "sku": "SKU00010", "quantity": 5, "confidence": 0.9}"#
                .to_string(),
        ))
        .await;
    let updated = h.send(chat, "mejor déjame 5 taladros").await.expect("reply");
    assert!(reply_text(&updated).contains("5 unidades"));

    let cart = h.session.get_cart(chat).await.expect("cart");
    assert_eq!(cart.get(&Sku::new("SKU00010")).expect("line").quantity, 5);

    // Removing via the slash command empties the cart again.
    let removed = h.send(chat, "/eliminar SKU00010").await.expect("reply");
    assert!(reply_text(&removed).contains("He quitado"));
    assert!(h.session.get_cart(chat).await.expect("cart").is_empty());
}

#[tokio::test]
async fn duplicate_update_is_dropped_silently() {
    let h = harness().await;
    let chat = 47;

    let first = h.send_with_id(chat, 5001, "/agregar SKU00010 2").await;
    assert!(first.is_some());
    let cart_after_first = h.session.get_cart(chat).await.expect("cart");

    let replay = h.send_with_id(chat, 5001, "/agregar SKU00010 2").await;
    assert!(replay.is_none(), "duplicate must be dropped silently");

    let cart_after_replay = h.session.get_cart(chat).await.expect("cart");
    assert_eq!(cart_after_first, cart_after_replay, "replay must not change state");
    assert_eq!(cart_after_replay.get(&Sku::new("SKU00010")).expect("line").quantity, 2);
}

#[tokio::test]
async fn llm_outage_keeps_commands_and_keyword_search_working() {
    let h = harness().await;
    let chat = 48;

    // No scripted classify results: every model call fails.
    let added = h.send(chat, "/agregar SKU00010 1").await.expect("reply");
    assert!(reply_text(&added).contains("He añadido 1"));

    let searched = h.send(chat, "busco un taladro para metal").await.expect("reply");
    let text = reply_text(&searched);
    assert!(text.contains("Taladro"), "keyword fallback must still search: {text}");
}

#[tokio::test]
async fn failed_commit_preserves_cart_and_draft_for_retry() {
    let h = harness().await;
    let chat = 49;

    h.send(chat, "/agregar SKU00010 1").await.expect("reply");
    h.send(chat, "/finalizar_compra").await.expect("reply");
    for answer in ["no", "buyer@example.com", "Jane", "Acme", "1 Main St", "555-0001"] {
        h.send(chat, answer).await.expect("reply");
    }

    h.ledger.set_fail_commits(true).await;
    let failed = h.send(chat, "sí").await.expect("reply");
    assert!(reply_text(&failed).contains("No he podido registrar tu pedido"));

    // Cart and state survive the failure; a retry succeeds.
    assert!(!h.session.get_cart(chat).await.expect("cart").is_empty());
    let state = h.session.get_checkout_state(chat).await.expect("state").expect("active");
    assert_eq!(state.0, CheckoutState::AskConfirm);

    h.ledger.set_fail_commits(false).await;
    let confirmed = h.send(chat, "sí").await.expect("reply");
    assert!(reply_text(&confirmed).contains("ORD00001"));
    assert!(h.session.get_cart(chat).await.expect("cart").is_empty());
    assert_eq!(h.invoices.enqueued().await.len(), 1);
}

#[tokio::test]
async fn start_command_greets_with_root_categories_only() {
    let h = harness().await;

    let greeting = h.send(52, "/start").await.expect("reply");
    let text = reply_text(&greeting);
    assert!(text.contains("Herramientas"));
    assert!(!text.contains("• Taladros"), "child categories stay out of the greeting");
    assert!(text.contains("/help"));
}

#[tokio::test]
async fn checkout_with_empty_cart_is_refused() {
    let h = harness().await;
    let chat = 50;

    let refused = h.send(chat, "/finalizar_compra").await.expect("reply");
    assert!(reply_text(&refused).contains("carrito está vacío"));
    assert!(h.session.get_checkout_state(chat).await.expect("state").is_none());
}

#[tokio::test]
async fn abort_at_confirmation_keeps_the_cart() {
    let h = harness().await;
    let chat = 51;

    h.send(chat, "/agregar SKU00010 1").await.expect("reply");
    h.send(chat, "/finalizar_compra").await.expect("reply");
    for answer in ["no", "buyer@example.com", "Jane", "Acme", "1 Main St", "555-0001"] {
        h.send(chat, answer).await.expect("reply");
    }

    let aborted = h.send(chat, "no").await.expect("reply");
    assert!(reply_text(&aborted).contains("carrito sigue intacto"));
    assert!(h.session.get_checkout_state(chat).await.expect("state").is_none());
    assert!(!h.session.get_cart(chat).await.expect("cart").is_empty());
    assert!(h.ledger.orders().await.is_empty());
}
