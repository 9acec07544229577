use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use ferrobot_agent::analyzer::AiAnalyzer;
use ferrobot_agent::embeddings::EmbeddingService;
use ferrobot_agent::llm::{LlmClient, OpenAiCompatClient};
use ferrobot_core::config::{AppConfig, ConfigError, LoadOptions};
use ferrobot_db::repositories::{
    ClientDirectory, OrderLedger, ProductCatalog, SqlClientDirectory, SqlOrderLedger,
    SqlProductCatalog,
};
use ferrobot_db::session::{InMemorySessionStore, SessionStore};
use ferrobot_db::{connect_with_settings, migrations, DbPool};
use ferrobot_engine::{CartHandler, CheckoutHandler, InvoiceQueue, Orchestrator, ProductHandler};
use ferrobot_index::qdrant::QdrantVectorIndex;
use ferrobot_index::VectorIndex;
use ferrobot_telegram::{ChatTransport, TelegramApi};

use crate::dispatch::InvoiceDispatcher;
use crate::invoice::{InvoiceError, InvoiceRenderer};
use crate::mailer::{HttpApiMailer, MailSender};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub transport: Arc<TelegramApi>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("invoice renderer failed to initialize: {0}")]
    Invoice(#[from] InvoiceError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = AppConfig::load(options)?;

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let http_client = reqwest::Client::new();

    let index = QdrantVectorIndex::new(
        http_client.clone(),
        config.vector.url.clone(),
        config.vector.collection.clone(),
        config.vector.dimension,
        config.vector.api_key.clone(),
    );
    if let Err(index_error) = index.ensure_collection().await {
        // The catalog index is loaded by the batch job; an unreachable
        // vector store at boot degrades search, it does not stop the bot.
        warn!(
            event_name = "system.bootstrap.vector_unavailable",
            error = %index_error,
            "vector store not reachable at startup"
        );
    }
    let index: Arc<dyn VectorIndex> = Arc::new(index);

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatClient::new(
        http_client.clone(),
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.chat_model.clone(),
        config.llm.embed_model.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    ));
    let embeddings = Arc::new(EmbeddingService::new(llm.clone()));
    let analyzer = AiAnalyzer::new(llm.clone()).with_max_retries(config.llm.max_retries);

    let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let catalog: Arc<dyn ProductCatalog> = Arc::new(SqlProductCatalog::new(db_pool.clone()));
    let clients: Arc<dyn ClientDirectory> = Arc::new(SqlClientDirectory::new(db_pool.clone()));
    let ledger: Arc<dyn OrderLedger> = Arc::new(SqlOrderLedger::new(db_pool.clone()));

    let renderer = Arc::new(InvoiceRenderer::new()?);
    let mailer: Arc<dyn MailSender> = Arc::new(HttpApiMailer::new(
        http_client.clone(),
        config.mail.api_url.clone(),
        config.mail.api_key.clone(),
        config.mail.sender_email.clone(),
        config.mail.sender_name.clone(),
    ));
    // The dispatcher owns its own ledger handle; invoice work never
    // borrows a request's session.
    let invoice_ledger: Arc<dyn OrderLedger> = Arc::new(SqlOrderLedger::new(db_pool.clone()));
    let invoices: Arc<dyn InvoiceQueue> =
        Arc::new(InvoiceDispatcher::new(invoice_ledger, renderer, mailer).spawn());

    let products = ProductHandler::new(
        catalog.clone(),
        index,
        embeddings,
        llm.clone(),
        session.clone(),
    );
    let cart = CartHandler::new(catalog.clone(), session.clone());
    let checkout = CheckoutHandler::new(session.clone(), clients, ledger, invoices);

    let orchestrator = Arc::new(Orchestrator::new(
        session,
        catalog,
        analyzer,
        products,
        cart,
        checkout,
    ));

    let transport = Arc::new(TelegramApi::new(http_client, &config.telegram.bot_token));

    info!(event_name = "system.bootstrap.ready", "application wired");

    Ok(Application { config, db_pool, orchestrator, transport })
}

impl Application {
    pub fn transport_dyn(&self) -> Arc<dyn ChatTransport> {
        self.transport.clone()
    }
}
