use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub vector: VectorConfig,
    pub llm: LlmConfig,
    pub telegram: TelegramConfig,
    pub mail: MailConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct VectorConfig {
    pub url: String,
    pub collection: String,
    pub dimension: usize,
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub chat_model: String,
    pub embed_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub webhook_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub sender_email: String,
    pub sender_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub vector_url: Option<String>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://ferrobot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            vector: VectorConfig {
                url: "http://localhost:6333".to_string(),
                collection: "products".to_string(),
                dimension: 1536,
                api_key: None,
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                chat_model: "gpt-4o-mini".to_string(),
                embed_model: "text-embedding-3-small".to_string(),
                timeout_secs: 10,
                max_retries: 1,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                webhook_secret: String::new().into(),
            },
            mail: MailConfig {
                api_url: "https://api.mailprovider.example/v1/send".to_string(),
                api_key: None,
                sender_email: "pedidos@example.com".to_string(),
                sender_name: "Ventas".to_string(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8080,
                request_timeout_secs: 30,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string() },
        }
    }
}

impl AppConfig {
    /// Precedence: defaults < config file < `FERROBOT_*` environment <
    /// programmatic overrides, then validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("ferrobot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(vector) = patch.vector {
            if let Some(url) = vector.url {
                self.vector.url = url;
            }
            if let Some(collection) = vector.collection {
                self.vector.collection = collection;
            }
            if let Some(dimension) = vector.dimension {
                self.vector.dimension = dimension;
            }
            if let Some(api_key) = vector.api_key {
                self.vector.api_key = Some(api_key.into());
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(chat_model) = llm.chat_model {
                self.llm.chat_model = chat_model;
            }
            if let Some(embed_model) = llm.embed_model {
                self.llm.embed_model = embed_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(bot_token) = telegram.bot_token {
                self.telegram.bot_token = bot_token.into();
            }
            if let Some(webhook_secret) = telegram.webhook_secret {
                self.telegram.webhook_secret = webhook_secret.into();
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(api_url) = mail.api_url {
                self.mail.api_url = api_url;
            }
            if let Some(api_key) = mail.api_key {
                self.mail.api_key = Some(api_key.into());
            }
            if let Some(sender_email) = mail.sender_email {
                self.mail.sender_email = sender_email;
            }
            if let Some(sender_name) = mail.sender_name {
                self.mail.sender_name = sender_name;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(request_timeout_secs) = server.request_timeout_secs {
                self.server.request_timeout_secs = request_timeout_secs;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FERROBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FERROBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("FERROBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FERROBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FERROBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FERROBOT_VECTOR_URL") {
            self.vector.url = value;
        }
        if let Some(value) = read_env("FERROBOT_VECTOR_COLLECTION") {
            self.vector.collection = value;
        }
        if let Some(value) = read_env("FERROBOT_VECTOR_API_KEY") {
            self.vector.api_key = Some(value.into());
        }

        if let Some(value) = read_env("FERROBOT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("FERROBOT_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("FERROBOT_LLM_CHAT_MODEL") {
            self.llm.chat_model = value;
        }
        if let Some(value) = read_env("FERROBOT_LLM_EMBED_MODEL") {
            self.llm.embed_model = value;
        }
        if let Some(value) = read_env("FERROBOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("FERROBOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FERROBOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("FERROBOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("FERROBOT_BOT_TOKEN") {
            self.telegram.bot_token = value.into();
        }
        if let Some(value) = read_env("FERROBOT_WEBHOOK_SECRET") {
            self.telegram.webhook_secret = value.into();
        }

        if let Some(value) = read_env("FERROBOT_MAIL_API_URL") {
            self.mail.api_url = value;
        }
        if let Some(value) = read_env("FERROBOT_MAIL_API_KEY") {
            self.mail.api_key = Some(value.into());
        }
        if let Some(value) = read_env("FERROBOT_MAIL_SENDER_EMAIL") {
            self.mail.sender_email = value;
        }
        if let Some(value) = read_env("FERROBOT_MAIL_SENDER_NAME") {
            self.mail.sender_name = value;
        }

        if let Some(value) = read_env("FERROBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FERROBOT_SERVER_PORT") {
            self.server.port = parse_u16("FERROBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FERROBOT_SERVER_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs =
                parse_u64("FERROBOT_SERVER_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("FERROBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FERROBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("FERROBOT_LOG_LEVEL") {
            self.logging.level = value;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(vector_url) = overrides.vector_url {
            self.vector.url = vector_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.telegram.bot_token = bot_token.into();
        }
        if let Some(webhook_secret) = overrides.webhook_secret {
            self.telegram.webhook_secret = webhook_secret.into();
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(llm_api_key.into());
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_vector(&self.vector)?;
        validate_llm(&self.llm)?;
        validate_telegram(&self.telegram)?;
        validate_mail(&self.mail)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ferrobot.toml"), PathBuf::from("config/ferrobot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_vector(vector: &VectorConfig) -> Result<(), ConfigError> {
    if !vector.url.starts_with("http://") && !vector.url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "vector.url must start with http:// or https://".to_string(),
        ));
    }
    if vector.collection.trim().is_empty() {
        return Err(ConfigError::Validation("vector.collection must not be empty".to_string()));
    }
    if vector.dimension == 0 {
        return Err(ConfigError::Validation(
            "vector.dimension must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let is_local = llm.base_url.starts_with("http://localhost")
        || llm.base_url.starts_with("http://127.0.0.1");
    let missing_key = llm
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_key && !is_local {
        return Err(ConfigError::Validation(
            "llm.api_key is required for a remote llm.base_url (set FERROBOT_LLM_API_KEY)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    if telegram.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required (set FERROBOT_BOT_TOKEN from @BotFather)".to_string(),
        ));
    }
    if telegram.webhook_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.webhook_secret is required (set FERROBOT_WEBHOOK_SECRET)".to_string(),
        ));
    }
    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if !mail.api_url.starts_with("http://") && !mail.api_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "mail.api_url must start with http:// or https://".to_string(),
        ));
    }
    if mail.sender_email.trim().is_empty() || !mail.sender_email.contains('@') {
        return Err(ConfigError::Validation(
            "mail.sender_email must be a valid address".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if server.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "server.request_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    vector: Option<VectorPatch>,
    llm: Option<LlmPatch>,
    telegram: Option<TelegramPatch>,
    mail: Option<MailPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct VectorPatch {
    url: Option<String>,
    collection: Option<String>,
    dimension: Option<usize>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    chat_model: Option<String>,
    embed_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    api_url: Option<String>,
    api_key: Option<String>,
    sender_email: Option<String>,
    sender_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    request_timeout_secs: Option<u64>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
}
