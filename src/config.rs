use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docflow ingestion service.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// SQLite connection string for the document record store.
    pub database_url: String,
    /// Base URL of the Qdrant instance that stores chunk vectors.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible embeddings API.
    pub embedding_api_url: String,
    /// API key sent to the embedding provider.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional override for the automatic chunk size selection (tokens).
    pub chunk_size: Option<usize>,
    /// Maximum attempts for transient embedding/index failures.
    pub ingest_max_attempts: usize,
    /// Base delay for exponential backoff between retry attempts.
    pub ingest_retry_base: Duration,
    /// Upper bound on a single backoff delay.
    pub ingest_retry_max: Duration,
    /// Watchdog timeout for one end-to-end ingestion run.
    pub ingest_timeout: Duration,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

const DEFAULT_EMBEDDING_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 200;
const DEFAULT_RETRY_MAX_MS: u64 = 5_000;
const DEFAULT_INGEST_TIMEOUT_SECS: u64 = 120;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: load_env("DATABASE_URL")?,
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_api_url: load_env_optional("EMBEDDING_API_URL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_API_URL.to_string()),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            chunk_size: parse_optional("CHUNK_SIZE")?,
            ingest_max_attempts: parse_optional("INGEST_MAX_ATTEMPTS")?
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            ingest_retry_base: Duration::from_millis(
                parse_optional("INGEST_RETRY_BASE_MS")?.unwrap_or(DEFAULT_RETRY_BASE_MS),
            ),
            ingest_retry_max: Duration::from_millis(
                parse_optional("INGEST_RETRY_MAX_MS")?.unwrap_or(DEFAULT_RETRY_MAX_MS),
            ),
            ingest_timeout: Duration::from_secs(
                parse_optional("INGEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_INGEST_TIMEOUT_SECS),
            ),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        embedding_api_url = %config.embedding_api_url,
        embedding_model = %config.embedding_model,
        embedding_dimension = config.embedding_dimension,
        ingest_max_attempts = config.ingest_max_attempts,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
