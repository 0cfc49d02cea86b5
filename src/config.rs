use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
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

/// Runtime configuration for the checklist answering pipeline.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the vector search service storing embedded chunks.
    pub search_url: String,
    /// Optional API key required by the search service.
    pub search_api_key: Option<String>,
    /// Name of the search collection holding indexed documents.
    pub search_collection_name: String,
    /// Base URL of the embedding endpoint (OpenAI-compatible).
    pub embedding_url: String,
    /// Optional API key for the embedding endpoint.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of texts sent per embedding request.
    pub embedding_batch_size: Option<usize>,
    /// Base URL of the chat completion endpoint (OpenAI-compatible).
    pub chat_url: String,
    /// Optional API key for the chat endpoint.
    pub chat_api_key: Option<String>,
    /// Chat model identifier used for answering.
    pub chat_model: String,
    /// Root directory of the filesystem blob store.
    pub blob_root: String,
    /// Token budget per chunk during ingestion.
    pub chunk_max_tokens: Option<usize>,
    /// Words of overlap carried between adjacent chunks.
    pub chunk_overlap_words: Option<usize>,
    /// Number of leaves answered per sequential batch.
    pub answer_batch_size: Option<usize>,
    /// Maximum concurrent in-flight answer calls within a batch.
    pub answer_max_workers: Option<usize>,
    /// Optional cap on sibling group size; larger groups are sliced.
    pub max_group_size: Option<usize>,
    /// Number of passages retrieved per question.
    pub retrieval_top_k: Option<usize>,
    /// Optional override for the answering system prompt.
    pub system_prompt: Option<String>,
    /// Optional override for the answering user prompt.
    pub user_prompt: Option<String>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            search_url: load_env("SEARCH_URL")?,
            search_api_key: load_env_optional("SEARCH_API_KEY"),
            search_collection_name: load_env("SEARCH_COLLECTION_NAME")?,
            embedding_url: load_env("EMBEDDING_URL")?,
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?.parse().map_err(|_| {
                ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string())
            })?,
            embedding_batch_size: load_env_parsed("EMBEDDING_BATCH_SIZE")?,
            chat_url: load_env("CHAT_URL")?,
            chat_api_key: load_env_optional("CHAT_API_KEY"),
            chat_model: load_env("CHAT_MODEL")?,
            blob_root: load_env("BLOB_ROOT")?,
            chunk_max_tokens: load_env_parsed("CHUNK_MAX_TOKENS")?,
            chunk_overlap_words: load_env_parsed("CHUNK_OVERLAP_WORDS")?,
            answer_batch_size: load_env_parsed("ANSWER_BATCH_SIZE")?,
            answer_max_workers: load_env_parsed("ANSWER_MAX_WORKERS")?,
            max_group_size: load_env_parsed("MAX_GROUP_SIZE")?,
            retrieval_top_k: load_env_parsed("RETRIEVAL_TOP_K")?,
            system_prompt: load_env_optional("SYSTEM_PROMPT"),
            user_prompt: load_env_optional("USER_PROMPT"),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
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
        search_url = %config.search_url,
        collection = %config.search_collection_name,
        embedding_model = %config.embedding_model,
        chat_model = %config.chat_model,
        blob_root = %config.blob_root,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
