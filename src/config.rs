//! Command-line interface and run configuration.

use clap::{ArgAction, Parser};

use crate::error::ConfigError;

/// Configuration for one indexing run. Required values abort at parse time,
/// before any index or record work begins.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "artindex",
    about = "Enrich gallery catalog records with image embeddings and load them into a vector search index"
)]
pub struct Cli {
    /// Postgres connection string for the open data catalog
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Base endpoint of the image vectorize service
    #[arg(long, env = "ARTINDEX_VISION_ENDPOINT")]
    pub vision_endpoint: String,

    /// API key for the image vectorize service
    #[arg(long, env = "ARTINDEX_VISION_KEY")]
    pub vision_key: String,

    /// Base endpoint of the search index service
    #[arg(long, env = "ARTINDEX_SEARCH_ENDPOINT")]
    pub search_endpoint: String,

    /// API key for the search index service
    #[arg(long, env = "ARTINDEX_SEARCH_KEY")]
    pub search_key: String,

    /// Name of the target index
    #[arg(long, env = "ARTINDEX_INDEX_NAME", default_value = "gallerydata")]
    pub index_name: String,

    /// Drop and recreate the index when it already exists
    #[arg(
        long,
        env = "ARTINDEX_RECREATE_INDEX",
        action = ArgAction::Set,
        default_value_t = true
    )]
    pub recreate_index: bool,

    /// Records per bulk upsert chunk
    #[arg(long, env = "ARTINDEX_CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Vector width produced by the vision model
    #[arg(long, env = "ARTINDEX_VECTOR_DIMENSIONS", default_value_t = 1024)]
    pub vector_dimensions: usize,

    /// Max seconds to wait for each vectorize request
    #[arg(long, env = "ARTINDEX_VISION_TIMEOUT_SECS", default_value_t = 30)]
    pub vision_timeout_secs: u64,

    /// Total attempts per vectorize call before the record is skipped
    #[arg(long, env = "ARTINDEX_MAX_ATTEMPTS", default_value_t = 6)]
    pub max_attempts: usize,

    /// Base seconds for exponential vectorize retry backoff
    #[arg(long, env = "ARTINDEX_RETRY_BASE_SECS", default_value_t = 2)]
    pub retry_base_secs: u64,

    /// Max seconds to wait for each index store request
    #[arg(long, env = "ARTINDEX_SEARCH_TIMEOUT_SECS", default_value_t = 60)]
    pub search_timeout_secs: u64,
}

impl Cli {
    /// Semantic validation beyond clap's required/parse checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, endpoint) in [
            ("vision endpoint", &self.vision_endpoint),
            ("search endpoint", &self.search_endpoint),
        ] {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "{label} must be an http(s) URL, got '{endpoint}'"
                )));
            }
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max attempts must be at least 1".into(),
            ));
        }
        if self.vector_dimensions == 0 {
            return Err(ConfigError::Invalid(
                "vector dimensions must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
