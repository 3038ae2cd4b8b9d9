use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::RetryPolicy;

pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "costbook_data";
pub const DEFAULT_INPUT_PATH: &str = "data/unit_costs1_structured.json";
pub const DEFAULT_BATCH_SIZE: usize = 500;
/// Qdrant rejects request bodies above 32 MiB; batches stay at 75% of that.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 24 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Values taken from the environment or command line, layered over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub openai_api_key: Option<String>,
    pub embedding_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub qdrant_url: Option<String>,
    pub collection: Option<String>,
    pub input: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("costbook-ingest").join("config.toml"))
    }

    /// Load the TOML file at `path`, or the default location when `path` is `None`.
    ///
    /// A missing default file yields the built-in defaults; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => match Self::config_path() {
                Some(default) if default.exists() => default,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Build the run configuration once: file, then overrides, then validation.
    pub fn resolve(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(key) = overrides.openai_api_key {
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = overrides.embedding_url {
            self.embedding.url = url;
        }
        if let Some(key) = overrides.qdrant_api_key {
            self.vector_store.api_key = Some(key);
        }
        if let Some(url) = overrides.qdrant_url {
            self.vector_store.url = url;
        }
        if let Some(collection) = overrides.collection {
            self.vector_store.collection = collection;
        }
        if let Some(input) = overrides.input {
            self.ingest.input = input;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.ingest.batch_size = batch_size;
        }
        if let Some(secs) = overrides.timeout_secs {
            self.embedding.timeout_secs = secs;
            self.vector_store.timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if is_blank(self.embedding.api_key.as_deref()) {
            return invalid("embedding API key is not set (OPENAI_API_KEY)");
        }
        if is_blank(self.vector_store.api_key.as_deref()) {
            return invalid("vector store API key is not set (QDRANT_API_KEY)");
        }
        if self.vector_store.url.trim().is_empty() {
            return invalid("vector store URL is empty (QDRANT_URL)");
        }
        if self.vector_store.collection.trim().is_empty() {
            return invalid("collection name is empty");
        }
        if self.embedding.dimension == 0 {
            return invalid("embedding dimension must be positive");
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding batch size must be positive");
        }
        if self.ingest.batch_size == 0 {
            return invalid("batch size must be positive");
        }
        if self.ingest.max_batch_bytes == 0 {
            return invalid("batch byte ceiling must be positive");
        }
        if self.embedding.timeout_secs == 0 || self.vector_store.timeout_secs == 0 {
            return invalid("request timeout must be positive");
        }
        self.retry.validate().map_err(ConfigError::ValidationError)?;
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Prompts sent per embedding request.
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_embedding_batch_size() -> usize {
    100
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            timeout_secs: default_timeout(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl VectorStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            timeout_secs: default_timeout(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_input")]
    pub input: PathBuf,

    /// Maximum points per upsert call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum estimated serialized size of one upsert call.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
}

fn default_input() -> PathBuf {
    PathBuf::from(DEFAULT_INPUT_PATH)
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_batch_bytes() -> usize {
    DEFAULT_MAX_BATCH_BYTES
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            batch_size: default_batch_size(),
            max_batch_bytes: default_max_batch_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_keys() -> ConfigOverrides {
        ConfigOverrides {
            openai_api_key: Some("sk-test".to_string()),
            qdrant_api_key: Some("qd-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.vector_store.collection, DEFAULT_COLLECTION);
        assert_eq!(config.ingest.batch_size, 500);
        assert_eq!(config.vector_store.timeout(), Duration::from_secs(60));
        assert!(config.ingest.max_batch_bytes < 32 * 1024 * 1024);
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.is_some());
    }

    #[test]
    fn test_missing_credentials_fail_validation() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("OPENAI_API_KEY")
        ));

        let mut config = Config::default();
        config.apply(ConfigOverrides {
            openai_api_key: Some("sk-test".to_string()),
            qdrant_api_key: Some("   ".to_string()),
            ..Default::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("QDRANT_API_KEY")
        ));
    }

    #[test]
    fn test_overrides_take_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[ingest]\nbatch_size = 250\ninput = \"from-file.json\"\n\n[vector_store]\ncollection = \"file_collection\"\n",
        )
        .unwrap();

        let config = Config::resolve(
            Some(&path),
            ConfigOverrides {
                input: Some(PathBuf::from("from-env.json")),
                timeout_secs: Some(15),
                ..with_keys()
            },
        )
        .unwrap();

        assert_eq!(config.ingest.batch_size, 250);
        assert_eq!(config.ingest.input, PathBuf::from("from-env.json"));
        assert_eq!(config.vector_store.collection, "file_collection");
        assert_eq!(config.embedding.timeout_secs, 15);
        assert_eq!(config.vector_store.timeout_secs, 15);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = Config::resolve(
            None,
            ConfigOverrides {
                batch_size: Some(0),
                ..with_keys()
            },
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_retry_section_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[retry]\nmultiplier = -2.0\n").unwrap();
        let result = Config::resolve(Some(&path), with_keys());
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError(msg)) if msg.contains("multiplier")
        ));

        std::fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();
        let result = Config::resolve(Some(&path), with_keys());
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError(msg)) if msg.contains("max_attempts")
        ));

        std::fs::write(&path, "[retry]\nmax_attempts = 3\nmultiplier = 1.5\n").unwrap();
        let config = Config::resolve(Some(&path), with_keys()).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
