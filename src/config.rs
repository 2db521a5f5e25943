use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;
use crate::chat::generation::{DEFAULT_API_BASE, DEFAULT_GENERATION_MODEL};
use crate::chat::{ChatSettings, GenerationOptions};
use crate::portfolio::ChunkerConfig;
use crate::semantic::embeddings::{DEFAULT_LOCAL_MODEL, DEFAULT_REMOTE_MODEL};

pub(crate) const CONFIG_FILE_NAME: &str = "config.yaml";
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_OWNER_NAME: &str = "the portfolio owner";
const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// Portfolio page to fetch.
    #[serde(default)]
    pub url: Option<String>,

    /// Local markup file used instead of `url`.
    #[serde(default)]
    pub static_file: Option<PathBuf>,

    /// Name used in prompts and fallback content.
    #[serde(default = "default_owner_name")]
    pub owner_name: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            url: None,
            static_file: None,
            owner_name: default_owner_name(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_attempts: default_fetch_attempts(),
        }
    }
}

fn default_owner_name() -> String {
    DEFAULT_OWNER_NAME.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_fetch_attempts() -> u32 {
    3
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_refresh_wait_secs")]
    pub refresh_wait_secs: u64,

    #[serde(default = "default_embed_delay_ms")]
    pub embed_delay_ms: u64,

    /// Start a refresh when the server boots.
    #[serde(default = "default_true")]
    pub warm_up: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            refresh_wait_secs: default_refresh_wait_secs(),
            embed_delay_ms: default_embed_delay_ms(),
            warm_up: true,
        }
    }
}

fn default_ttl_secs() -> u64 {
    60 * 60
}

fn default_refresh_wait_secs() -> u64 {
    30
}

fn default_embed_delay_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Keyword scoring only.
    None,
    Gemini,
    Local,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_remote_model")]
    pub model: String,

    #[serde(default = "default_local_model")]
    pub local_model: String,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_remote_model(),
            local_model: default_local_model(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Gemini
}

fn default_remote_model() -> String {
    DEFAULT_REMOTE_MODEL.to_string()
}

fn default_local_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    15
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_generation_timeout_secs(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_generation_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    GenerationOptions::default().temperature
}

fn default_max_output_tokens() -> u32 {
    GenerationOptions::default().max_output_tokens
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_keyword_boost")]
    pub keyword_boost: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            keyword_boost: default_keyword_boost(),
        }
    }
}

fn default_top_k() -> usize {
    crate::chat::orchestrator::DEFAULT_TOP_K
}

fn default_keyword_boost() -> f32 {
    crate::semantic::lexical::DEFAULT_KEYWORD_BOOST
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Include retrieval diagnostics in chat responses.
    #[serde(default = "default_true")]
    pub include_debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_message_chars: default_max_message_chars(),
            max_history_turns: default_max_history_turns(),
            include_debug: true,
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_max_message_chars() -> usize {
    crate::chat::orchestrator::DEFAULT_MAX_MESSAGE_CHARS
}

fn default_max_history_turns() -> usize {
    crate::chat::orchestrator::DEFAULT_MAX_HISTORY_TURNS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub chunking: ChunkerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    path: PathBuf,
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunking.chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunking.overlap >= chunking.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunking.overlap, chunking.chunk_size
            )));
        }
        if chunking.max_chunks == 0 {
            return Err(ConfigError::Invalid(
                "chunking.max_chunks must be greater than 0".to_string(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }
        if !(1.0..=3.0).contains(&self.retrieval.keyword_boost) {
            return Err(ConfigError::Invalid(format!(
                "retrieval.keyword_boost must be between 1.0 and 3.0, got {}",
                self.retrieval.keyword_boost
            )));
        }

        if let Some(url) = &self.portfolio.url {
            url::Url::parse(url).map_err(|err| {
                ConfigError::Invalid(format!("portfolio.url {url:?} is invalid: {err}"))
            })?;
        }

        if self.generation.timeout_secs == 0 || self.embedding.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "provider timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults when it does not
    /// exist yet.
    pub fn load_with(base_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_file(base_path.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn load_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        let io_err = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };

        // create new if does not exist
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            std::fs::write(&path, serde_yml::to_string(&Self::default())?).map_err(io_err)?;
        }

        let config_str = std::fs::read_to_string(&path).map_err(io_err)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.path = path.clone();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&self.path, config_str).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Directory holding the config file; model caches live next to it.
    pub fn base_path(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// API key for the Gemini endpoints, read from the environment.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.generation.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            refresh_wait: Duration::from_secs(self.cache.refresh_wait_secs),
            embed_delay: Duration::from_millis(self.cache.embed_delay_ms),
            embed_timeout: Duration::from_secs(self.embedding.timeout_secs),
            chunker: self.chunking,
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            owner_name: self.portfolio.owner_name.clone(),
            top_k: self.retrieval.top_k,
            max_message_chars: self.server.max_message_chars,
            max_history_turns: self.server.max_history_turns,
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.generation.temperature,
            max_output_tokens: self.generation.max_output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE_NAME).exists());
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.chunking.max_chunks, 30);
        assert_eq!(config.embedding.provider, EmbeddingProvider::Gemini);
        assert_eq!(config.base_path(), tmp.path());
    }

    #[test]
    fn test_partial_file_gets_defaults_and_is_resaved() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "portfolio:\n  owner_name: Ada\n").unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.portfolio.owner_name, "Ada");
        assert_eq!(config.server.listen, DEFAULT_LISTEN);

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("max_history_turns"));
    }

    #[test]
    fn test_load_explicit_file_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("folio.yaml");

        let config = Config::load_file(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.base_path(), tmp.path().join("nested"));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "chunking:\n  chunk_size: 100\n  overlap: 100\n",
        )
        .unwrap();

        let result = Config::load_with(tmp.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "portfolio:\n  url: not a url\n",
        )
        .unwrap();

        assert!(matches!(
            Config::load_with(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "cache: [1, 2").unwrap();

        assert!(matches!(
            Config::load_with(tmp.path()),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn test_api_key_from_named_env_var() {
        let mut config = Config::default();
        config.generation.api_key_env = "FOLIO_TEST_API_KEY_UNIQUE".to_string();

        std::env::remove_var("FOLIO_TEST_API_KEY_UNIQUE");
        assert!(config.api_key().is_none());

        std::env::set_var("FOLIO_TEST_API_KEY_UNIQUE", "  secret ");
        assert_eq!(config.api_key().as_deref(), Some("secret"));
        std::env::remove_var("FOLIO_TEST_API_KEY_UNIQUE");
    }

    #[test]
    fn test_cache_settings_mapping() {
        let config = Config::default();
        let settings = config.cache_settings();
        assert_eq!(settings.ttl, Duration::from_secs(3600));
        assert_eq!(settings.embed_delay, Duration::from_millis(200));
        assert_eq!(settings.refresh_wait, Duration::from_secs(30));
    }
}
