use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use homedir::my_home;

use crate::{
    cache::ContentCache,
    chat::{ChatService, GeminiGenerator, Generator},
    config::{Config, EmbeddingProvider, CONFIG_FILE_NAME},
    portfolio::{ContentFetcher, ContentSource, HttpSource, StaticSource},
    semantic::{Embedder, GeminiEmbedder, RelevanceScorer},
};

/// Builds the application components from configuration.
pub struct AppFactory;

impl AppFactory {
    /// Load config from `config_path`, or from the base path when unset.
    pub fn create_config(config_path: Option<&Path>) -> Result<Config> {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::get_paths()?.config_path,
        };

        Config::load_file(&path).with_context(|| format!("failed to load config {path:?}"))
    }

    pub fn create_source(config: &Config) -> Result<Arc<dyn ContentSource>> {
        let portfolio = &config.portfolio;

        if let Some(path) = &portfolio.static_file {
            log::info!("Using static portfolio file: {path:?}");
            return Ok(Arc::new(StaticSource::new(path)));
        }

        match &portfolio.url {
            Some(url) => {
                log::info!("Using portfolio url: {url}");
                let source = HttpSource::new(
                    url,
                    Duration::from_secs(portfolio.fetch_timeout_secs),
                    portfolio.fetch_attempts,
                )?;
                Ok(Arc::new(source))
            }
            None => bail!("either portfolio.url or portfolio.static_file must be set"),
        }
    }

    pub fn create_fetcher(config: &Config) -> Result<ContentFetcher> {
        let source = Self::create_source(config)?;
        Ok(ContentFetcher::new(source, &config.portfolio.owner_name))
    }

    /// `None` means keyword scoring only.
    pub fn create_embedder(
        config: &Config,
        api_key: Option<&str>,
    ) -> Result<Option<Arc<dyn Embedder>>> {
        let embedding = &config.embedding;

        match embedding.provider {
            EmbeddingProvider::None => Ok(None),
            EmbeddingProvider::Gemini => {
                let Some(api_key) = api_key else {
                    log::warn!(
                        "{} is not set, falling back to keyword scoring",
                        config.generation.api_key_env
                    );
                    return Ok(None);
                };

                let embedder = GeminiEmbedder::new(
                    &config.generation.api_base,
                    api_key.to_string(),
                    &embedding.model,
                    Duration::from_secs(embedding.timeout_secs),
                )?;
                Ok(Some(Arc::new(embedder)))
            }
            EmbeddingProvider::Local => Self::create_local_embedder(config),
        }
    }

    #[cfg(feature = "local-embeddings")]
    fn create_local_embedder(config: &Config) -> Result<Option<Arc<dyn Embedder>>> {
        let model = &config.embedding.local_model;
        log::info!("Loading local embedding model {model}");

        let embedder =
            crate::semantic::LocalEmbedder::new(model, config.base_path().to_path_buf())
                .context("failed to load local embedding model")?;
        Ok(Some(Arc::new(embedder)))
    }

    #[cfg(not(feature = "local-embeddings"))]
    fn create_local_embedder(_config: &Config) -> Result<Option<Arc<dyn Embedder>>> {
        bail!("embedding.provider is `local` but folio was built without the local-embeddings feature")
    }

    /// `None` when no API key is available; chat requests then fail with a
    /// configuration error.
    pub fn create_generator(
        config: &Config,
        api_key: Option<&str>,
    ) -> Result<Option<Arc<dyn Generator>>> {
        let generation = &config.generation;

        let Some(api_key) = api_key else {
            log::warn!(
                "{} is not set, chat requests will be rejected",
                generation.api_key_env
            );
            return Ok(None);
        };

        let generator = GeminiGenerator::new(
            &generation.api_base,
            api_key.to_string(),
            &generation.model,
            Duration::from_secs(generation.timeout_secs),
            config.generation_options(),
        )?;
        Ok(Some(Arc::new(generator)))
    }

    pub fn create_chat_service(config: &Config) -> Result<ChatService> {
        let api_key = config.api_key();

        let fetcher = Self::create_fetcher(config)?;
        let embedder = Self::create_embedder(config, api_key.as_deref())?;
        let generator = Self::create_generator(config, api_key.as_deref())?;

        let cache = ContentCache::new(fetcher, embedder.clone(), config.cache_settings());
        let scorer = RelevanceScorer::new(embedder)
            .with_keyword_boost(config.retrieval.keyword_boost)
            .with_query_timeout(Duration::from_secs(config.embedding.timeout_secs));

        Ok(ChatService::new(
            cache,
            scorer,
            generator,
            config.chat_settings(),
        ))
    }

    /// Get application paths
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;
        let config_path = base_path.join(CONFIG_FILE_NAME);

        Ok(AppPaths {
            base_path,
            config_path,
        })
    }

    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("FOLIO_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("could not determine home directory")?
            .context("home directory path is empty")?;
        Ok(home.join(".local").join("share").join("folio"))
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
    pub config_path: PathBuf,
}
