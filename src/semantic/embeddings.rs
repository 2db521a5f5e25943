//! Embedding providers.
//!
//! Two implementations of [`Embedder`]:
//! - `GeminiEmbedder`: remote `embedContent` calls with a per-call deadline
//! - `LocalEmbedder`: fastembed model running on the blocking pool
//!
//! Both produce 768-dimensional vectors so chunk embeddings stay comparable.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Dimensionality shared by every configured embedding provider.
pub const EMBEDDING_DIMENSIONS: usize = 768;

/// Default remote embedding model.
pub const DEFAULT_REMOTE_MODEL: &str = "text-embedding-004";

/// Default local embedding model (bge-base produces 768-dim vectors).
pub const DEFAULT_LOCAL_MODEL: &str = "bge-base-en-v1.5";

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Embedding provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed embedding response: {0}")]
    Malformed(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Capability that turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

/// Reject vectors that would break index alignment or similarity math.
pub fn validate_embedding(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::Malformed(
            "vector contains non-finite values".to_string(),
        ));
    }
    Ok(vector)
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: RequestContent<'a>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

/// Remote embedder speaking the Gemini `embedContent` API.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiEmbedder {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            timeout,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let body = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: RequestContent {
                parts: [RequestPart { text }],
            },
        };

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout(self.timeout)
                } else {
                    EmbeddingError::EmbeddingFailed(e.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: EmbedContentResponse =
            serde_json::from_str(&text).map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        parsed
            .embedding
            .map(|e| e.values)
            .filter(|values| !values.is_empty())
            .ok_or_else(|| EmbeddingError::Malformed("response has no embedding values".to_string()))
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector = tokio::time::timeout(self.timeout, self.request(text))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout))??;

        validate_embedding(vector, EMBEDDING_DIMENSIONS)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use fastembed::{InitOptions, TextEmbedding};

    use super::{validate_embedding, Embedder, EmbeddingError};

    /// Wrapper around fastembed's TextEmbedding model.
    /// Uses a Mutex because fastembed's embed() requires &mut self.
    pub struct LocalEmbedder {
        model: Arc<Mutex<TextEmbedding>>,
        model_name: String,
        dimensions: usize,
    }

    impl LocalEmbedder {
        /// Load the model, downloading it into `cache_dir/models` on first use.
        pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
            let model_enum = parse_model_name(model_name)?;

            let models_dir = cache_dir.join("models");
            std::fs::create_dir_all(&models_dir).map_err(|e| {
                EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
            })?;

            let options = InitOptions::new(model_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(false);

            let mut model = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

            let dimensions = probe_dimensions(&mut model)?;

            Ok(Self {
                model: Arc::new(Mutex::new(model)),
                model_name: model_name.to_string(),
                dimensions,
            })
        }
    }

    /// Only 768-dim models are accepted so local and remote vectors agree.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-base-en-v1.5-q" | "bgebaseenv15q" => {
                Ok(fastembed::EmbeddingModel::BGEBaseENV15Q)
            }
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: bge-base-en-v1.5 (add -q suffix for quantized)",
                name
            ))),
        }
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let model = self.model.clone();
            let text = text.to_string();

            let vector = tokio::task::spawn_blocking(move || {
                let mut model = model.lock().map_err(|e| {
                    EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
                })?;

                model
                    .embed(vec![text], None)
                    .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        EmbeddingError::EmbeddingFailed("No embedding returned".to_string())
                    })
            })
            .await
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))??;

            validate_embedding(vector, self.dimensions)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn name(&self) -> &str {
            &self.model_name
        }
    }

}
