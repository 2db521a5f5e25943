//! In-process fakes for the content source and both providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheSettings, ContentCache};
use crate::chat::{ChatService, ChatSettings, GenerationError, Generator, Turn};
use crate::portfolio::{ContentFetcher, ContentSource, FetchError};
use crate::semantic::{Embedder, EmbeddingError, RelevanceScorer};

pub const PORTFOLIO_PAGE: &str = r#"
<html>
  <body>
    <section id="about">
      Ada Lovelace is a data scientist who enjoys turning messy datasets into
      clear stories and reliable machine learning systems.
    </section>
    <section id="skills">
      Python, Machine Learning, Data Analysis, SQL, Pandas, scikit-learn,
      TensorFlow and dashboard tooling for business reporting.
    </section>
    <section id="projects">
      Built a project forecasting energy demand, a project classifying support
      tickets and a project visualising public transport delays.
    </section>
    <section id="education">
      Bachelor degree in Computer Science from Cairo University, graduated with
      honours and a thesis on time series forecasting.
    </section>
    <section id="contact">
      Reach out by email at ada@example.com or through the form on this page,
      based in Cairo, Egypt and open to remote roles.
    </section>
  </body>
</html>
"#;

/// Source that counts fetches and optionally sleeps first.
pub struct CountingSource {
    markup: Option<String>,
    delay: Duration,
    panics: bool,
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn new(markup: &str) -> Self {
        Self {
            markup: Some(markup.to_string()),
            delay: Duration::ZERO,
            panics: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            markup: None,
            ..Self::new("")
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::new("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for CountingSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics {
            panic!("source exploded");
        }

        self.markup
            .clone()
            .ok_or_else(|| FetchError::Request("connection refused".to_string()))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

pub const FAKE_DIMENSIONS: usize = 5;
const FAKE_KEYWORDS: [&str; 4] = ["python", "cairo", "degree", "project"];

/// Embeds text as keyword counts plus a constant component, so no vector is
/// ever all zeros unless the call failed.
pub struct FakeEmbedder {
    fail_on: Vec<String>,
    fail_queries: bool,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            fail_on: vec![],
            fail_queries: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail for every text containing `needle` (case-insensitive).
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: vec![needle.to_lowercase()],
            ..Self::new()
        }
    }

    /// Fail every call.
    pub fn broken() -> Self {
        Self::failing_on("")
    }

    /// Succeed for chunks, fail for texts that look like questions.
    pub fn failing_queries() -> Self {
        Self {
            fail_queries: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = text.to_lowercase();

        if self.fail_on.iter().any(|needle| text.contains(needle.as_str()))
            || (self.fail_queries && text.ends_with('?'))
        {
            return Err(EmbeddingError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let mut vector: Vec<f32> = FAKE_KEYWORDS
            .iter()
            .map(|keyword| text.matches(keyword).count() as f32)
            .collect();
        vector.push(0.1);
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        FAKE_DIMENSIONS
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Generator that records its inputs.
pub struct FakeGenerator {
    status: Option<u16>,
    panics: bool,
    calls: Mutex<Vec<(String, Vec<Turn>)>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            status: None,
            panics: false,
            calls: Mutex::new(vec![]),
        }
    }

    /// Panic on every call.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::new()
        }
    }

    /// Fail every call with the given upstream status.
    pub fn failing(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<Turn>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), turns.to_vec()));

        if self.panics {
            panic!("generator bug with secret detail");
        }

        match self.status {
            Some(status) => Err(GenerationError::Status {
                status,
                body: "upstream error".to_string(),
            }),
            None => Ok(format!("answer to: {}", turns.last().map(|t| t.text.as_str()).unwrap_or(""))),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Settings without inter-call delays.
pub fn fast_settings() -> CacheSettings {
    CacheSettings {
        embed_delay: Duration::ZERO,
        ..CacheSettings::default()
    }
}

pub fn cache_with(
    source: Arc<CountingSource>,
    embedder: Option<Arc<FakeEmbedder>>,
    settings: CacheSettings,
) -> ContentCache {
    let fetcher = ContentFetcher::new(source, "Ada");
    ContentCache::new(
        fetcher,
        embedder.map(|e| e as Arc<dyn Embedder>),
        settings,
    )
}

pub fn service_with(
    source: Arc<CountingSource>,
    embedder: Option<Arc<FakeEmbedder>>,
    generator: Option<Arc<FakeGenerator>>,
) -> ChatService {
    let embedder = embedder.map(|e| e as Arc<dyn Embedder>);
    let cache = ContentCache::new(
        ContentFetcher::new(source, "Ada"),
        embedder.clone(),
        fast_settings(),
    );

    ChatService::new(
        cache,
        RelevanceScorer::new(embedder),
        generator.map(|g| g as Arc<dyn Generator>),
        ChatSettings {
            owner_name: "Ada".to_string(),
            ..ChatSettings::default()
        },
    )
}
