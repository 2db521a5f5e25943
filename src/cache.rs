//! In-memory portfolio cache with single-flight refresh.
//!
//! The cache holds one immutable `CacheSnapshot` behind an `Arc`. A refresh
//! (fetch, chunk, embed) builds a complete new snapshot and swaps it in one
//! step, so readers never see content and chunks from different cycles.
//!
//! At most one refresh runs at a time. The first caller that finds the cache
//! empty or stale spawns the refresh task and publishes a shared future; every
//! other caller awaits that same future, bounded by `refresh_wait`. A caller
//! that gives up does not cancel the task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use crate::portfolio::{Chunk, ChunkerConfig, ContentFetcher, PortfolioContent};
use crate::semantic::Embedder;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_REFRESH_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_EMBED_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    /// Longest a caller waits for an in-flight refresh.
    pub refresh_wait: Duration,
    /// Pause between consecutive embedding calls, for provider rate limits.
    pub embed_delay: Duration,
    pub embed_timeout: Duration,
    pub chunker: ChunkerConfig,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            refresh_wait: DEFAULT_REFRESH_WAIT,
            embed_delay: DEFAULT_EMBED_DELAY,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            chunker: ChunkerConfig::default(),
        }
    }
}

/// One complete refresh result.
#[derive(Debug)]
pub struct CacheSnapshot {
    pub content: Arc<PortfolioContent>,
    pub chunks: Vec<Chunk>,
    /// Index-aligned with `chunks`; `None` when no embedder is configured.
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub embedding_failures: usize,
    pub last_updated: Instant,
    pub refreshed_at: DateTime<Utc>,
}

impl CacheSnapshot {
    pub fn is_fresh_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_updated) < ttl
    }

    pub fn age(&self) -> Duration {
        self.last_updated.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Refreshing,
    Ready,
}

/// What a caller got back from the cache.
#[derive(Debug, Clone)]
pub struct CacheView {
    pub snapshot: Option<Arc<CacheSnapshot>>,
    pub state: CacheState,
    /// The caller stopped waiting for an in-flight refresh.
    pub waited_out: bool,
}

impl CacheView {
    pub fn chunks(&self) -> &[Chunk] {
        self.snapshot
            .as_ref()
            .map(|s| s.chunks.as_slice())
            .unwrap_or(&[])
    }

    pub fn embeddings(&self) -> Option<&[Vec<f32>]> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.embeddings.as_deref())
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Option<Arc<CacheSnapshot>>>>;

enum Pending {
    Fresh(Arc<CacheSnapshot>),
    InFlight(RefreshFuture),
}

struct CacheInner {
    fetcher: ContentFetcher,
    embedder: Option<Arc<dyn Embedder>>,
    settings: CacheSettings,
    current: RwLock<Option<Arc<CacheSnapshot>>>,
    inflight: Mutex<Option<RefreshFuture>>,
    refreshes: AtomicU64,
}

/// Clears the in-flight slot when the refresh task ends, panics included.
struct InflightReset<'a>(&'a CacheInner);

impl Drop for InflightReset<'_> {
    fn drop(&mut self) {
        *self
            .0
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[derive(Clone)]
pub struct ContentCache {
    inner: Arc<CacheInner>,
}

impl ContentCache {
    pub fn new(
        fetcher: ContentFetcher,
        embedder: Option<Arc<dyn Embedder>>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                embedder,
                settings,
                current: RwLock::new(None),
                inflight: Mutex::new(None),
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    pub fn has_embedder(&self) -> bool {
        self.inner.embedder.is_some()
    }

    /// Current snapshot without triggering any work.
    pub fn snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        self.inner.snapshot()
    }

    pub fn state(&self) -> CacheState {
        let refreshing = self
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();

        if refreshing {
            CacheState::Refreshing
        } else if self.snapshot().is_some() {
            CacheState::Ready
        } else {
            CacheState::Empty
        }
    }

    /// Number of refresh cycles started so far.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    pub async fn get_or_refresh(&self) -> CacheView {
        self.get_or_refresh_at(Instant::now()).await
    }

    /// Like `get_or_refresh`, judging freshness at `now`.
    pub async fn get_or_refresh_at(&self, now: Instant) -> CacheView {
        if let Some(snapshot) = self.snapshot() {
            if snapshot.is_fresh_at(now, self.inner.settings.ttl) {
                return CacheView {
                    snapshot: Some(snapshot),
                    state: CacheState::Ready,
                    waited_out: false,
                };
            }
        }

        match self.join_or_start(Some(now)) {
            Pending::Fresh(snapshot) => CacheView {
                snapshot: Some(snapshot),
                state: CacheState::Ready,
                waited_out: false,
            },
            Pending::InFlight(refresh) => self.wait_for(refresh).await,
        }
    }

    /// Refresh regardless of TTL, joining a refresh that is already running.
    pub async fn refresh_now(&self) -> CacheView {
        match self.join_or_start(None) {
            Pending::Fresh(snapshot) => CacheView {
                snapshot: Some(snapshot),
                state: CacheState::Ready,
                waited_out: false,
            },
            Pending::InFlight(refresh) => self.wait_for(refresh).await,
        }
    }

    /// Start a background refresh if none is running. Must be called from
    /// within a tokio runtime.
    pub fn warm_up(&self) {
        if let Pending::InFlight(_) = self.join_or_start(None) {
            log::info!("cache warm-up started");
        }
    }

    /// Join the in-flight refresh or start one. With `now` set, a snapshot
    /// that is fresh at that instant is returned instead.
    fn join_or_start(&self, now: Option<Instant>) -> Pending {
        let mut inflight = self
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(refresh) = inflight.as_ref() {
            log::debug!("joining in-flight cache refresh");
            return Pending::InFlight(refresh.clone());
        }

        // a refresh may have finished between the caller's check and the lock
        if let (Some(now), Some(snapshot)) = (now, self.snapshot()) {
            if snapshot.is_fresh_at(now, self.inner.settings.ttl) {
                return Pending::Fresh(snapshot);
            }
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.refresh().await });

        let refresh: RefreshFuture = async move {
            match handle.await {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    log::error!("cache refresh task failed: {err}");
                    None
                }
            }
        }
        .boxed()
        .shared();

        *inflight = Some(refresh.clone());
        Pending::InFlight(refresh)
    }

    async fn wait_for(&self, refresh: RefreshFuture) -> CacheView {
        let wait = self.inner.settings.refresh_wait;

        match tokio::time::timeout(wait, refresh).await {
            Ok(Some(snapshot)) => CacheView {
                snapshot: Some(snapshot),
                state: CacheState::Ready,
                waited_out: false,
            },
            Ok(None) => CacheView {
                snapshot: self.snapshot(),
                state: self.state(),
                waited_out: false,
            },
            Err(_) => {
                log::warn!("gave up waiting for cache refresh after {wait:?}, using current data");
                CacheView {
                    snapshot: self.snapshot(),
                    state: self.state(),
                    waited_out: true,
                }
            }
        }
    }
}

impl CacheInner {
    fn snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn refresh(self: Arc<Self>) -> Arc<CacheSnapshot> {
        let _reset = InflightReset(&self);
        let started = Instant::now();
        let cycle = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;

        log::info!("cache refresh #{cycle} started");

        let content = self.fetcher.fetch_content().await;
        let chunks = self.settings.chunker.chunk(&content);

        let (embeddings, embedding_failures) = match &self.embedder {
            Some(embedder) => {
                let (embeddings, failures) = self.embed_chunks(embedder.as_ref(), &chunks).await;
                (Some(embeddings), failures)
            }
            None => (None, 0),
        };

        let snapshot = Arc::new(CacheSnapshot {
            content: Arc::new(content),
            chunks,
            embeddings,
            embedding_failures,
            last_updated: Instant::now(),
            refreshed_at: Utc::now(),
        });

        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));

        log::info!(
            "cache refresh #{cycle} done: origin={:?} chunks={} embedding_failures={} took={:?}",
            snapshot.content.origin,
            snapshot.chunks.len(),
            snapshot.embedding_failures,
            started.elapsed()
        );

        snapshot
    }

    /// Embed chunks one at a time. A failed chunk gets a zero vector so the
    /// result always has exactly one entry per chunk.
    async fn embed_chunks(&self, embedder: &dyn Embedder, chunks: &[Chunk]) -> (Vec<Vec<f32>>, usize) {
        let dimensions = embedder.dimensions();
        let timeout = self.settings.embed_timeout;

        let mut embeddings = Vec::with_capacity(chunks.len());
        let mut failures = 0;

        for (idx, chunk) in chunks.iter().enumerate() {
            if idx > 0 && !self.settings.embed_delay.is_zero() {
                tokio::time::sleep(self.settings.embed_delay).await;
            }

            let result = tokio::time::timeout(timeout, embedder.embed(&chunk.content)).await;
            let vector = match result {
                Ok(Ok(vector)) if vector.len() == dimensions => vector,
                Ok(Ok(vector)) => {
                    log::warn!(
                        "chunk {idx}: embedding has {} dimensions, expected {dimensions}",
                        vector.len()
                    );
                    failures += 1;
                    vec![0.0; dimensions]
                }
                Ok(Err(err)) => {
                    log::warn!("chunk {idx}: embedding failed: {err}");
                    failures += 1;
                    vec![0.0; dimensions]
                }
                Err(_) => {
                    log::warn!("chunk {idx}: embedding timed out after {timeout:?}");
                    failures += 1;
                    vec![0.0; dimensions]
                }
            };

            embeddings.push(vector);
        }

        (embeddings, failures)
    }
}
