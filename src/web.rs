use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;

use crate::{
    cache::{CacheState, CacheView},
    chat::{ChatDebug, ChatError, ChatService, Turn},
    semantic::{index::is_degenerate, ScoringMode},
};

#[derive(Clone)]
struct SharedState {
    chat: Arc<ChatService>,
    include_debug: bool,
}

pub fn router(service: Arc<ChatService>, include_debug: bool) -> Router {
    let shared_state = Arc::new(SharedState {
        chat: service,
        include_debug,
    });

    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .route("/api/cache/refresh", post(refresh_cache))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::catch_panic::CatchPanicLayer::custom(catch_panic))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn start_app(
    service: ChatService,
    listen: String,
    include_debug: bool,
    warm_up: bool,
) -> anyhow::Result<()> {
    let service = Arc::new(service);

    if warm_up {
        service.cache().warm_up();
    }

    async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                log::error!("failed to install Ctrl+C handler: {err}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(err) => {
                    log::error!("failed to install signal handler: {err}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        log::warn!("shutting down");
    }

    let app = router(service, include_debug);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(
    service: ChatService,
    listen: String,
    include_debug: bool,
    warm_up: bool,
) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(service, listen, include_debug, warm_up))
}

/// Turns a handler panic into the generic internal error response.
fn catch_panic(err: Box<dyn Any + Send + 'static>) -> axum::response::Response {
    let message = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic type");

    HttpError(ChatError::Internal(anyhow::anyhow!("handler panicked: {message}"))).into_response()
}

#[derive(Debug)]
struct HttpError(ChatError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        match &self.0 {
            ChatError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": self.0.to_string()})),
            ),
            ChatError::Configuration(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": self.0.to_string()})),
                )
            }
            ChatError::Generation(err) => {
                log::error!("{self:?}");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "error": self.0.to_string(),
                        "upstream_status": err.upstream_status(),
                    })),
                )
            }
            ChatError::Internal(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal server error"})),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<ChatError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,

    #[serde(default)]
    pub history: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<ChatDebug>,
}

async fn chat(
    State(state): State<Arc<SharedState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, HttpError> {
    let Json(payload) = payload.map_err(|rejection| {
        ChatError::InvalidRequest(format!("message must be a non-empty string: {rejection}"))
    })?;

    log::debug!(
        "chat request: {} chars, {} history turns",
        payload.message.chars().count(),
        payload.history.len()
    );

    let reply = state.chat.respond(&payload.message, &payload.history).await?;

    Ok(Json(ChatResponse {
        reply: reply.reply,
        debug: state.include_debug.then_some(reply.debug),
    }))
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub cache_state: CacheState,
    pub chunks: usize,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub cache_age_secs: Option<u64>,
    pub refresh_count: u64,
}

impl CacheStatus {
    fn from_view(view: &CacheView, refresh_count: u64) -> Self {
        let snapshot = view.snapshot.as_ref();
        Self {
            cache_state: view.state,
            chunks: view.chunks().len(),
            last_refreshed: snapshot.map(|s| s.refreshed_at),
            cache_age_secs: snapshot.map(|s| s.age().as_secs()),
            refresh_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub cache: CacheStatus,
    /// Mode the current snapshot supports; keyword until usable embeddings
    /// are cached.
    pub scoring_mode: ScoringMode,
    pub embedder_configured: bool,
    pub generator_configured: bool,
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    let cache = state.chat.cache();
    let view = CacheView {
        snapshot: cache.snapshot(),
        state: cache.state(),
        waited_out: false,
    };

    let vectors_usable = match view.embeddings() {
        Some(embeddings) => {
            cache.has_embedder()
                && embeddings.len() == view.chunks().len()
                && !is_degenerate(embeddings)
        }
        None => false,
    };
    let scoring_mode = if vectors_usable {
        ScoringMode::Vector
    } else {
        ScoringMode::Keyword
    };

    Json(HealthResponse {
        status: "ok",
        cache: CacheStatus::from_view(&view, cache.refresh_count()),
        scoring_mode,
        embedder_configured: cache.has_embedder(),
        generator_configured: state.chat.has_generator(),
    })
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    #[serde(flatten)]
    pub cache: CacheStatus,
    pub wait_timed_out: bool,
}

async fn refresh_cache(State(state): State<Arc<SharedState>>) -> Json<RefreshResponse> {
    let cache = state.chat.cache();
    let view = cache.refresh_now().await;

    Json(RefreshResponse {
        cache: CacheStatus::from_view(&view, cache.refresh_count()),
        wait_timed_out: view.waited_out,
    })
}
