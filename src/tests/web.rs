use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::tests::support::{
    service_with, CountingSource, FakeEmbedder, FakeGenerator, PORTFOLIO_PAGE,
};
use crate::web::router;

async fn json_response(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&body).unwrap();
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn app_with(
    source: Arc<CountingSource>,
    generator: Option<Arc<FakeGenerator>>,
    include_debug: bool,
) -> axum::Router {
    router(Arc::new(service_with(source, None, generator)), include_debug)
}

#[tokio::test]
async fn test_chat_returns_reply_and_debug() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let app = app_with(source, Some(Arc::new(FakeGenerator::new())), true);

    let req = post_json(
        "/api/chat",
        json!({
            "message": "What are his skills?",
            "history": [{"role": "user", "text": "hi"}, {"role": "model", "text": "hello"}]
        }),
    );
    let (status, body) = json_response(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "answer to: What are his skills?");
    assert_eq!(body["debug"]["scoring_mode"], "keyword");
    assert_eq!(body["debug"]["sections"][0], "skills");
    assert_eq!(body["debug"]["content_origin"], "remote");
}

#[tokio::test]
async fn test_chat_without_debug() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let app = app_with(source, Some(Arc::new(FakeGenerator::new())), false);

    let (status, body) =
        json_response(&app, post_json("/api/chat", json!({"message": "skills?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("debug").is_none());
}

#[tokio::test]
async fn test_chat_rejects_bad_messages_without_fetching() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let app = app_with(source.clone(), Some(Arc::new(FakeGenerator::new())), true);

    for payload in [json!({"message": ""}), json!({"message": 42}), json!({})] {
        let (status, body) = json_response(&app, post_json("/api/chat", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_chat_without_api_key_is_server_error() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let app = app_with(source.clone(), None, true);

    let (status, _) =
        json_response(&app, post_json("/api/chat", json!({"message": "hello there"}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_chat_generation_failure_is_bad_gateway() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let app = app_with(source, Some(Arc::new(FakeGenerator::failing(503))), true);

    let (status, body) =
        json_response(&app, post_json("/api/chat", json!({"message": "hello there"}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["upstream_status"], 503);
}

#[tokio::test]
async fn test_health_and_refresh() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let app = app_with(source.clone(), Some(Arc::new(FakeGenerator::new())), true);

    let health = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = json_response(&app, health).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache_state"], "empty");
    assert_eq!(body["chunks"], 0);
    assert_eq!(body["scoring_mode"], "keyword");
    assert_eq!(body["generator_configured"], true);
    assert_eq!(source.calls(), 0);

    let (status, body) = json_response(&app, post_json("/api/cache/refresh", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cache_state"], "ready");
    assert_eq!(body["chunks"], 5);
    assert_eq!(body["refresh_count"], 1);
    assert_eq!(body["wait_timed_out"], false);
    assert!(body["last_refreshed"].is_string());
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_handler_panic_is_generic_server_error() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let app = app_with(source, Some(Arc::new(FakeGenerator::panicking())), true);

    let (status, body) =
        json_response(&app, post_json("/api/chat", json!({"message": "hello there"}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "internal server error"}));
    assert!(!body.to_string().contains("secret"));
}

fn health_request() -> Request<Body> {
    Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_keyword_mode_for_placeholder_embeddings() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let service = service_with(source, Some(Arc::new(FakeEmbedder::broken())), None);
    service.cache().refresh_now().await;
    let app = router(Arc::new(service), true);

    let (status, body) = json_response(&app, health_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["embedder_configured"], true);
    assert_eq!(body["scoring_mode"], "keyword");
}

#[tokio::test]
async fn test_health_reports_vector_mode_for_usable_embeddings() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let service = service_with(source, Some(Arc::new(FakeEmbedder::new())), None);
    let app = router(Arc::new(service), true);

    // nothing cached yet
    let (_, body) = json_response(&app, health_request()).await;
    assert_eq!(body["scoring_mode"], "keyword");

    json_response(&app, post_json("/api/cache/refresh", json!({}))).await;

    let (_, body) = json_response(&app, health_request()).await;
    assert_eq!(body["embedder_configured"], true);
    assert_eq!(body["scoring_mode"], "vector");
}
