use std::sync::Arc;

use crate::cache::CacheState;
use crate::chat::{ChatError, GenerationError, Turn};
use crate::portfolio::{ContentOrigin, Section};
use crate::semantic::ScoringMode;
use crate::tests::support::{
    service_with, CountingSource, FakeEmbedder, FakeGenerator, PORTFOLIO_PAGE,
};

#[tokio::test]
async fn test_empty_message_rejected_before_fetch() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let generator = Arc::new(FakeGenerator::new());
    let service = service_with(source.clone(), None, Some(generator.clone()));

    for message in ["", "   ", "\n\t"] {
        let result = service.respond(message, &[]).await;
        assert!(matches!(result, Err(ChatError::InvalidRequest(_))));
    }

    assert_eq!(source.calls(), 0);
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn test_overlong_message_rejected() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let service = service_with(source.clone(), None, Some(Arc::new(FakeGenerator::new())));

    let message = "a".repeat(service.settings().max_message_chars + 1);
    let result = service.respond(&message, &[]).await;

    assert!(matches!(result, Err(ChatError::InvalidRequest(_))));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_missing_generator_is_configuration_error() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let service = service_with(source.clone(), None, None);

    let result = service.respond("What are his skills?", &[]).await;

    assert!(matches!(result, Err(ChatError::Configuration(_))));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_reply_with_keyword_scoring() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let generator = Arc::new(FakeGenerator::new());
    let service = service_with(source.clone(), None, Some(generator.clone()));

    let reply = service.respond("  What are his skills? ", &[]).await.unwrap();

    assert_eq!(reply.reply, "answer to: What are his skills?");
    assert_eq!(reply.debug.scoring_mode, ScoringMode::Keyword);
    assert_eq!(reply.debug.total_chunks, 5);
    // skills through its section name, contact through "his" inside "this page"
    assert_eq!(reply.debug.chunks_used, 2);
    assert_eq!(reply.debug.sections, vec![Section::Skills, Section::Contact]);
    assert_eq!(reply.debug.cache_state, CacheState::Ready);
    assert_eq!(reply.debug.content_origin, Some(ContentOrigin::Remote));
    assert!(!reply.debug.cache_wait_timed_out);

    let calls = generator.calls();
    assert_eq!(calls.len(), 1);
    let (system, turns) = &calls[0];
    assert!(system.contains("Ada"));
    assert!(system.contains("[SKILLS] Python"));
    assert_eq!(turns, &vec![Turn::user("What are his skills?")]);
}

#[tokio::test]
async fn test_history_is_forwarded_in_order() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let generator = Arc::new(FakeGenerator::new());
    let service = service_with(source, None, Some(generator.clone()));

    let history = vec![
        Turn::user("Hi"),
        Turn::model("Hello! Ask me about Ada."),
        Turn::user(""),
    ];
    service.respond("Where is she based?", &history).await.unwrap();

    let (_, turns) = &generator.calls()[0];
    assert_eq!(
        turns,
        &vec![
            Turn::user("Hi"),
            Turn::model("Hello! Ask me about Ada."),
            Turn::user("Where is she based?"),
        ]
    );
}

#[tokio::test]
async fn test_reply_with_vector_scoring() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let service = service_with(
        source,
        Some(Arc::new(FakeEmbedder::new())),
        Some(Arc::new(FakeGenerator::new())),
    );

    let reply = service.respond("Which project is he proud of", &[]).await.unwrap();

    assert_eq!(reply.debug.scoring_mode, ScoringMode::Vector);
    assert_eq!(reply.debug.sections[0], Section::Projects);
    assert_eq!(reply.debug.embedding_failures, 0);
    assert!(reply.debug.fallback_reason.is_none());
}

#[tokio::test]
async fn test_broken_embedder_degrades_to_keywords() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let service = service_with(
        source,
        Some(Arc::new(FakeEmbedder::broken())),
        Some(Arc::new(FakeGenerator::new())),
    );

    let reply = service.respond("What are his skills?", &[]).await.unwrap();

    assert_eq!(reply.debug.scoring_mode, ScoringMode::Keyword);
    assert_eq!(reply.debug.embedding_failures, reply.debug.total_chunks);
    assert!(reply.debug.fallback_reason.is_some());
}

#[tokio::test]
async fn test_unreachable_source_answers_from_fallback() {
    let source = Arc::new(CountingSource::failing());
    let service = service_with(source, None, Some(Arc::new(FakeGenerator::new())));

    let reply = service.respond("What are his skills?", &[]).await.unwrap();

    assert_eq!(reply.debug.content_origin, Some(ContentOrigin::Fallback));
    assert!(reply.debug.total_chunks > 0);
}

#[tokio::test]
async fn test_generation_error_propagates() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let service = service_with(source, None, Some(Arc::new(FakeGenerator::failing(429))));

    let result = service.respond("What are his skills?", &[]).await;

    match result {
        Err(ChatError::Generation(err @ GenerationError::Status { .. })) => {
            assert_eq!(err.upstream_status(), Some(429));
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn test_second_request_reuses_cache() {
    let source = Arc::new(CountingSource::new(PORTFOLIO_PAGE));
    let service = service_with(source.clone(), None, Some(Arc::new(FakeGenerator::new())));

    service.respond("What are his skills?", &[]).await.unwrap();
    service.respond("Where is he based?", &[]).await.unwrap();

    assert_eq!(source.calls(), 1);
}
