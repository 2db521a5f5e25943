//! Runs one chat request from validation to the generated reply.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::{CacheState, ContentCache};
use crate::portfolio::{ContentOrigin, Section};
use crate::semantic::{RelevanceScorer, ScoringMode};

use super::prompt::{conversation, system_prompt};
use super::{ChatError, Generator, Turn};

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;
pub const DEFAULT_MAX_HISTORY_TURNS: usize = 20;

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub owner_name: String,
    pub top_k: usize,
    pub max_message_chars: usize,
    pub max_history_turns: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            owner_name: "the portfolio owner".to_string(),
            top_k: DEFAULT_TOP_K,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
        }
    }
}

/// Diagnostics returned next to every reply.
#[derive(Debug, Clone, Serialize)]
pub struct ChatDebug {
    pub chunks_used: usize,
    pub total_chunks: usize,
    pub sections: Vec<Section>,
    pub scoring_mode: ScoringMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub cache_state: CacheState,
    pub cache_age_secs: Option<u64>,
    pub cache_wait_timed_out: bool,
    pub content_origin: Option<ContentOrigin>,
    pub embedding_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub debug: ChatDebug,
}

pub struct ChatService {
    cache: ContentCache,
    scorer: RelevanceScorer,
    generator: Option<Arc<dyn Generator>>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        cache: ContentCache,
        scorer: RelevanceScorer,
        generator: Option<Arc<dyn Generator>>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            cache,
            scorer,
            generator,
            settings,
        }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    fn validate(&self, query: &str) -> Result<(), ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::InvalidRequest(
                "message must be a non-empty string".to_string(),
            ));
        }

        let len = query.chars().count();
        if len > self.settings.max_message_chars {
            return Err(ChatError::InvalidRequest(format!(
                "message is {len} characters long, the limit is {}",
                self.settings.max_message_chars
            )));
        }

        Ok(())
    }

    pub async fn respond(&self, query: &str, history: &[Turn]) -> Result<ChatReply, ChatError> {
        self.validate(query)?;

        let generator = self.generator.as_ref().ok_or_else(|| {
            ChatError::Configuration("generation API key is not set".to_string())
        })?;

        let view = self.cache.get_or_refresh().await;
        let chunks = view.chunks();

        let ranking = self
            .scorer
            .rank(query, chunks, view.embeddings(), self.settings.top_k)
            .await;

        log::debug!(
            "ranked {} of {} chunks in {} mode",
            ranking.results.len(),
            chunks.len(),
            ranking.mode.as_str()
        );

        let system = system_prompt(&self.settings.owner_name, &ranking.results);
        let turns = conversation(history, query, self.settings.max_history_turns);

        let reply = generator.generate(&system, &turns).await?;

        let snapshot = view.snapshot.as_ref();
        let debug = ChatDebug {
            chunks_used: ranking.results.len(),
            total_chunks: chunks.len(),
            sections: ranking.results.iter().map(|r| r.chunk.section).collect(),
            scoring_mode: ranking.mode,
            fallback_reason: ranking.fallback_reason,
            cache_state: view.state,
            cache_age_secs: snapshot.map(|s| s.age().as_secs()),
            cache_wait_timed_out: view.waited_out,
            content_origin: snapshot.map(|s| s.content.origin),
            embedding_failures: snapshot.map(|s| s.embedding_failures).unwrap_or(0),
        };

        Ok(ChatReply { reply, debug })
    }
}
