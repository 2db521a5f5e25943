//! Relevance ranking of chunks against a query.
//!
//! Vector mode is used when an embedder is configured and the chunk
//! embeddings are aligned and non-degenerate. Every other case, including a
//! failed query embedding, falls back to keyword scoring. Ranking never fails.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::portfolio::Chunk;
use crate::semantic::embeddings::Embedder;
use crate::semantic::index::{is_degenerate, rank_by_similarity};
use crate::semantic::lexical::{score_lexical, DEFAULT_KEYWORD_BOOST};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    Vector,
    Keyword,
}

impl ScoringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringMode::Vector => "vector",
            ScoringMode::Keyword => "keyword",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevanceResult {
    pub chunk_index: usize,
    pub score: f32,
    pub chunk: Chunk,
}

/// Ranked chunks plus how they were scored.
#[derive(Debug, Clone, Serialize)]
pub struct Ranking {
    pub results: Vec<RelevanceResult>,
    pub mode: ScoringMode,
    /// Why vector mode was not used, when an embedder is configured.
    pub fallback_reason: Option<String>,
}

/// Deadline for embedding the query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RelevanceScorer {
    embedder: Option<Arc<dyn Embedder>>,
    keyword_boost: f32,
    query_timeout: Duration,
}

impl RelevanceScorer {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            embedder,
            keyword_boost: DEFAULT_KEYWORD_BOOST,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_keyword_boost(mut self, boost: f32) -> Self {
        self.keyword_boost = boost;
        self
    }

    pub fn rank_keyword(&self, query: &str, chunks: &[Chunk], top_k: usize) -> Vec<RelevanceResult> {
        score_lexical(query, chunks, self.keyword_boost, top_k)
            .into_iter()
            .map(|r| RelevanceResult {
                chunk_index: r.index,
                score: r.score,
                chunk: chunks[r.index].clone(),
            })
            .collect()
    }

    pub async fn rank(
        &self,
        query: &str,
        chunks: &[Chunk],
        embeddings: Option<&[Vec<f32>]>,
        top_k: usize,
    ) -> Ranking {
        if chunks.is_empty() || top_k == 0 {
            return Ranking {
                results: vec![],
                mode: ScoringMode::Keyword,
                fallback_reason: None,
            };
        }

        match self.try_vector(query, chunks, embeddings, top_k).await {
            Ok(results) => Ranking {
                results,
                mode: ScoringMode::Vector,
                fallback_reason: None,
            },
            Err(reason) => {
                if let Some(reason) = &reason {
                    log::debug!("keyword scoring: {reason}");
                }
                Ranking {
                    results: self.rank_keyword(query, chunks, top_k),
                    mode: ScoringMode::Keyword,
                    fallback_reason: reason,
                }
            }
        }
    }

    /// `Err(None)` means vector mode was never an option (no embedder).
    async fn try_vector(
        &self,
        query: &str,
        chunks: &[Chunk],
        embeddings: Option<&[Vec<f32>]>,
        top_k: usize,
    ) -> Result<Vec<RelevanceResult>, Option<String>> {
        let embedder = self.embedder.as_ref().ok_or(None)?;

        let embeddings = embeddings.ok_or_else(|| Some("no chunk embeddings".to_string()))?;
        if embeddings.len() != chunks.len() {
            return Err(Some(format!(
                "embedding count {} does not match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }
        if is_degenerate(embeddings) {
            return Err(Some("all chunk embeddings are placeholders".to_string()));
        }

        let query_embedding = tokio::time::timeout(self.query_timeout, embedder.embed(query))
            .await
            .map_err(|_| {
                log::warn!("query embedding timed out after {:?}", self.query_timeout);
                Some(format!("query embedding timed out after {:?}", self.query_timeout))
            })?
            .map_err(|err| {
                log::warn!("query embedding failed: {err}");
                Some(format!("query embedding failed: {err}"))
            })?;

        Ok(rank_by_similarity(&query_embedding, embeddings, top_k)
            .into_iter()
            .map(|(chunk_index, score)| RelevanceResult {
                chunk_index,
                score,
                chunk: chunks[chunk_index].clone(),
            })
            .collect())
    }
}
