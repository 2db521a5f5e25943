//! Relevance scoring for portfolio chunks.
//!
//! # Architecture
//!
//! - `embeddings`: embedding providers (remote Gemini, local fastembed)
//! - `index`: cosine similarity over index-aligned embeddings
//! - `lexical`: keyword-overlap scoring with section boost
//! - `scorer`: picks vector or keyword mode and ranks chunks

pub mod embeddings;
pub mod index;
pub mod lexical;
pub mod scorer;

pub use embeddings::{Embedder, EmbeddingError, GeminiEmbedder, EMBEDDING_DIMENSIONS};
#[cfg(feature = "local-embeddings")]
pub use embeddings::LocalEmbedder;
pub use scorer::{Ranking, RelevanceResult, RelevanceScorer, ScoringMode};
