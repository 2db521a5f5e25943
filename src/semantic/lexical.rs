//! Keyword-overlap scoring, the fallback when vectors are unusable.
//!
//! Score of a chunk: total substring occurrences of each query term in the
//! lowercased chunk text (plus one when a term names the chunk's section),
//! divided by the number of query terms, then boosted for priority content.

use std::cmp::Ordering;

use crate::portfolio::{Chunk, Priority, Section};

/// Multiplier applied to chunks from boosted sections.
pub const DEFAULT_KEYWORD_BOOST: f32 = 1.5;

/// Sections boosted regardless of chunk priority.
const BOOSTED_SECTIONS: &[Section] = &[Section::About, Section::Skills, Section::Projects];

/// Result of lexical scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalResult {
    /// Index into the scored chunk slice
    pub index: usize,
    /// Normalized, boosted score (always > 0)
    pub score: f32,
}

/// Tokenize query into lowercase terms longer than two characters.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .map(|s| s.to_lowercase())
        .filter(|s| s.chars().count() > 2)
        .collect()
}

/// Count non-overlapping occurrences of `needle` in `haystack`.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

fn is_boosted(chunk: &Chunk) -> bool {
    chunk.priority == Priority::Priority || BOOSTED_SECTIONS.contains(&chunk.section)
}

/// Score one chunk against pre-tokenized query terms.
pub fn score_chunk(terms: &[String], chunk: &Chunk, boost: f32) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }

    let content = chunk.content.to_lowercase();
    let section = chunk.section.name();

    let raw: usize = terms
        .iter()
        .map(|term| {
            let section_hit = usize::from(term == section);
            count_occurrences(&content, term) + section_hit
        })
        .sum();

    let normalized = raw as f32 / terms.len() as f32;
    if is_boosted(chunk) {
        normalized * boost
    } else {
        normalized
    }
}

/// Score chunks against a query using keyword matching.
///
/// Results are sorted by score (highest first, ties in chunk order) and
/// limited to `limit`. Chunks scoring zero are never returned.
pub fn score_lexical(query: &str, chunks: &[Chunk], boost: f32, limit: usize) -> Vec<LexicalResult> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return vec![];
    }

    let mut results: Vec<LexicalResult> = chunks
        .iter()
        .enumerate()
        .filter_map(|(index, chunk)| {
            let score = score_chunk(&terms, chunk, boost);
            (score > 0.0).then_some(LexicalResult { index, score })
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(limit);
    results
}
