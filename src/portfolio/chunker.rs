//! Sliding-window chunking of portfolio sections.
//!
//! Chunk order is part of the contract: priority sections come first (in
//! `Section` enumeration order), then secondary sections, each split left to
//! right. Consumers that truncate the list keep the most useful chunks.

use serde::{Deserialize, Serialize};

use super::{PortfolioContent, Priority, Section};

/// Default window length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_OVERLAP: usize = 100;
/// Sections at or below this many characters are treated as noise.
pub const DEFAULT_MIN_SECTION_CHARS: usize = 50;
/// Ceiling on the total number of chunks.
pub const DEFAULT_MAX_CHUNKS: usize = 30;

/// A bounded slice of section text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub section: Section,
    pub priority: Priority,
}

impl Chunk {
    pub fn new(content: impl Into<String>, section: Section) -> Self {
        Self {
            content: content.into(),
            section,
            priority: section.priority(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_section_chars: DEFAULT_MIN_SECTION_CHARS,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

fn default_min_section_chars() -> usize {
    DEFAULT_MIN_SECTION_CHARS
}

fn default_max_chunks() -> usize {
    DEFAULT_MAX_CHUNKS
}

impl ChunkerConfig {
    pub fn chunk(&self, content: &PortfolioContent) -> Vec<Chunk> {
        chunk_with_limits(
            content,
            self.chunk_size,
            self.overlap,
            self.min_section_chars,
            self.max_chunks,
        )
    }
}

/// Split content into overlapping chunks using the default section filter and
/// chunk ceiling.
pub fn chunk(content: &PortfolioContent, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    chunk_with_limits(
        content,
        chunk_size,
        overlap,
        DEFAULT_MIN_SECTION_CHARS,
        DEFAULT_MAX_CHUNKS,
    )
}

pub fn chunk_with_limits(
    content: &PortfolioContent,
    chunk_size: usize,
    overlap: usize,
    min_section_chars: usize,
    max_chunks: usize,
) -> Vec<Chunk> {
    let ordered = Section::ALL
        .iter()
        .filter(|s| s.priority() == Priority::Priority)
        .chain(
            Section::ALL
                .iter()
                .filter(|s| s.priority() == Priority::Secondary),
        );

    let mut chunks = Vec::new();
    for section in ordered {
        let text = content.section(*section).trim();
        if text.chars().count() <= min_section_chars {
            continue;
        }

        for window in split_windows(text, chunk_size, overlap) {
            chunks.push(Chunk::new(window, *section));
        }
    }

    if chunks.len() > max_chunks {
        log::debug!("truncating {} chunks to {max_chunks}", chunks.len());
        chunks.truncate(max_chunks);
    }

    chunks
}

/// Character windows of `size` starting every `size - overlap` characters.
fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let window = window.trim();
        if !window.is_empty() {
            windows.push(window.to_string());
        }
        start += step;
    }

    windows
}
