//! Cosine similarity over index-aligned chunk embeddings.

use std::cmp::Ordering;

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity, defined as 0 when either vector has zero norm or the
/// lengths differ. The result is clamped to [-1, 1] to absorb rounding.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// True when every embedding is a zero-vector placeholder (or there are none).
pub fn is_degenerate(embeddings: &[Vec<f32>]) -> bool {
    embeddings
        .iter()
        .all(|e| e.iter().all(|v| *v == 0.0))
}

/// Score every embedding against `query` and return `(index, similarity)`
/// pairs, highest first, at most `limit` of them.
///
/// The sort is stable so equal scores keep ascending index order.
pub fn rank_by_similarity(query: &[f32], embeddings: &[Vec<f32>], limit: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = embeddings
        .iter()
        .enumerate()
        .map(|(idx, embedding)| (idx, cosine_similarity(query, embedding)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(limit);
    scored
}
