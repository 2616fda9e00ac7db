//! Exact nearest-neighbour search over one document's index.
//!
//! Every chunk is scored by cosine similarity against the query vector and
//! the best `k` are returned, highest first. The sort is stable, so chunks
//! with equal scores keep their document order.

use std::cmp::Ordering;

use crate::embedding;
use crate::models::{Chunk, VectorIndex};

#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

/// Return up to `k` chunks of `index` most similar to `query`.
///
/// Fewer than `k` results come back when the index is smaller than `k`.
/// An empty index yields an empty result.
pub fn top_k<'a>(index: &'a VectorIndex, query: &[f32], k: usize) -> Vec<ScoredChunk<'a>> {
    let mut scored: Vec<ScoredChunk<'a>> = index
        .entries
        .iter()
        .map(|entry| ScoredChunk {
            chunk: &entry.chunk,
            score: embedding::cosine_similarity(query, &entry.vector),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}
