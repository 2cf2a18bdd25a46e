use tracing::debug;

use crate::error::{RagError, Result};
use crate::model::{IndexRecord, ScoredChunk};
use crate::provider::ModelProvider;
use crate::semantic::cosine_similarity;

pub const DEFAULT_TOP_K: usize = 3;

/// Ordering is by descending similarity; equal scores keep index order.
/// A record whose dimension differs from the query is a data-integrity error.
pub fn rank_records(
    query_embedding: &[f32],
    index: &[IndexRecord],
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    let mut scored = Vec::<ScoredChunk>::with_capacity(index.len());
    for record in index {
        if record.embedding.len() != query_embedding.len() {
            return Err(RagError::DataIntegrity {
                record_id: record.id.clone(),
                expected: query_embedding.len(),
                got: record.embedding.len(),
            });
        }

        scored.push(ScoredChunk {
            record: record.clone(),
            similarity_score: cosine_similarity(query_embedding, &record.embedding),
        });
    }

    // sort_by is stable
    scored.sort_by(|left, right| right.similarity_score.total_cmp(&left.similarity_score));
    scored.truncate(k);
    Ok(scored)
}

/// An empty index yields an empty result without calling the provider.
pub fn retrieve_top_k(
    provider: &dyn ModelProvider,
    query: &str,
    k: usize,
    index: &[IndexRecord],
) -> Result<Vec<ScoredChunk>> {
    if index.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query_embedding = provider.embed(query)?;
    let ranked = rank_records(&query_embedding, index, k)?;
    debug!(
        candidates = index.len(),
        returned = ranked.len(),
        top_score = ranked.first().map(|chunk| chunk.similarity_score).unwrap_or(0.0),
        "retrieval completed"
    );
    Ok(ranked)
}
