//! Retrieval engine (C5, spec §4.5): merges vector and metadata search,
//! ranks by `0.65*relevance + 0.35*(salience/100)`, and applies
//! `voteOnMemories` feedback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::concurrency::{with_deadline_cancellable, GateOutcome, ProviderGate};
use crate::error::{Error, ProviderKind, Result};
use crate::providers::{Embedder, VectorStore};
use crate::storage::{MemoryFilter, PersistenceGateway};
use crate::types::{Memory, Vote};

/// `recall` query parameters (spec §4.5, §6).
#[derive(Debug, Clone, Default)]
pub struct RecallQuery {
    /// Free-text query. Empty means pure recency x salience.
    pub query: String,
    /// Maximum results to return.
    pub limit: usize,
    /// Any-of people filter.
    pub people: Option<Vec<String>>,
    /// Minimum salience, inclusive.
    pub min_salience: Option<u8>,
    /// Inclusive creation-time range.
    pub time_range: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>,
    /// Exact project tag match.
    pub project: Option<String>,
    /// Include `Suppressed`/`Archived`/`PendingDelete` memories.
    pub include_suppressed: bool,
}

/// One ranked recall result.
#[derive(Debug, Clone)]
pub struct RecallHit {
    /// The matching memory.
    pub memory: Memory,
    /// Normalized relevance in `[0, 1]` behind this hit's rank.
    pub relevance: f64,
    /// Final rank score.
    pub rank: f64,
}

/// A single `voteOnMemories` entry.
#[derive(Debug, Clone)]
pub struct MemoryVote {
    /// Target memory id.
    pub memory_id: String,
    /// Direction.
    pub vote: Vote,
}

/// Retrieval engine over a persistence gateway, optional embedder and
/// vector store (both optional: a deployment with no embedder degrades
/// to metadata-only recall, per spec §7's vector-search fallback).
pub struct RetrievalEngine<G, E, V> {
    gateway: std::sync::Arc<G>,
    embedder: Option<std::sync::Arc<E>>,
    vector_store: Option<std::sync::Arc<V>>,
    embedder_timeout: Duration,
    vector_store_timeout: Duration,
    embedder_gate: Arc<ProviderGate>,
}

/// Baseline relevance assigned to metadata-only hits when vector search
/// is unavailable or skipped (spec §7 "vector search -> metadata-only
/// recall with relevance=0.5 baseline").
const METADATA_ONLY_RELEVANCE: f64 = 0.5;

impl<G, E, V> RetrievalEngine<G, E, V>
where
    G: PersistenceGateway + 'static,
    E: Embedder + 'static,
    V: VectorStore + 'static,
{
    /// Construct a retrieval engine.
    #[must_use]
    pub fn new(
        gateway: std::sync::Arc<G>,
        embedder: Option<std::sync::Arc<E>>,
        vector_store: Option<std::sync::Arc<V>>,
        embedder_timeout: Duration,
        vector_store_timeout: Duration,
        embedder_gate: Arc<ProviderGate>,
    ) -> Self {
        Self {
            gateway,
            embedder,
            vector_store,
            embedder_timeout,
            vector_store_timeout,
            embedder_gate,
        }
    }

    /// `recall(user, query, opts)` (spec §4.5). `cancel` is honored at the
    /// embedder/vector-store suspension points (spec §5).
    #[instrument(skip(self, query, cancel), fields(user))]
    pub async fn recall(&self, user: &str, query: &RecallQuery, cancel: &CancellationToken) -> Result<Vec<RecallHit>> {
        let filter = MemoryFilter {
            user: Some(user.to_string()),
            people: query.people.clone(),
            topics: None,
            project: query.project.clone(),
            time_range: query.time_range,
            min_salience: query.min_salience,
            include_forgotten: query.include_suppressed,
        };
        let metadata_hits = self.gateway.find_memories(&filter).await?;

        let mut relevance_by_id: HashMap<String, f64> = HashMap::new();
        if !query.query.trim().is_empty() {
            if let (Some(embedder), Some(store)) = (&self.embedder, &self.vector_store) {
                match self.vector_search(user, &query.query, embedder.as_ref(), store.as_ref(), cancel).await {
                    Ok(hits) => {
                        for hit in hits {
                            relevance_by_id.insert(hit.memory_id, normalize_distance(hit.distance));
                        }
                    }
                    Err(err) => {
                        warn!(%err, user, "vector search unavailable, falling back to metadata-only recall");
                    }
                }
            }
        }

        let mut scored: Vec<RecallHit> = metadata_hits
            .into_iter()
            .map(|memory| {
                let relevance = relevance_by_id
                    .get(&memory.id)
                    .copied()
                    .unwrap_or(if query.query.trim().is_empty() { 0.0 } else { METADATA_ONLY_RELEVANCE });
                let rank = crate::constants::retrieval_weights::RELEVANCE * relevance
                    + crate::constants::retrieval_weights::SALIENCE * (f64::from(memory.salience) / 100.0);
                RecallHit { memory, relevance, rank }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.rank
                .partial_cmp(&a.rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        });
        scored.truncate(if query.limit == 0 { usize::MAX } else { query.limit });
        Ok(scored)
    }

    async fn vector_search(
        &self,
        user: &str,
        query_text: &str,
        embedder: &E,
        store: &V,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::providers::VectorHit>> {
        let _permit = match self.embedder_gate.try_acquire().await {
            GateOutcome::Admitted(permit) => permit,
            GateOutcome::Degrade => {
                warn!(user, "embedder gate saturated, degrading to metadata-only recall");
                return Err(Error::ProviderUnavailable(ProviderKind::Embedder));
            }
        };
        let embedding = with_deadline_cancellable(
            ProviderKind::Embedder,
            self.embedder_timeout,
            cancel,
            embedder.embed(query_text, self.embedder_timeout),
        )
        .await?;
        with_deadline_cancellable(
            ProviderKind::VectorStore,
            self.vector_store_timeout,
            cancel,
            store.search(user, &embedding, 50, self.vector_store_timeout),
        )
        .await
    }

    /// `voteOnMemories(votes)` (spec §4.5): adjusts salience by the
    /// vote's delta, clamped to `[0, 100]`.
    #[instrument(skip(self, votes))]
    pub async fn vote_on_memories(&self, votes: &[MemoryVote]) -> Result<Vec<u8>> {
        let mut results = Vec::with_capacity(votes.len());
        for v in votes {
            let Some(mut memory) = self.gateway.get_memory(&v.memory_id).await? else {
                continue;
            };
            let delta = v.vote.delta();
            let adjusted = (i32::from(memory.salience) + delta).clamp(0, 100);
            memory.salience = adjusted as u8;
            self.gateway.update_memory(memory).await?;
            results.push(adjusted as u8);
        }
        Ok(results)
    }
}

/// Map a backend distance (smaller is closer, unbounded) into a `[0, 1]`
/// relevance score via an inverse falloff.
fn normalize_distance(distance: f32) -> f64 {
    let d = f64::from(distance.max(0.0));
    1.0 / (1.0 + d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_distance_monotonic() {
        assert!(normalize_distance(0.0) > normalize_distance(1.0));
        assert!(normalize_distance(1.0) > normalize_distance(10.0));
        assert_eq!(normalize_distance(0.0), 1.0);
    }

    #[test]
    fn vote_delta_signs() {
        assert_eq!(Vote::Up.delta(), 3);
        assert_eq!(Vote::Down.delta(), -3);
    }
}
