//! Brute-force embedded vector index (spec §4.1, §6): `VECTORS_TABLE`
//! keyed by memory id, holding `(embedding, user, tier, forgottenState)`
//! exactly as the spec's "Vector index holds only..." note describes.
//! A real deployment would point `Embedder`/`VectorStore` at an external
//! ANN service; this in-process implementation linear-scans a user's
//! partition and ranks by cosine distance, which is the right tradeoff
//! for the corpus sizes this core targets and keeps the demo crate free
//! of a second external dependency.

use std::sync::Arc;

use async_trait::async_trait;
use redb::ReadableTable;
use salience_memory_core::concurrency::with_deadline;
use salience_memory_core::error::{Error, ProviderKind, Result};
use salience_memory_core::providers::{Deadline, VectorFilters, VectorHit, VectorStore};
use salience_memory_core::types::{ForgottenState, SecurityTier};
use serde::{Deserialize, Serialize};

use crate::tables::{MAX_EMBEDDING_SIZE, VECTORS_TABLE};
use crate::{blocking, RedbGateway};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVector {
    embedding: Vec<f32>,
    user: String,
    tier: SecurityTier,
    forgotten_state: ForgottenState,
}

fn encode(v: &StoredVector) -> Result<Vec<u8>> {
    postcard::to_allocvec(v).map_err(|e| Error::Internal(format!("serialize vector entry: {e}")))
}

fn decode(bytes: &[u8]) -> Result<StoredVector> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize vector entry: {e}")))
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::MAX;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return f32::MAX;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// `salience_memory_core::providers::VectorStore` implementation backed
/// by the same redb database as [`RedbGateway`]'s other tables.
pub struct RedbVectorStore {
    gateway: Arc<RedbGateway>,
}

impl RedbVectorStore {
    /// Share the given gateway's database for the vector table.
    #[must_use]
    pub fn new(gateway: Arc<RedbGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl VectorStore for RedbVectorStore {
    async fn upsert(&self, memory_id: &str, embedding: &[f32], filters: VectorFilters, deadline: Deadline) -> Result<()> {
        if filters.tier == SecurityTier::Vault {
            return Err(Error::Unauthorized(format!(
                "memory {memory_id} is Vault tier and must never reach the vector index"
            )));
        }
        let db = Arc::clone(&self.gateway.db);
        let memory_id = memory_id.to_string();
        let stored = StoredVector {
            embedding: embedding.to_vec(),
            user: filters.user,
            tier: filters.tier,
            forgotten_state: filters.forgotten_state,
        };
        with_deadline(
            ProviderKind::VectorStore,
            deadline,
            blocking(move || {
                let bytes = encode(&stored)?;
                if bytes.len() as u64 > MAX_EMBEDDING_SIZE {
                    return Err(Error::Internal(format!("embedding for {memory_id} exceeds max stored size")));
                }
                let write_txn = db
                    .begin_write()
                    .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
                {
                    let mut table = write_txn
                        .open_table(VECTORS_TABLE)
                        .map_err(|e| Error::Internal(format!("open vectors table: {e}")))?;
                    table
                        .insert(memory_id.as_str(), bytes.as_slice())
                        .map_err(|e| Error::Internal(format!("upsert vector: {e}")))?;
                }
                write_txn.commit().map_err(|e| Error::Internal(format!("commit vector upsert: {e}")))?;
                Ok(())
            }),
        )
        .await
    }

    async fn search(&self, user: &str, query: &[f32], k: usize, deadline: Deadline) -> Result<Vec<VectorHit>> {
        let db = Arc::clone(&self.gateway.db);
        let user = user.to_string();
        let query = query.to_vec();
        with_deadline(
            ProviderKind::VectorStore,
            deadline,
            blocking(move || {
                let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
                let table = read_txn
                    .open_table(VECTORS_TABLE)
                    .map_err(|e| Error::Internal(format!("open vectors table: {e}")))?;
                let mut scored = Vec::new();
                let iter = table.iter().map_err(|e| Error::Internal(format!("iterate vectors: {e}")))?;
                for entry in iter {
                    let (key, guard) = entry.map_err(|e| Error::Internal(format!("read vector entry: {e}")))?;
                    let stored = decode(guard.value())?;
                    if stored.user != user
                        || stored.tier == SecurityTier::Vault
                        || stored.forgotten_state != ForgottenState::Active
                    {
                        continue;
                    }
                    let distance = cosine_distance(&query, &stored.embedding);
                    scored.push(VectorHit {
                        memory_id: key.value().to_string(),
                        distance,
                    });
                }
                scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(k);
                Ok(scored)
            }),
        )
        .await
    }

    async fn delete(&self, memory_id: &str, deadline: Deadline) -> Result<()> {
        let db = Arc::clone(&self.gateway.db);
        let memory_id = memory_id.to_string();
        with_deadline(
            ProviderKind::VectorStore,
            deadline,
            blocking(move || {
                let write_txn = db
                    .begin_write()
                    .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
                {
                    let mut table = write_txn
                        .open_table(VECTORS_TABLE)
                        .map_err(|e| Error::Internal(format!("open vectors table: {e}")))?;
                    table
                        .remove(memory_id.as_str())
                        .map_err(|e| Error::Internal(format!("delete vector: {e}")))?;
                }
                write_txn.commit().map_err(|e| Error::Internal(format!("commit vector delete: {e}")))?;
                Ok(())
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_identical_vectors_is_zero() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&v, &v) < 1e-6);
    }

    #[test]
    fn cosine_distance_orthogonal_vectors_is_one() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }
}
