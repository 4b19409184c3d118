//! Fakes for the three external-collaborator traits in
//! `salience_memory_core::providers`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::providers::{Deadline, Embedder, LLMProvider, VectorFilters, VectorHit, VectorStore};
use salience_memory_core::types::{ForgottenState, SecurityTier};
use serde_json::Value;

/// Canned-response [`LLMProvider`]: returns queued responses in FIFO order,
/// falling back to `default_response` once the queue is drained. Records
/// every prompt it was asked to complete so tests can assert on call count
/// and content.
pub struct FakeLLMProvider {
    queue: Mutex<Vec<Value>>,
    default_response: Value,
    prompts: Mutex<Vec<String>>,
    fail_next: AtomicUsize,
}

impl FakeLLMProvider {
    /// A provider that always returns `response` (e.g. an empty
    /// `ExtractedFeatures`-shaped object), never failing.
    #[must_use]
    pub fn with_default(response: Value) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            default_response: response,
            prompts: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
        }
    }

    /// Queue `response` to be returned by the next `complete_structured`
    /// call, before falling back to the default.
    pub fn push_response(&self, response: Value) {
        self.queue.lock().push(response);
    }

    /// Make the next `n` calls fail with `Error::ProviderUnavailable`,
    /// exercising the enrichment pipeline's heuristic-extraction fallback.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Prompts this fake has been asked to complete, in call order.
    #[must_use]
    pub fn prompts_seen(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Default for FakeLLMProvider {
    fn default() -> Self {
        Self::with_default(serde_json::json!({}))
    }
}

#[async_trait]
impl LLMProvider for FakeLLMProvider {
    async fn complete_structured(&self, prompt: &str, _schema: &Value, _deadline: Deadline) -> Result<Value> {
        self.prompts.lock().push(prompt.to_string());

        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::ProviderUnavailable(
                salience_memory_core::error::ProviderKind::Llm,
            ));
        }

        let mut queue = self.queue.lock();
        if queue.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(queue.remove(0))
        }
    }
}

/// Deterministic bag-of-characters [`Embedder`]: hashes each byte of the
/// (lowercased) input into one of `dimension` buckets and L2-normalizes
/// the result, so near-duplicate text embeds close together without
/// pulling in a real model.
pub struct FakeEmbedder {
    dimension: usize,
}

impl FakeEmbedder {
    /// An embedder producing vectors of the given dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str, _deadline: Deadline) -> Result<Vec<f32>> {
        let mut buckets = vec![0.0f32; self.dimension];
        for word in text.to_lowercase().split_whitespace() {
            let bucket = (hash_str(word) as usize) % self.dimension;
            buckets[bucket] += 1.0;
        }
        let norm = buckets.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for b in &mut buckets {
                *b /= norm;
            }
        }
        Ok(buckets)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn hash_str(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

struct StoredVector {
    embedding: Vec<f32>,
    user: String,
    tier: SecurityTier,
    forgotten_state: ForgottenState,
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

/// In-memory [`VectorStore`], mirroring `RedbVectorStore`'s semantics
/// (Vault rejected at upsert, Vault/non-Active filtered at search) without
/// a database.
#[derive(Default)]
pub struct FakeVectorStore {
    entries: Mutex<HashMap<String, StoredVector>>,
}

impl FakeVectorStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vectors currently indexed, across all users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn upsert(&self, memory_id: &str, embedding: &[f32], filters: VectorFilters, _deadline: Deadline) -> Result<()> {
        if filters.tier == SecurityTier::Vault {
            return Err(Error::Unauthorized(format!(
                "memory {memory_id} is Vault tier and must never reach the vector index"
            )));
        }
        self.entries.lock().insert(
            memory_id.to_string(),
            StoredVector {
                embedding: embedding.to_vec(),
                user: filters.user,
                tier: filters.tier,
                forgotten_state: filters.forgotten_state,
            },
        );
        Ok(())
    }

    async fn search(&self, user: &str, query: &[f32], k: usize, _deadline: Deadline) -> Result<Vec<VectorHit>> {
        let entries = self.entries.lock();
        let mut scored: Vec<VectorHit> = entries
            .iter()
            .filter(|(_, v)| v.user == user && v.tier != SecurityTier::Vault && v.forgotten_state == ForgottenState::Active)
            .map(|(id, v)| VectorHit {
                memory_id: id.clone(),
                distance: cosine_distance(query, &v.embedding),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete(&self, memory_id: &str, _deadline: Deadline) -> Result<()> {
        self.entries.lock().remove(memory_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_llm_returns_default_until_queue_drains() {
        let provider = FakeLLMProvider::with_default(serde_json::json!({"default": true}));
        provider.push_response(serde_json::json!({"queued": true}));
        let schema = serde_json::json!({});
        let first = provider.complete_structured("p1", &schema, Deadline::from_secs(1)).await.unwrap();
        let second = provider.complete_structured("p2", &schema, Deadline::from_secs(1)).await.unwrap();
        assert_eq!(first, serde_json::json!({"queued": true}));
        assert_eq!(second, serde_json::json!({"default": true}));
        assert_eq!(provider.prompts_seen(), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn fake_embedder_is_deterministic_and_normalized() {
        let embedder = FakeEmbedder::new(16);
        let a = embedder.embed("same text", Deadline::from_secs(1)).await.unwrap();
        let b = embedder.embed("same text", Deadline::from_secs(1)).await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn fake_vector_store_rejects_vault_and_filters_on_search() {
        let store = FakeVectorStore::new();
        let vault = VectorFilters {
            user: "sarah".into(),
            tier: SecurityTier::Vault,
            forgotten_state: ForgottenState::Active,
        };
        assert!(store.upsert("m1", &[1.0, 0.0], vault, Deadline::from_secs(1)).await.is_err());

        let general = VectorFilters {
            user: "sarah".into(),
            tier: SecurityTier::General,
            forgotten_state: ForgottenState::Active,
        };
        store.upsert("m2", &[1.0, 0.0], general, Deadline::from_secs(1)).await.unwrap();
        let hits = store.search("sarah", &[1.0, 0.0], 5, Deadline::from_secs(1)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory_id, "m2");
    }
}
