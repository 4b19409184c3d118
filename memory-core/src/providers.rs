//! External collaborators the core consumes but does not implement
//! (spec §6): an LLM for structured extraction, a text embedder, and a
//! vector index. Concrete adapters (OpenAI, a local model, Pinecone,
//! ...) live outside this crate; the core only depends on these traits,
//! following the teacher's storage-trait-first layering.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A deadline for a suspension point (spec §5). Callers construct one
/// from "now + timeout"; providers race their work against it.
pub type Deadline = Duration;

/// Structured-extraction LLM, used only by the feature extractor (spec §4.2).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Ask the provider to fill `schema` from `prompt`, within `deadline`.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::ProviderUnavailable`] or
    /// [`crate::error::Error::Deadline`] on failure/timeout; callers fall
    /// back to the heuristic extractor rather than propagate.
    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &Value,
        deadline: Deadline,
    ) -> Result<Value>;
}

/// Text embedder, used by enrichment (on write) and retrieval (on query).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text` into this deployment's fixed-dimension vector space.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::ProviderUnavailable`] or
    /// [`crate::error::Error::Deadline`] on failure/timeout.
    async fn embed(&self, text: &str, deadline: Deadline) -> Result<Vec<f32>>;

    /// Fixed embedding dimension for this deployment.
    fn dimension(&self) -> usize;
}

/// Filters applied at the vector-store boundary (spec §4.1, §6): the
/// vector index holds only `(memoryId, vector, {user, tier, forgottenState})`.
#[derive(Debug, Clone)]
pub struct VectorFilters {
    /// Owning user — vector search is always scoped to one user's partition.
    pub user: String,
    /// Security tier. `Vault` memories must never reach the vector store.
    pub tier: crate::types::SecurityTier,
    /// Forgotten-state, kept in sync so queries can filter server-side.
    pub forgotten_state: crate::types::ForgottenState,
}

/// A single vector-search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// The memory id this vector belongs to.
    pub memory_id: String,
    /// Distance reported by the backend (smaller is closer, backend-defined scale).
    pub distance: f32,
}

/// External vector index (spec §4.1, §6). Every method takes a
/// [`Deadline`] like `LLMProvider`/`Embedder`, since spec §5 names
/// "vector-store calls (C1)" alongside the other three suspension points
/// that must be cancellable with a caller-provided deadline.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert a memory's embedding. Must not be called for `Vault` tier
    /// (callers enforce this; the trait itself has no way to reject it,
    /// matching spec §4.1's "MUST NOT be called for securityTier=Vault").
    ///
    /// # Errors
    /// Returns [`crate::error::Error::ProviderUnavailable`] or
    /// [`crate::error::Error::Deadline`] on failure/timeout.
    async fn upsert(&self, memory_id: &str, embedding: &[f32], filters: VectorFilters, deadline: Deadline) -> Result<()>;

    /// Search the user's active partition for the `k` nearest neighbors
    /// of `query`, filtering out non-`Active` / `Vault` entries server-side.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::ProviderUnavailable`] or
    /// [`crate::error::Error::Deadline`] on failure/timeout.
    async fn search(
        &self,
        user: &str,
        query: &[f32],
        k: usize,
        deadline: Deadline,
    ) -> Result<Vec<VectorHit>>;

    /// Remove a memory's vector entry, if present.
    ///
    /// # Errors
    /// Returns [`crate::error::Error::ProviderUnavailable`] or
    /// [`crate::error::Error::Deadline`] on failure/timeout.
    async fn delete(&self, memory_id: &str, deadline: Deadline) -> Result<()>;
}
