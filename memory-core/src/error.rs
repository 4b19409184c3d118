//! Error kinds for the salience-memory core, matching the failure taxonomy
//! the whole system is designed around: input/state errors always surface,
//! provider errors downgrade to a documented fallback and are logged, never
//! propagated as a crash.

use uuid::Uuid;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Which external collaborator (see `providers`) produced a
/// [`Error::ProviderUnavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Structured-extraction LLM.
    Llm,
    /// Text embedder.
    Embedder,
    /// External vector index.
    VectorStore,
    /// The persistence gateway's backing datastore.
    Datastore,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::Llm => "llm",
            ProviderKind::Embedder => "embedder",
            ProviderKind::VectorStore => "vector-store",
            ProviderKind::Datastore => "datastore",
        };
        f.write_str(s)
    }
}

/// Error kinds for the salience-memory system (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied input the core can't act on (empty query on an
    /// operation that requires one, malformed filter, etc).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Referenced entity (memory, loop, device, pattern, prediction...)
    /// does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate id on insert, or a double-close/double-restore of an
    /// idempotent operation. Surfaces as a successful no-op at the call
    /// site per spec §7, but the gateway itself reports it as `Conflict`
    /// so callers can distinguish "created" from "already existed".
    #[error("conflict: {0}")]
    Conflict(String),

    /// Tier access mismatch (e.g. attempting to vector-index a Vault
    /// memory, or recall reaching into a tier the caller cannot see).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The vector backend's view disagrees with metadata (e.g. a vector
    /// hit for a memory metadata says is forgotten).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A suspension point (LLM, embedder, vector store, datastore call)
    /// exceeded its deadline.
    #[error("deadline exceeded waiting on {0}")]
    Deadline(ProviderKind),

    /// An external collaborator failed or timed out. The caller-visible
    /// effect is the documented fallback, not this error — but internal
    /// code paths that can't fall back further (e.g. the datastore
    /// itself) surface it.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(ProviderKind),

    /// Anything else: bugs, invariant violations, serialization bugs.
    #[error("internal error: {0}")]
    Internal(String),

    /// JSON (de)serialization failure, usually from a malformed
    /// LLM-provider payload or a corrupt stored record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing-store I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convenience constructor for a missing-memory error.
    #[must_use]
    pub fn memory_not_found(id: &str) -> Self {
        Error::NotFound(format!("memory {id}"))
    }

    /// Convenience constructor for a missing-loop error.
    #[must_use]
    pub fn loop_not_found(id: Uuid) -> Self {
        Error::NotFound(format!("open loop {id}"))
    }

    /// Whether retrying this operation (after backoff) is worth attempting.
    /// Matches the recoverable/non-recoverable split the teacher draws for
    /// its own error enum: provider-side and I/O failures are transient,
    /// input/state errors are not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Deadline(_) | Error::ProviderUnavailable(_) | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(Error::ProviderUnavailable(ProviderKind::Llm).is_recoverable());
        assert!(Error::Deadline(ProviderKind::Embedder).is_recoverable());
        assert!(!Error::InvalidInput("x".into()).is_recoverable());
        assert!(!Error::Conflict("dup".into()).is_recoverable());
    }

    #[test]
    fn provider_kind_display() {
        assert_eq!(ProviderKind::VectorStore.to_string(), "vector-store");
    }
}
