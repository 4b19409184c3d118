//! The persistence gateway (C1): the only component allowed to mutate the
//! stores (spec §5 "Shared-resource policy"). Every other component goes
//! through [`PersistenceGateway`]. Concrete backends (e.g.
//! `salience-memory-storage-redb`) implement this trait; the core never
//! talks to a datastore directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    ContextFrame, ForgottenState, Memory, OpenLoop, Pattern, Relationship, SecurityTier,
    TimelineEvent,
};

/// Filter for `find_memories` (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Owning user. Required in practice; kept optional so builders can
    /// default-construct before setting it.
    pub user: Option<String>,
    /// Any-of people filter, canonicalized names.
    pub people: Option<Vec<String>>,
    /// Any-of topics filter.
    pub topics: Option<Vec<String>>,
    /// Exact project tag match.
    pub project: Option<String>,
    /// Inclusive creation-time range.
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Minimum salience, inclusive.
    pub min_salience: Option<u8>,
    /// Include non-`Active` memories. Defaults to `false`.
    pub include_forgotten: bool,
}

impl MemoryFilter {
    /// Start a filter scoped to `user`.
    #[must_use]
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Default::default()
        }
    }

    /// Whether `memory` satisfies this filter (used by in-memory backends
    /// and as the reference semantics a real backend's query plan must match).
    #[must_use]
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(user) = &self.user {
            if &memory.user != user {
                return false;
            }
        }
        if !self.include_forgotten && memory.forgotten_state != ForgottenState::Active {
            return false;
        }
        if let Some(people) = &self.people {
            if !people.iter().any(|p| memory.extracted_features.people.contains(p)) {
                return false;
            }
        }
        if let Some(topics) = &self.topics {
            let all = memory.all_topics();
            if !topics.iter().any(|t| all.contains(t)) {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if memory.project_tag.as_deref() != Some(project.as_str()) {
                return false;
            }
        }
        if let Some((from, to)) = self.time_range {
            if memory.created_at < from || memory.created_at > to {
                return false;
            }
        }
        if let Some(min) = self.min_salience {
            if memory.salience < min {
                return false;
            }
        }
        true
    }
}

/// Additive delta applied to a [`Relationship`] on every memory write
/// that mentions the contact (spec §4.1 `upsertRelationship`).
#[derive(Debug, Clone)]
pub struct RelationshipDelta {
    /// Timestamp of the interaction driving this delta.
    pub interaction_at: DateTime<Utc>,
    /// Sensitivities observed in the memory mentioning this contact.
    pub sensitivities: Vec<String>,
}

/// Mode argument to `cascade_forget` (spec §4.4; mirrors [`crate::types::ForgetMode`]
/// plus the restore direction needed internally by the gateway).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeMode {
    /// Suppress: hide from retrieval, leave loops/events, keep vector.
    Suppress,
    /// Archive: hide from retrieval, remove vector, keep loops/events.
    Archive,
    /// Delete: hide from retrieval, remove vector, close loops, delete events.
    Delete,
    /// Restore: back to `Active`, reinstating the vector if needed.
    Restore,
}

/// Typed access to every store the core needs (spec §4.1). Index
/// discipline (compound indexes on `(user, createdAt)`,
/// `(user, salience desc)`, `(user, people)`, `(user, forgottenState)`)
/// is a backend implementation concern; this trait only specifies
/// semantics.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    // ---- Memories ----------------------------------------------------

    /// Insert a new memory.
    ///
    /// # Errors
    /// [`crate::error::Error::Conflict`] if `memory.id` already exists.
    async fn insert_memory(&self, memory: Memory) -> Result<()>;

    /// Fetch one memory by id, regardless of `forgottenState`.
    ///
    /// # Errors
    /// Returns the backend error; a missing id yields `Ok(None)`, not an error.
    async fn get_memory(&self, id: &str) -> Result<Option<Memory>>;

    /// Replace a stored memory wholesale (used by `reassociate`, `forget`,
    /// `restore`, and vote adjustments).
    ///
    /// # Errors
    /// [`crate::error::Error::NotFound`] if `memory.id` does not exist.
    async fn update_memory(&self, memory: Memory) -> Result<()>;

    /// Lazily-ordered (insertion order) memories matching `filter`.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn find_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>>;

    /// Permanently remove a memory record (only ever called by the
    /// hard-delete sweep on `PendingDelete` memories past their timer).
    ///
    /// # Errors
    /// Returns the backend error.
    async fn hard_delete_memory(&self, id: &str) -> Result<()>;

    // ---- Open loops -----------------------------------------------------

    /// Create an open loop.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn create_loop(&self, loop_: OpenLoop) -> Result<()>;

    /// Close a loop, recording `note`. Idempotent: closing an
    /// already-closed loop is a no-op that returns the original
    /// `closed_at` (spec §4.1).
    ///
    /// # Errors
    /// [`crate::error::Error::NotFound`] if the loop does not exist.
    async fn close_loop(&self, id: Uuid, note: Option<String>) -> Result<DateTime<Utc>>;

    /// Fetch a loop by id.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn get_loop(&self, id: Uuid) -> Result<Option<OpenLoop>>;

    /// List loops for a user, optionally filtered by owner/person/open-only.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn find_loops(
        &self,
        user: &str,
        other_party: Option<&str>,
        open_only: bool,
    ) -> Result<Vec<OpenLoop>>;

    // ---- Timeline events ----------------------------------------------

    /// Create a timeline event.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn create_timeline_event(&self, event: TimelineEvent) -> Result<()>;

    /// Events for `user` with `event_date` in `[from, to]`, optionally
    /// restricted to one person.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn find_timeline_events(
        &self,
        user: &str,
        person: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimelineEvent>>;

    /// Delete a timeline event (used by `forget(Delete)` cascade).
    ///
    /// # Errors
    /// Returns the backend error.
    async fn delete_timeline_event(&self, id: Uuid) -> Result<()>;

    // ---- Relationships --------------------------------------------------

    /// Idempotent-on-identical-delta upsert (spec §4.1). Recomputes
    /// `engagementTrend` from the updated interaction history.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn upsert_relationship(
        &self,
        user: &str,
        contact_name: &str,
        delta: RelationshipDelta,
    ) -> Result<Relationship>;

    /// Fetch a relationship by `(user, contact_name)`.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn get_relationship(&self, user: &str, contact_name: &str) -> Result<Option<Relationship>>;

    /// All relationships for a user.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn list_relationships(&self, user: &str) -> Result<Vec<Relationship>>;

    // ---- Context frames -------------------------------------------------

    /// Insert or replace a `(user, device)` context frame.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn put_context_frame(&self, user: &str, frame: ContextFrame) -> Result<()>;

    /// Fetch a `(user, device)` context frame.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn get_context_frame(&self, user: &str, device_id: &str) -> Result<Option<ContextFrame>>;

    /// All frames registered for a user.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn list_context_frames(&self, user: &str) -> Result<Vec<ContextFrame>>;

    /// Remove a `(user, device)` frame entirely (cold-start eviction).
    ///
    /// # Errors
    /// Returns the backend error.
    async fn delete_context_frame(&self, user: &str, device_id: &str) -> Result<()>;

    // ---- Patterns ---------------------------------------------------------

    /// Insert or replace a pattern.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn put_pattern(&self, pattern: Pattern) -> Result<()>;

    /// Fetch a pattern by id.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn get_pattern(&self, id: Uuid) -> Result<Option<Pattern>>;

    /// All patterns for a user.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn list_patterns(&self, user: &str) -> Result<Vec<Pattern>>;

    // ---- Observations -------------------------------------------------

    /// Append a context observation to the user's ledger.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn append_observation(&self, obs: crate::types::ContextObservation) -> Result<()>;

    /// All observations for a user, in insertion order.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn list_observations(&self, user: &str) -> Result<Vec<crate::types::ContextObservation>>;

    // ---- Behavioral fingerprints & predictions -------------------------

    /// Insert or replace a fingerprint.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn put_fingerprint(&self, fingerprint: crate::types::BehavioralFingerprint) -> Result<()>;

    /// Fetch a user's fingerprint.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn get_fingerprint(&self, user: &str) -> Result<Option<crate::types::BehavioralFingerprint>>;

    /// All fingerprints (used as the candidate pool for `identifyUser`
    /// when the caller doesn't supply one).
    ///
    /// # Errors
    /// Returns the backend error.
    async fn list_fingerprints(&self) -> Result<Vec<crate::types::BehavioralFingerprint>>;

    /// Record a prediction.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn put_prediction(&self, prediction: crate::types::Prediction) -> Result<()>;

    /// Fetch a prediction by id.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn get_prediction(&self, id: Uuid) -> Result<Option<crate::types::Prediction>>;

    // ---- Vector-store consistency bookkeeping --------------------------

    /// Mark a memory as `pending_vector_retry` (or clear the flag).
    ///
    /// # Errors
    /// [`crate::error::Error::NotFound`] if the memory does not exist.
    async fn set_pending_vector_retry(&self, memory_id: &str, pending: bool) -> Result<()>;

    /// All memories currently flagged `pending_vector_retry`, across users
    /// (the reconciler drains the whole backlog).
    ///
    /// # Errors
    /// Returns the backend error.
    async fn list_pending_vector_retries(&self) -> Result<Vec<Memory>>;

    /// Hard-delete every `PendingDelete` memory whose `forgottenAt` is
    /// older than `hard_delete_after_days`, as of `now`. Cascades to the
    /// memory's (already-closed/deleted) loops and events are a no-op by
    /// the time this runs.
    ///
    /// # Errors
    /// Returns the backend error.
    async fn sweep_hard_deletes(&self, now: DateTime<Utc>, hard_delete_after_days: i64) -> Result<Vec<String>>;
}

/// Enforced at the call site rather than inside [`PersistenceGateway`]
/// implementations: `Vault` memories never get a vector upsert (spec §4.1).
#[must_use]
pub fn eligible_for_vector_index(tier: SecurityTier) -> bool {
    tier != SecurityTier::Vault
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_never_vector_eligible() {
        assert!(!eligible_for_vector_index(SecurityTier::Vault));
        assert!(eligible_for_vector_index(SecurityTier::General));
        assert!(eligible_for_vector_index(SecurityTier::Personal));
    }
}
