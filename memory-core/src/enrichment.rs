//! Enrichment pipeline (C4, spec §4.4): orchestrates the feature
//! extractor and salience scorer, derives open loops and timeline
//! events, and owns the memory lifecycle (`forget`/`forgetPerson`/
//! `restore`/`reassociate`) plus export/import.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::concurrency::{with_deadline_cancellable, GateOutcome, KeyedLocks, ProviderGate};
use crate::config::MemoryConfig;
use crate::error::{Error, ProviderKind, Result};
use crate::extraction::{canonicalize_against, new_memory_id, ExtractionRequest, FeatureExtractor};
use crate::providers::{Embedder, VectorFilters, VectorStore};
use crate::relationships::{self, InteractionDelta};
use crate::salience::{ScoringContext, SalienceScorer};
use crate::storage::{self, PersistenceGateway, RelationshipDelta};
use crate::types::{ForgetMode, ForgottenState, Memory, OpenLoop, SecurityTier, TimelineEvent};

static VAULT_KEYWORDS: &[&str] = &[
    "ssn", "social security", "password", "pin", "account number", "routing number",
    "credit card", "passport number", "bank balance", "brokerage",
];

/// Classify a memory's security tier from its raw text (spec §4.4 step 4).
#[must_use]
pub fn classify_security_tier(text: &str) -> SecurityTier {
    let lower = text.to_lowercase();
    if VAULT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        SecurityTier::Vault
    } else {
        SecurityTier::General
    }
}

/// Outcome returned to the `storeMemory` caller (spec §6).
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    /// The new memory's id.
    pub id: String,
    /// Computed salience.
    pub salience: u8,
    /// Factor breakdown behind `salience`.
    pub factors: crate::types::SalienceFactors,
    /// Number of open loops created.
    pub loops_created: usize,
    /// Number of timeline events created.
    pub events_created: usize,
}

/// A complete export of one user's memories/loops/events/relationships
/// (spec §4.4 `exportMemories`, supplemented per the ambient "export/import"
/// feature — see the crate-level docs for why this exists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExport {
    /// The exported user.
    pub user: String,
    /// When the export was produced.
    pub exported_at: DateTime<Utc>,
    /// All memories for the user (regardless of `forgottenState`).
    pub memories: Vec<Memory>,
    /// All open loops for the user.
    pub loops: Vec<OpenLoop>,
    /// All timeline events for the user.
    pub events: Vec<TimelineEvent>,
    /// All relationships for the user.
    pub relationships: Vec<crate::types::Relationship>,
}

/// Options controlling `importMemories` re-derivation (the Open Question
/// decision recorded in the crate's design notes: import always
/// skips re-running extraction/salience, trusting the exported values).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// If true, records that already exist (by id) are overwritten rather
    /// than skipped.
    pub overwrite_existing: bool,
}

/// Additive/subtractive edits applied by `reassociate` (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct ReassociateEdit {
    /// People to add.
    pub add_people: Vec<String>,
    /// People to remove.
    pub remove_people: Vec<String>,
    /// Topics to add.
    pub add_topics: Vec<String>,
    /// Topics to remove.
    pub remove_topics: Vec<String>,
    /// Tags to add.
    pub add_tags: Vec<String>,
    /// Tags to remove.
    pub remove_tags: Vec<String>,
    /// New project tag, if changing.
    pub set_project: Option<Option<String>>,
}

/// Orchestrates C2 + C3 and owns the memory/loop/event/relationship
/// write path, plus forget/restore/reassociate/export.
pub struct EnrichmentPipeline<G, E, V> {
    gateway: Arc<G>,
    extractor: FeatureExtractor,
    embedder: Option<Arc<E>>,
    vector_store: Option<Arc<V>>,
    config: MemoryConfig,
    memory_locks: KeyedLocks<String>,
    audit: AuditLogger,
    embedder_gate: Arc<ProviderGate>,
    retry_attempts: SyncMutex<HashMap<String, u32>>,
}

impl<G, E, V> EnrichmentPipeline<G, E, V>
where
    G: PersistenceGateway + 'static,
    E: Embedder + 'static,
    V: VectorStore + 'static,
{
    /// Construct a pipeline over the given collaborators. Audit logging is
    /// disabled by default; call [`Self::with_audit`] to turn it on.
    #[must_use]
    pub fn new(
        gateway: Arc<G>,
        extractor: FeatureExtractor,
        embedder: Option<Arc<E>>,
        vector_store: Option<Arc<V>>,
        config: MemoryConfig,
        embedder_gate: Arc<ProviderGate>,
    ) -> Self {
        Self {
            gateway,
            extractor,
            embedder,
            vector_store,
            config,
            memory_locks: KeyedLocks::new(),
            audit: AuditLogger::disabled(),
            embedder_gate,
            retry_attempts: SyncMutex::new(HashMap::new()),
        }
    }

    /// Attach an audit logger (spec's "logs every downgrade with a
    /// correlation id" requirement, supplemented with forget/restore
    /// events — see the `audit` module).
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// `store(user, text, context, useLLM)` (spec §4.4). `cancel` is
    /// honored at every provider suspension point this call reaches
    /// (extraction's LLM call, the best-effort embed + vector upsert).
    #[instrument(skip(self, text, known_people, cancel), fields(user))]
    pub async fn store(
        &self,
        user: &str,
        text: &str,
        known_people: &HashSet<String>,
        context: &ScoringContext,
        use_llm: bool,
        cancel: &CancellationToken,
    ) -> Result<StoreOutcome> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("memory text must not be empty".into()));
        }
        let memory_id = new_memory_id();
        let now = Utc::now();
        let correlation_id = Uuid::new_v4();

        let request = ExtractionRequest {
            user,
            text,
            known_people,
        };
        let outcome = self.extractor.extract(&request, use_llm, cancel).await;
        let mut features = outcome.features;
        features.people = canonicalize_people(self.gateway.as_ref(), user, &features.people).await?;

        let factors = SalienceScorer::score(text, &features, context);
        let salience = SalienceScorer::salience_from_factors(&factors);
        let security_tier = classify_security_tier(text);
        let encryption_envelope = if security_tier == SecurityTier::Vault {
            Some(envelope_placeholder(text))
        } else {
            None
        };

        let memory = Memory {
            id: memory_id.clone(),
            user: user.to_string(),
            created_at: now,
            text: text.to_string(),
            normalized_text: normalize(text),
            extracted_features: features.clone(),
            extraction_status: outcome.status,
            salience,
            salience_factors: factors,
            security_tier,
            encryption_envelope,
            forgotten_state: ForgottenState::Active,
            forgotten_at: None,
            forgotten_reason: None,
            pending_vector_retry: false,
            project_tag: None,
            added_tags: HashSet::new(),
            added_topics: HashSet::new(),
        };

        self.gateway.insert_memory(memory.clone()).await?;

        let mut loops_created = 0usize;
        for commitment in &features.commitments {
            let loop_ = OpenLoop {
                id: Uuid::new_v4(),
                user: user.to_string(),
                description: commitment.text.clone(),
                owner: commitment.owner,
                other_party: commitment.other_party.clone(),
                due_date: commitment.due_date,
                loop_type: commitment.loop_type.clone(),
                source_memory_id: Some(memory_id.clone()),
                created_at: now,
                closed_at: None,
                closed_note: None,
            };
            self.gateway.create_loop(loop_).await?;
            loops_created += 1;
        }

        let mut events_created = 0usize;
        for event in &features.events {
            let timeline_event = TimelineEvent {
                id: Uuid::new_v4(),
                user: user.to_string(),
                description: event.description.clone(),
                person: features.people.iter().next().cloned(),
                event_date: event.event_date,
                category: event.category.clone(),
                source_memory_id: memory_id.clone(),
            };
            self.gateway.create_timeline_event(timeline_event).await?;
            events_created += 1;
        }

        if storage::eligible_for_vector_index(security_tier) {
            self.enqueue_vector_upsert(&memory, correlation_id, cancel).await;
        }

        for person in &features.people {
            let delta = RelationshipDelta {
                interaction_at: now,
                sensitivities: features.sensitivities.clone(),
            };
            if let Err(err) = self.gateway.upsert_relationship(user, person, delta).await {
                warn!(%err, person, "relationship upsert failed, continuing");
            }
        }

        Ok(StoreOutcome {
            id: memory_id,
            salience,
            factors: memory.salience_factors,
            loops_created,
            events_created,
        })
    }

    /// Embed `memory`'s text and upsert it into the vector store, gated by
    /// `embedder_gate` and cancellable at both suspension points. Returns
    /// `Ok(())` with no work done when no embedder/vector store is
    /// configured (metadata-only deployment).
    async fn vector_upsert_attempt(&self, memory: &Memory, cancel: &CancellationToken) -> Result<()> {
        let (Some(embedder), Some(store)) = (&self.embedder, &self.vector_store) else {
            return Ok(());
        };
        let _permit = match self.embedder_gate.try_acquire().await {
            GateOutcome::Admitted(permit) => permit,
            GateOutcome::Degrade => return Err(Error::ProviderUnavailable(ProviderKind::Embedder)),
        };
        let deadline = self.config.embedder_timeout;
        let embedding = with_deadline_cancellable(
            ProviderKind::Embedder,
            deadline,
            cancel,
            embedder.embed(&memory.text, deadline),
        )
        .await?;
        let filters = VectorFilters {
            user: memory.user.clone(),
            tier: memory.security_tier,
            forgotten_state: memory.forgotten_state,
        };
        let vector_deadline = self.config.vector_store_timeout;
        with_deadline_cancellable(
            ProviderKind::VectorStore,
            vector_deadline,
            cancel,
            store.upsert(&memory.id, &embedding, filters, vector_deadline),
        )
        .await
    }

    /// Best-effort embed + upsert; failures mark the memory
    /// `pending_vector_retry` for the background reconciler rather than
    /// failing the write (spec §4.1 "best-effort two-phase write").
    async fn enqueue_vector_upsert(&self, memory: &Memory, correlation_id: Uuid, cancel: &CancellationToken) {
        if self.embedder.is_none() || self.vector_store.is_none() {
            return;
        }
        if let Err(err) = self.vector_upsert_attempt(memory, cancel).await {
            let provider = match &err {
                Error::Deadline(p) | Error::ProviderUnavailable(p) => *p,
                _ => ProviderKind::VectorStore,
            };
            warn!(%correlation_id, %err, memory_id = %memory.id, "vector upsert failed, queuing for retry");
            self.audit.log(
                AuditEntry::new(AuditEventType::ProviderDowngrade, correlation_id)
                    .with_user(&memory.user)
                    .with_resource(&memory.id)
                    .with_detail("provider", provider.to_string())
                    .with_detail("reason", err.to_string()),
            );
            let _ = self.gateway.set_pending_vector_retry(&memory.id, true).await;
        } else {
            self.retry_attempts.lock().remove(&memory.id);
        }
    }

    /// Drain the `pending_vector_retry` backlog (spec §4.1 "background
    /// reconciler"). Intended to run on a timer; returns the number of
    /// memories it successfully reconciled. Recoverable failures
    /// (`Error::is_recoverable`) back off exponentially per
    /// `MemoryConfig::retry_backoff` before the next memory is attempted;
    /// non-recoverable failures give up immediately rather than retrying
    /// forever.
    #[instrument(skip(self))]
    pub async fn reconcile_pending_vectors(&self) -> Result<usize> {
        let pending = self.gateway.list_pending_vector_retries().await?;
        let mut reconciled = 0usize;
        let cancel = CancellationToken::new();
        for memory in pending {
            if memory.forgotten_state != ForgottenState::Active {
                self.gateway.set_pending_vector_retry(&memory.id, false).await?;
                self.retry_attempts.lock().remove(&memory.id);
                continue;
            }
            let attempt = self.retry_attempts.lock().get(&memory.id).copied().unwrap_or(0);
            match self.vector_upsert_attempt(&memory, &cancel).await {
                Ok(()) => {
                    self.gateway.set_pending_vector_retry(&memory.id, false).await?;
                    self.retry_attempts.lock().remove(&memory.id);
                    reconciled += 1;
                }
                Err(err) if err.is_recoverable() => {
                    self.retry_attempts.lock().insert(memory.id.clone(), attempt + 1);
                    let delay = self.config.retry_backoff.delay_for(attempt);
                    warn!(memory_id = %memory.id, %err, attempt, ?delay, "vector upsert still failing, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(memory_id = %memory.id, %err, "vector upsert failed with a non-recoverable error, giving up");
                    self.gateway.set_pending_vector_retry(&memory.id, false).await?;
                    self.retry_attempts.lock().remove(&memory.id);
                }
            }
        }
        Ok(reconciled)
    }

    /// `forget(memoryId, mode, reason)` (spec §4.4).
    #[instrument(skip(self, reason))]
    pub async fn forget(&self, memory_id: &str, mode: ForgetMode, reason: Option<String>) -> Result<()> {
        self.memory_locks
            .with_lock(memory_id.to_string(), || self.forget_locked(memory_id, mode, reason))
            .await
    }

    async fn forget_locked(&self, memory_id: &str, mode: ForgetMode, reason: Option<String>) -> Result<()> {
        let mut memory = self
            .gateway
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::memory_not_found(memory_id))?;

        memory.forgotten_state = mode.target_state();
        memory.forgotten_at = Some(Utc::now());
        memory.forgotten_reason = reason.clone();
        self.gateway.update_memory(memory.clone()).await?;
        self.audit.log(
            AuditEntry::new(AuditEventType::MemoryForgotten, Uuid::new_v4())
                .with_user(&memory.user)
                .with_resource(memory_id)
                .with_detail("mode", format!("{mode:?}"))
                .with_detail("reason", reason.unwrap_or_default()),
        );

        match mode {
            ForgetMode::Suppress => {}
            ForgetMode::Archive => {
                if let Some(store) = &self.vector_store {
                    let _ = store.delete(memory_id, self.config.vector_store_timeout).await;
                }
            }
            ForgetMode::Delete => {
                if let Some(store) = &self.vector_store {
                    let _ = store.delete(memory_id, self.config.vector_store_timeout).await;
                }
                self.cascade_close_loops(memory_id).await?;
                self.cascade_delete_events(memory_id).await?;
            }
        }
        Ok(())
    }

    async fn cascade_close_loops(&self, memory_id: &str) -> Result<()> {
        // The gateway indexes loops by user; scanning the user's loops for
        // a matching sourceMemoryId keeps this trait-agnostic rather than
        // requiring a dedicated by-memory index.
        let memory = self
            .gateway
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::memory_not_found(memory_id))?;
        let loops = self.gateway.find_loops(&memory.user, None, true).await?;
        for loop_ in loops {
            if loop_.source_memory_id.as_deref() == Some(memory_id) {
                self.gateway.close_loop(loop_.id, Some("source memory deleted".into())).await?;
            }
        }
        Ok(())
    }

    async fn cascade_delete_events(&self, memory_id: &str) -> Result<()> {
        let memory = self
            .gateway
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::memory_not_found(memory_id))?;
        let far_future = Utc::now() + chrono::Duration::days(365 * 50);
        let far_past = Utc::now() - chrono::Duration::days(365 * 50);
        let events = self
            .gateway
            .find_timeline_events(&memory.user, None, far_past, far_future)
            .await?;
        for event in events {
            if event.source_memory_id == memory_id {
                self.gateway.delete_timeline_event(event.id).await?;
            }
        }
        Ok(())
    }

    /// `restore(memoryId)` (spec §4.4): requires `Suppressed` or `Archived`.
    #[instrument(skip(self))]
    pub async fn restore(&self, memory_id: &str) -> Result<()> {
        self.memory_locks
            .with_lock(memory_id.to_string(), || self.restore_locked(memory_id))
            .await
    }

    async fn restore_locked(&self, memory_id: &str) -> Result<()> {
        let mut memory = self
            .gateway
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::memory_not_found(memory_id))?;
        if !matches!(memory.forgotten_state, ForgottenState::Suppressed | ForgottenState::Archived) {
            return Err(Error::PreconditionFailed(format!(
                "memory {memory_id} is not in a restorable state"
            )));
        }
        memory.forgotten_state = ForgottenState::Active;
        memory.forgotten_at = None;
        memory.forgotten_reason = None;
        self.gateway.update_memory(memory.clone()).await?;
        let correlation_id = Uuid::new_v4();
        self.audit.log(
            AuditEntry::new(AuditEventType::MemoryRestored, correlation_id)
                .with_user(&memory.user)
                .with_resource(memory_id),
        );
        if storage::eligible_for_vector_index(memory.security_tier) {
            self.enqueue_vector_upsert(&memory, correlation_id, &CancellationToken::new()).await;
        }
        Ok(())
    }

    /// `forgetPerson(user, name, opts)` (spec §4.4): forgets every memory
    /// mentioning `name`, plus (optionally) loops/events tied to that
    /// person that aren't linked to any memory.
    #[instrument(skip(self, reason))]
    pub async fn forget_person(
        &self,
        user: &str,
        name: &str,
        mode: ForgetMode,
        reason: Option<String>,
        include_unlinked: bool,
    ) -> Result<usize> {
        let canonical = canonicalize_against(self.gateway.as_ref(), user, name).await?;
        let filter = crate::storage::MemoryFilter {
            user: Some(user.to_string()),
            people: Some(vec![canonical.clone()]),
            include_forgotten: true,
            ..Default::default()
        };
        let memories = self.gateway.find_memories(&filter).await?;
        let mut count = 0usize;
        for memory in &memories {
            self.forget(&memory.id, mode, reason.clone()).await?;
            count += 1;
        }

        if include_unlinked {
            let loops = self.gateway.find_loops(user, Some(&canonical), true).await?;
            for loop_ in loops {
                if loop_.source_memory_id.is_none() {
                    self.gateway.close_loop(loop_.id, reason.clone()).await?;
                }
            }
        }

        info!(user, person = %canonical, count, "forgetPerson complete");
        Ok(count)
    }

    /// `reassociate(memoryId, edit)` (spec §4.4): updates added sets,
    /// re-scores salience (features may have changed), and refreshes the
    /// vector-store filters. `cancel` is honored at the re-embed suspension
    /// point.
    #[instrument(skip(self, edit, cancel))]
    pub async fn reassociate(
        &self,
        memory_id: &str,
        edit: &ReassociateEdit,
        context: &ScoringContext,
        cancel: &CancellationToken,
    ) -> Result<u8> {
        self.memory_locks
            .with_lock(memory_id.to_string(), || self.reassociate_locked(memory_id, edit, context, cancel))
            .await
    }

    async fn reassociate_locked(
        &self,
        memory_id: &str,
        edit: &ReassociateEdit,
        context: &ScoringContext,
        cancel: &CancellationToken,
    ) -> Result<u8> {
        let mut memory = self
            .gateway
            .get_memory(memory_id)
            .await?
            .ok_or_else(|| Error::memory_not_found(memory_id))?;

        for p in &edit.add_people {
            memory.extracted_features.people.insert(p.clone());
        }
        for p in &edit.remove_people {
            memory.extracted_features.people.remove(p);
        }
        for t in &edit.add_topics {
            memory.added_topics.insert(t.clone());
        }
        for t in &edit.remove_topics {
            memory.added_topics.remove(t);
        }
        for tag in &edit.add_tags {
            memory.added_tags.insert(tag.clone());
        }
        for tag in &edit.remove_tags {
            memory.added_tags.remove(tag);
        }
        if let Some(project) = &edit.set_project {
            memory.project_tag = project.clone();
        }

        let factors = SalienceScorer::score(&memory.text, &memory.extracted_features, context);
        memory.salience = SalienceScorer::salience_from_factors(&factors);
        memory.salience_factors = factors;

        self.gateway.update_memory(memory.clone()).await?;
        if storage::eligible_for_vector_index(memory.security_tier) {
            self.enqueue_vector_upsert(&memory, Uuid::new_v4(), cancel).await;
        }
        Ok(memory.salience)
    }

    /// `exportMemories(user)` (spec §4.4, §6).
    #[instrument(skip(self))]
    pub async fn export(&self, user: &str) -> Result<MemoryExport> {
        let filter = crate::storage::MemoryFilter {
            user: Some(user.to_string()),
            include_forgotten: true,
            ..Default::default()
        };
        let memories = self.gateway.find_memories(&filter).await?;
        let far_future = Utc::now() + chrono::Duration::days(365 * 50);
        let far_past = Utc::now() - chrono::Duration::days(365 * 50);
        let loops = self.gateway.find_loops(user, None, false).await?;
        let events = self.gateway.find_timeline_events(user, None, far_past, far_future).await?;
        let relationships = self.gateway.list_relationships(user).await?;
        Ok(MemoryExport {
            user: user.to_string(),
            exported_at: Utc::now(),
            memories,
            loops,
            events,
            relationships,
        })
    }

    /// `importMemories(export, opts)`: re-inserts a previously-exported
    /// user's state verbatim, never re-running extraction or salience
    /// (this crate's decision on the spec's `reassociate`-adjacent open
    /// question: import is a pure restore, not a re-derivation).
    #[instrument(skip(self, export))]
    pub async fn import(&self, export: &MemoryExport, opts: ImportOptions) -> Result<usize> {
        let mut imported = 0usize;
        for memory in &export.memories {
            if !opts.overwrite_existing && self.gateway.get_memory(&memory.id).await?.is_some() {
                continue;
            }
            match self.gateway.insert_memory(memory.clone()).await {
                Ok(()) => imported += 1,
                Err(Error::Conflict(_)) if opts.overwrite_existing => {
                    self.gateway.update_memory(memory.clone()).await?;
                    imported += 1;
                }
                Err(err) => return Err(err),
            }
        }
        for loop_ in &export.loops {
            self.gateway.create_loop(loop_.clone()).await.ok();
        }
        for event in &export.events {
            self.gateway.create_timeline_event(event.clone()).await.ok();
        }
        for rel in &export.relationships {
            let delta = RelationshipDelta {
                interaction_at: rel.last_interaction_at,
                sensitivities: rel.sensitivity_set.iter().cloned().collect(),
            };
            self.gateway.upsert_relationship(&rel.user, &rel.contact_name, delta).await.ok();
        }
        Ok(imported)
    }

    /// Hard-delete sweep (spec §4.1, §3): `PendingDelete` memories past
    /// `forgottenAt + hardDeleteAfterDays` are permanently removed.
    #[instrument(skip(self))]
    pub async fn sweep_hard_deletes(&self) -> Result<Vec<String>> {
        self.gateway
            .sweep_hard_deletes(Utc::now(), self.config.hard_delete_after_days)
            .await
    }
}

async fn canonicalize_people(
    gateway: &dyn PersistenceGateway,
    user: &str,
    people: &HashSet<String>,
) -> Result<HashSet<String>> {
    let mut canonicalized = HashSet::with_capacity(people.len());
    for name in people {
        canonicalized.insert(canonicalize_against(gateway, user, name).await?);
    }
    Ok(canonicalized)
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Placeholder envelope for Vault-tier memories (spec §6: encryption-at-rest
/// adapters are an external collaborator; the core only records that one
/// was applied). A real deployment swaps this for a call to that adapter.
fn envelope_placeholder(text: &str) -> Vec<u8> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish().to_le_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_keyword_routes_to_vault_tier() {
        assert_eq!(classify_security_tier("my brokerage PIN is 1234"), SecurityTier::Vault);
        assert_eq!(classify_security_tier("had coffee with Sarah"), SecurityTier::General);
    }

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  Hello   World  "), "hello world");
    }
}
