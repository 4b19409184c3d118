//! Service facade (spec §6): wires C1-C9 together behind the tool-style
//! operation surface (`storeMemory`, `recall`, `getBriefing`, ...) so a
//! transport adapter (HTTP, MCP, CLI) has one thing to hold onto.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::anticipation::{AnticipationEngine, AnticipationResult, DayOutlook};
use crate::audit::AuditLogger;
use crate::briefing::{BriefingService, DailyStatus, PersonBriefing, StatusSummary};
use crate::concurrency::ProviderGate;
use crate::config::MemoryConfig;
use crate::context::{ClearDimensions, ContextFrameManager, ContextUpdate};
use crate::enrichment::{EnrichmentPipeline, ImportOptions, MemoryExport, ReassociateEdit, StoreOutcome};
use crate::error::Result;
use crate::extraction::FeatureExtractor;
use crate::identity::{IdentificationResult, IdentityEngine, MessageSample};
use crate::providers::{Embedder, LLMProvider, VectorStore};
use crate::retrieval::{MemoryVote, RecallHit, RecallQuery, RetrievalEngine};
use crate::salience::ScoringContext;
use crate::storage::PersistenceGateway;
use crate::types::{
    BehavioralFingerprint, CalendarEvent, ContextFrame, DeviceType, OpenLoop, Pattern,
    PatternFeedbackAction, PatternStatus, Prediction, RelevanceSnapshot, UnifiedUserContext,
};

/// A registered device, as surfaced by `listDevices` (spec §6).
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    /// Device id.
    pub device_id: String,
    /// Device kind.
    pub device_type: DeviceType,
    /// Last time any dimension on this device's frame was updated.
    pub last_updated: DateTime<Utc>,
}

/// Everything needed to score a memory's novelty/relevance/social
/// factors, gathered fresh for every `storeMemory`/`reassociate` call
/// (spec §4.3: factors read the live context frame, recent memories, and
/// relationships — never a stale snapshot).
async fn build_scoring_context<G: PersistenceGateway>(
    gateway: &G,
    user: &str,
    device_id: Option<&str>,
) -> Result<ScoringContext> {
    let now = Utc::now();
    let window_start = now - chrono::Duration::days(30);
    let filter = crate::storage::MemoryFilter {
        user: Some(user.to_string()),
        time_range: Some((window_start, now)),
        ..Default::default()
    };
    let recent_memories = gateway.find_memories(&filter).await?;
    let relationships = gateway.list_relationships(user).await?;

    let (context_people, context_topics, context_activity) = match device_id {
        Some(device_id) => match gateway.get_context_frame(user, device_id).await? {
            Some(frame) => (
                frame.people.map(|d| d.value).unwrap_or_default(),
                HashSet::new(),
                frame.activity.map(|d| d.value),
            ),
            None => (HashSet::new(), HashSet::new(), None),
        },
        None => (HashSet::new(), HashSet::new(), None),
    };

    Ok(ScoringContext {
        context_people,
        context_topics,
        context_activity,
        recent_memories,
        relationships,
        now,
    })
}

/// The whole salience-memory system behind one handle, generic over the
/// persistence gateway and the two optional providers (embedder, vector
/// store). The LLM provider is owned by the extractor internally.
pub struct MemoryService<G, E, V> {
    gateway: Arc<G>,
    config: MemoryConfig,
    enrichment: EnrichmentPipeline<G, E, V>,
    retrieval: Arc<RetrievalEngine<G, E, V>>,
    context: ContextFrameManager<G>,
    briefing: BriefingService<G>,
    anticipation: AnticipationEngine<G, E, V>,
    identity: IdentityEngine<G>,
    llm_gate: Arc<ProviderGate>,
    embedder_gate: Arc<ProviderGate>,
}

impl<G, E, V> MemoryService<G, E, V>
where
    G: PersistenceGateway + 'static,
    E: Embedder + 'static,
    V: VectorStore + 'static,
{
    /// Assemble a service from its collaborators. `llm` is `None` for a
    /// heuristic-only deployment; `embedder`/`vector_store` are `None` for
    /// a metadata-only deployment (spec §7 fallback paths).
    #[must_use]
    pub fn new(
        gateway: Arc<G>,
        llm: Option<Arc<dyn LLMProvider>>,
        embedder: Option<Arc<E>>,
        vector_store: Option<Arc<V>>,
        config: MemoryConfig,
    ) -> Self {
        let audit = if config.audit_enabled { AuditLogger::enabled() } else { AuditLogger::disabled() };
        let llm_gate = Arc::new(ProviderGate::new(config.provider_concurrency, config.provider_queue_depth));
        let embedder_gate = Arc::new(ProviderGate::new(config.provider_concurrency, config.provider_queue_depth));
        let extractor = FeatureExtractor::new(llm, config.llm_timeout, llm_gate.clone());
        let enrichment = EnrichmentPipeline::new(
            gateway.clone(),
            extractor,
            embedder.clone(),
            vector_store.clone(),
            config.clone(),
            embedder_gate.clone(),
        )
        .with_audit(audit.clone());
        let retrieval = Arc::new(RetrievalEngine::new(
            gateway.clone(),
            embedder,
            vector_store,
            config.embedder_timeout,
            config.vector_store_timeout,
            embedder_gate.clone(),
        ));
        let context = ContextFrameManager::new(gateway.clone(), config.max_devices_per_user, config.unified_fusion_window_min);
        let briefing = BriefingService::new(gateway.clone());
        let anticipation = AnticipationEngine::new(gateway.clone(), retrieval.clone(), config.clone());
        let identity = IdentityEngine::new(gateway.clone(), config.clone()).with_audit(audit);

        Self {
            gateway,
            config,
            enrichment,
            retrieval,
            context,
            briefing,
            anticipation,
            identity,
            llm_gate,
            embedder_gate,
        }
    }

    /// `storeMemory({text, context?, useLLM?})` (spec §6). `cancel` is
    /// honored at every provider suspension point this call reaches (spec
    /// §5 "every long operation threads a cancellation handle").
    #[instrument(skip(self, text, known_people, cancel))]
    pub async fn store_memory(
        &self,
        user: &str,
        text: &str,
        known_people: &HashSet<String>,
        device_id: Option<&str>,
        use_llm: bool,
        cancel: &CancellationToken,
    ) -> Result<StoreOutcome> {
        let scoring_context = build_scoring_context(self.gateway.as_ref(), user, device_id).await?;
        self.enrichment.store(user, text, known_people, &scoring_context, use_llm, cancel).await
    }

    /// `recall({query, limit?, person?, minSalience?})` (spec §6). `cancel`
    /// is honored at the embedder/vector-store suspension points.
    #[instrument(skip(self, query, cancel))]
    pub async fn recall(&self, user: &str, query: &RecallQuery, cancel: &CancellationToken) -> Result<Vec<RecallHit>> {
        self.retrieval.recall(user, query, cancel).await
    }

    /// `voteOnMemories(votes)` (spec §4.5), reachable from the same
    /// retrieval surface as `recall`.
    #[instrument(skip(self, votes))]
    pub async fn vote_on_memories(&self, votes: &[MemoryVote]) -> Result<Vec<u8>> {
        self.retrieval.vote_on_memories(votes).await
    }

    /// `getBriefing({person, quick?})` (spec §6).
    #[instrument(skip(self))]
    pub async fn get_briefing(&self, user: &str, person: &str, quick: bool) -> Result<PersonBriefing> {
        self.briefing.person_briefing(user, person, quick).await
    }

    /// `listLoops({owner?, person?, includeOverdue?})` (spec §6).
    #[instrument(skip(self))]
    pub async fn list_loops(
        &self,
        user: &str,
        person: Option<&str>,
        owner: Option<crate::types::LoopOwner>,
        include_overdue_only: bool,
    ) -> Result<Vec<OpenLoop>> {
        self.briefing.list_loops(user, person, owner, include_overdue_only).await
    }

    /// `closeLoop({loopId, note?})` (spec §6).
    #[instrument(skip(self, note))]
    pub async fn close_loop(&self, loop_id: Uuid, note: Option<String>) -> Result<DateTime<Utc>> {
        self.briefing.close_loop(loop_id, note).await
    }

    /// `setContext({location?, people?, activity?, deviceId?, deviceType?})`
    /// (spec §6). Also feeds the anticipation engine's observation ledger,
    /// matching spec §4.7's "whenever a frame is set, emit a
    /// ContextObservation".
    #[instrument(skip(self, update))]
    pub async fn set_context(
        &self,
        user: &str,
        device_id: &str,
        device_type: DeviceType,
        update: &ContextUpdate,
    ) -> Result<(ContextFrame, RelevanceSnapshot)> {
        let (frame, snapshot) = self.context.set_context(user, device_id, device_type, update).await?;
        if let Err(err) = self.anticipation.observe(user, &frame).await {
            tracing::warn!(%err, user, "failed to record context observation");
        }
        Ok((frame, snapshot))
    }

    /// `whatsRelevant({deviceId?, unified?})` (spec §6).
    #[instrument(skip(self))]
    pub async fn whats_relevant(
        &self,
        user: &str,
        device_id: Option<&str>,
        unified: bool,
    ) -> Result<(Option<UnifiedUserContext>, Option<(ContextFrame, RelevanceSnapshot)>)> {
        let unified_context = if unified { Some(self.context.unified_context(user).await?) } else { None };
        let device_context = self.context.what_matters_now(user, device_id).await?;
        Ok((unified_context, device_context))
    }

    /// `clearContext({dimensions?, deviceId?})` (spec §6).
    #[instrument(skip(self))]
    pub async fn clear_context(
        &self,
        user: &str,
        device_id: Option<&str>,
        dimensions: ClearDimensions,
    ) -> Result<Option<ContextFrame>> {
        self.context.clear_context(user, device_id, dimensions).await
    }

    /// `listDevices({})` (spec §6).
    #[instrument(skip(self))]
    pub async fn list_devices(&self, user: &str) -> Result<Vec<DeviceSummary>> {
        let frames = self.gateway.list_context_frames(user).await?;
        Ok(frames
            .into_iter()
            .map(|f| DeviceSummary {
                device_id: f.device_id,
                device_type: f.device_type,
                last_updated: f.last_updated,
            })
            .collect())
    }

    /// `forget(memoryId, mode, reason?)` (spec §4.4, §6).
    #[instrument(skip(self, reason))]
    pub async fn forget(&self, memory_id: &str, mode: crate::types::ForgetMode, reason: Option<String>) -> Result<()> {
        self.enrichment.forget(memory_id, mode, reason).await
    }

    /// `forgetPerson(user, name, mode, reason?, includeUnlinked?)` (spec §4.4, §6).
    #[instrument(skip(self, reason))]
    pub async fn forget_person(
        &self,
        user: &str,
        name: &str,
        mode: crate::types::ForgetMode,
        reason: Option<String>,
        include_unlinked: bool,
    ) -> Result<usize> {
        self.enrichment.forget_person(user, name, mode, reason, include_unlinked).await
    }

    /// `restore(memoryId)` (spec §4.4, §6).
    #[instrument(skip(self))]
    pub async fn restore(&self, memory_id: &str) -> Result<()> {
        self.enrichment.restore(memory_id).await
    }

    /// `reassociate(memoryId, edit)` (spec §4.4, §6). `cancel` is honored
    /// at the re-embed suspension point.
    #[instrument(skip(self, edit, cancel))]
    pub async fn reassociate(
        &self,
        user: &str,
        memory_id: &str,
        edit: &ReassociateEdit,
        device_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<u8> {
        let scoring_context = build_scoring_context(self.gateway.as_ref(), user, device_id).await?;
        self.enrichment.reassociate(memory_id, edit, &scoring_context, cancel).await
    }

    /// `exportMemories(user)` (spec §4.4, §6).
    #[instrument(skip(self))]
    pub async fn export_memories(&self, user: &str) -> Result<MemoryExport> {
        self.enrichment.export(user).await
    }

    /// `importMemories(export, opts)`: ambient-stack supplement alongside
    /// `exportMemories` (not part of the external-interfaces table, but
    /// its natural inverse; see [`crate::enrichment::EnrichmentPipeline::import`]).
    #[instrument(skip(self, export))]
    pub async fn import_memories(&self, export: &MemoryExport, opts: ImportOptions) -> Result<usize> {
        self.enrichment.import(export, opts).await
    }

    /// Background hard-delete sweep (spec §4.1, §3), intended to run on a timer.
    #[instrument(skip(self))]
    pub async fn sweep_hard_deletes(&self) -> Result<Vec<String>> {
        self.enrichment.sweep_hard_deletes().await
    }

    /// Background pending-vector reconciler (spec §4.1), intended to run on a timer.
    #[instrument(skip(self))]
    pub async fn reconcile_pending_vectors(&self) -> Result<usize> {
        self.enrichment.reconcile_pending_vectors().await
    }

    /// `anticipate(user, calendar?, lookAheadMinutes?)` (spec §4.7, §6).
    #[instrument(skip(self, calendar))]
    pub async fn anticipate(&self, user: &str, calendar: &[CalendarEvent], look_ahead_minutes: i64) -> Result<AnticipationResult> {
        self.anticipation.anticipate(user, calendar, look_ahead_minutes).await
    }

    /// `dayOutlook(user, calendar?)` (spec §4.7, §6).
    #[instrument(skip(self, calendar))]
    pub async fn day_outlook(&self, user: &str, calendar: &[CalendarEvent]) -> Result<DayOutlook> {
        self.anticipation.day_outlook(user, calendar).await
    }

    /// `patternStats(user)` (spec §6).
    #[instrument(skip(self))]
    pub async fn pattern_stats(&self, user: &str) -> Result<Vec<(Pattern, PatternStatus)>> {
        self.anticipation.pattern_stats(user).await
    }

    /// The table's `memoryFeedback` entry for the C8 group: feedback on a
    /// surfaced [`Pattern`] (used/ignored/dismissed), not on a memory's
    /// salience — that's `voteOnMemories` (spec §4.7).
    #[instrument(skip(self))]
    pub async fn pattern_feedback(&self, pattern_id: Uuid, action: PatternFeedbackAction) -> Result<Option<Pattern>> {
        self.anticipation.pattern_feedback(pattern_id, action).await
    }

    /// Scheduled pattern-formation pass (spec §4.7), intended to run hourly.
    #[instrument(skip(self))]
    pub async fn form_patterns(&self, user: &str) -> Result<usize> {
        self.anticipation.form_patterns(user).await
    }

    /// `identifyUser(message, candidates?)` (spec §4.8, §6).
    #[instrument(skip(self, sample, candidates))]
    pub async fn identify_user(&self, sample: &MessageSample<'_>, candidates: Option<&[String]>) -> Result<IdentificationResult> {
        self.identity.identify_user(sample, candidates).await
    }

    /// `behavioralFeedback(predictionId, correct, actualUserId?)` (spec §4.8, §6).
    #[instrument(skip(self, sample))]
    pub async fn behavioral_feedback(
        &self,
        prediction_id: Uuid,
        correct: bool,
        actual_user: Option<&str>,
        sample: &MessageSample<'_>,
    ) -> Result<()> {
        self.identity.behavioral_feedback(prediction_id, correct, actual_user, sample).await
    }

    /// `behavioralMetrics(user)` (spec §6).
    #[instrument(skip(self))]
    pub async fn behavioral_metrics(&self, user: &str) -> Result<Option<(BehavioralFingerprint, bool)>> {
        self.identity.behavioral_metrics(user).await
    }

    /// Records a message sample into `user`'s fingerprint without running
    /// identification (used when the author is already known, e.g. the
    /// authenticated caller of `storeMemory`).
    #[instrument(skip(self, sample))]
    pub async fn record_behavioral_sample(&self, user: &str, sample: &MessageSample<'_>) -> Result<BehavioralFingerprint> {
        self.identity.record_sample(user, sample).await
    }

    /// Fetch a single stored prediction, e.g. to show the caller what
    /// `identifyUser` returned before they submit feedback.
    #[instrument(skip(self))]
    pub async fn get_prediction(&self, id: Uuid) -> Result<Option<Prediction>> {
        self.gateway.get_prediction(id).await
    }

    /// `getStatus({})` (spec §6).
    #[instrument(skip(self))]
    pub async fn get_status(&self, user: &str) -> Result<StatusSummary> {
        self.briefing.status(user).await
    }

    /// `dayOutlook`'s non-anticipation half (greeting, loops/events due
    /// today); callers combine this with [`Self::day_outlook`] for the
    /// full response.
    #[instrument(skip(self))]
    pub async fn daily_status(&self, user: &str) -> Result<DailyStatus> {
        self.briefing.daily_status(user).await
    }

    /// The LLM backpressure gate live on every `storeMemory(useLLM=true)`
    /// call, surfaced for callers building their own admission metrics.
    #[must_use]
    pub fn llm_gate(&self) -> &ProviderGate {
        &self.llm_gate
    }

    /// The embedder backpressure gate live on every `storeMemory`,
    /// `recall`, and `reassociate` call that reaches the embedder (spec §5).
    #[must_use]
    pub fn embedder_gate(&self) -> &ProviderGate {
        &self.embedder_gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_summary_carries_device_type() {
        let summary = DeviceSummary {
            device_id: "d1".into(),
            device_type: DeviceType::Mobile,
            last_updated: Utc::now(),
        };
        assert_eq!(summary.device_type, DeviceType::Mobile);
    }
}
