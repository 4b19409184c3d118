//! In-memory [`PersistenceGateway`] fake: the same semantics as
//! `salience-memory-storage-redb`'s `RedbGateway` (idempotent loop close,
//! idempotent-on-identical-delta relationship upsert, hard-delete sweep)
//! without a database file, so core-crate tests can run in-process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::relationships::{apply, new_relationship, InteractionDelta};
use salience_memory_core::storage::{MemoryFilter, PersistenceGateway, RelationshipDelta};
use salience_memory_core::types::{
    BehavioralFingerprint, ContextFrame, ContextObservation, ForgottenState, Memory, OpenLoop,
    Pattern, Prediction, Relationship, TimelineEvent,
};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    memories: HashMap<String, Memory>,
    loops: HashMap<Uuid, OpenLoop>,
    events: HashMap<Uuid, TimelineEvent>,
    relationships: HashMap<(String, String), Relationship>,
    context_frames: HashMap<(String, String), ContextFrame>,
    patterns: HashMap<Uuid, Pattern>,
    observations: Vec<ContextObservation>,
    fingerprints: HashMap<String, BehavioralFingerprint>,
    predictions: HashMap<Uuid, Prediction>,
}

/// In-memory stand-in for a real backend, behind a single [`Mutex`] since
/// test workloads never contend on it the way a production datastore does.
#[derive(Default)]
pub struct FakeGateway {
    inner: Mutex<Inner>,
}

impl FakeGateway {
    /// An empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceGateway for FakeGateway {
    async fn insert_memory(&self, memory: Memory) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.memories.contains_key(&memory.id) {
            return Err(Error::Conflict(format!("memory {} already exists", memory.id)));
        }
        inner.memories.insert(memory.id.clone(), memory);
        Ok(())
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        Ok(self.inner.lock().memories.get(id).cloned())
    }

    async fn update_memory(&self, memory: Memory) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.memories.contains_key(&memory.id) {
            return Err(Error::memory_not_found(&memory.id));
        }
        inner.memories.insert(memory.id.clone(), memory);
        Ok(())
    }

    async fn find_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        Ok(self.inner.lock().memories.values().filter(|m| filter.matches(m)).cloned().collect())
    }

    async fn hard_delete_memory(&self, id: &str) -> Result<()> {
        self.inner.lock().memories.remove(id);
        Ok(())
    }

    async fn create_loop(&self, loop_: OpenLoop) -> Result<()> {
        self.inner.lock().loops.insert(loop_.id, loop_);
        Ok(())
    }

    async fn close_loop(&self, id: Uuid, note: Option<String>) -> Result<DateTime<Utc>> {
        let mut inner = self.inner.lock();
        let loop_ = inner.loops.get_mut(&id).ok_or_else(|| Error::loop_not_found(id))?;
        if let Some(existing) = loop_.closed_at {
            return Ok(existing);
        }
        let now = Utc::now();
        loop_.closed_at = Some(now);
        loop_.closed_note = note;
        Ok(now)
    }

    async fn get_loop(&self, id: Uuid) -> Result<Option<OpenLoop>> {
        Ok(self.inner.lock().loops.get(&id).cloned())
    }

    async fn find_loops(&self, user: &str, other_party: Option<&str>, open_only: bool) -> Result<Vec<OpenLoop>> {
        Ok(self
            .inner
            .lock()
            .loops
            .values()
            .filter(|l| {
                l.user == user
                    && (!open_only || l.closed_at.is_none())
                    && other_party.is_none_or(|party| l.other_party.as_deref() == Some(party))
            })
            .cloned()
            .collect())
    }

    async fn create_timeline_event(&self, event: TimelineEvent) -> Result<()> {
        self.inner.lock().events.insert(event.id, event);
        Ok(())
    }

    async fn find_timeline_events(
        &self,
        user: &str,
        person: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimelineEvent>> {
        let mut out: Vec<TimelineEvent> = self
            .inner
            .lock()
            .events
            .values()
            .filter(|e| {
                e.user == user
                    && e.event_date >= from
                    && e.event_date <= to
                    && person.is_none_or(|p| e.person.as_deref() == Some(p))
            })
            .cloned()
            .collect();
        out.sort_by_key(|e| e.event_date);
        Ok(out)
    }

    async fn delete_timeline_event(&self, id: Uuid) -> Result<()> {
        self.inner.lock().events.remove(&id);
        Ok(())
    }

    async fn upsert_relationship(&self, user: &str, contact_name: &str, delta: RelationshipDelta) -> Result<Relationship> {
        use salience_memory_core::constants::defaults::COLD_THRESHOLD_DAYS;

        let mut inner = self.inner.lock();
        let key = (user.to_string(), contact_name.to_string());
        let interaction_delta = InteractionDelta {
            at: delta.interaction_at,
            sensitivities: delta.sensitivities,
        };
        let rel = match inner.relationships.get_mut(&key) {
            Some(rel) => {
                if !rel.recent_interactions.contains(&delta.interaction_at) {
                    apply(rel, &interaction_delta);
                }
                rel.clone()
            }
            None => {
                let rel = new_relationship(user.to_string(), contact_name.to_string(), &interaction_delta, COLD_THRESHOLD_DAYS);
                inner.relationships.insert(key, rel.clone());
                rel
            }
        };
        Ok(rel)
    }

    async fn get_relationship(&self, user: &str, contact_name: &str) -> Result<Option<Relationship>> {
        Ok(self.inner.lock().relationships.get(&(user.to_string(), contact_name.to_string())).cloned())
    }

    async fn list_relationships(&self, user: &str) -> Result<Vec<Relationship>> {
        Ok(self.inner.lock().relationships.values().filter(|r| r.user == user).cloned().collect())
    }

    async fn put_context_frame(&self, user: &str, frame: ContextFrame) -> Result<()> {
        self.inner.lock().context_frames.insert((user.to_string(), frame.device_id.clone()), frame);
        Ok(())
    }

    async fn get_context_frame(&self, user: &str, device_id: &str) -> Result<Option<ContextFrame>> {
        Ok(self.inner.lock().context_frames.get(&(user.to_string(), device_id.to_string())).cloned())
    }

    async fn list_context_frames(&self, user: &str) -> Result<Vec<ContextFrame>> {
        Ok(self
            .inner
            .lock()
            .context_frames
            .iter()
            .filter(|((owner, _), _)| owner == user)
            .map(|(_, frame)| frame.clone())
            .collect())
    }

    async fn delete_context_frame(&self, user: &str, device_id: &str) -> Result<()> {
        self.inner.lock().context_frames.remove(&(user.to_string(), device_id.to_string()));
        Ok(())
    }

    async fn put_pattern(&self, pattern: Pattern) -> Result<()> {
        self.inner.lock().patterns.insert(pattern.id, pattern);
        Ok(())
    }

    async fn get_pattern(&self, id: Uuid) -> Result<Option<Pattern>> {
        Ok(self.inner.lock().patterns.get(&id).cloned())
    }

    async fn list_patterns(&self, user: &str) -> Result<Vec<Pattern>> {
        Ok(self.inner.lock().patterns.values().filter(|p| p.user == user).cloned().collect())
    }

    async fn append_observation(&self, obs: ContextObservation) -> Result<()> {
        self.inner.lock().observations.push(obs);
        Ok(())
    }

    async fn list_observations(&self, user: &str) -> Result<Vec<ContextObservation>> {
        Ok(self.inner.lock().observations.iter().filter(|o| o.user == user).cloned().collect())
    }

    async fn put_fingerprint(&self, fingerprint: BehavioralFingerprint) -> Result<()> {
        self.inner.lock().fingerprints.insert(fingerprint.user.clone(), fingerprint);
        Ok(())
    }

    async fn get_fingerprint(&self, user: &str) -> Result<Option<BehavioralFingerprint>> {
        Ok(self.inner.lock().fingerprints.get(user).cloned())
    }

    async fn list_fingerprints(&self) -> Result<Vec<BehavioralFingerprint>> {
        Ok(self.inner.lock().fingerprints.values().cloned().collect())
    }

    async fn put_prediction(&self, prediction: Prediction) -> Result<()> {
        self.inner.lock().predictions.insert(prediction.id, prediction);
        Ok(())
    }

    async fn get_prediction(&self, id: Uuid) -> Result<Option<Prediction>> {
        Ok(self.inner.lock().predictions.get(&id).cloned())
    }

    async fn set_pending_vector_retry(&self, memory_id: &str, pending: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let memory = inner.memories.get_mut(memory_id).ok_or_else(|| Error::memory_not_found(memory_id))?;
        memory.pending_vector_retry = pending;
        Ok(())
    }

    async fn list_pending_vector_retries(&self) -> Result<Vec<Memory>> {
        Ok(self.inner.lock().memories.values().filter(|m| m.pending_vector_retry).cloned().collect())
    }

    async fn sweep_hard_deletes(&self, now: DateTime<Utc>, hard_delete_after_days: i64) -> Result<Vec<String>> {
        let mut inner = self.inner.lock();
        let due: Vec<String> = inner
            .memories
            .values()
            .filter(|m| {
                m.forgotten_state == ForgottenState::PendingDelete
                    && m.forgotten_at.is_some_and(|at| now - at >= chrono::Duration::days(hard_delete_after_days))
            })
            .map(|m| m.id.clone())
            .collect();
        for id in &due {
            inner.memories.remove(id);
        }
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_test_memory;

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let gateway = FakeGateway::new();
        let memory = create_test_memory("sarah", "went for a run");
        let id = memory.id.clone();
        gateway.insert_memory(memory).await.unwrap();
        let fetched = gateway.get_memory(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn insert_duplicate_id_conflicts() {
        let gateway = FakeGateway::new();
        let memory = create_test_memory("sarah", "went for a run");
        gateway.insert_memory(memory.clone()).await.unwrap();
        assert!(matches!(gateway.insert_memory(memory).await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn close_loop_twice_returns_same_timestamp() {
        let gateway = FakeGateway::new();
        let loop_ = OpenLoop {
            id: Uuid::new_v4(),
            user: "sarah".into(),
            description: "send Dan the draft".into(),
            owner: salience_memory_core::types::LoopOwner::SelfOwner,
            other_party: Some("Dan".into()),
            due_date: None,
            loop_type: salience_memory_core::types::LoopType::Task,
            source_memory_id: None,
            created_at: Utc::now(),
            closed_at: None,
            closed_note: None,
        };
        gateway.create_loop(loop_.clone()).await.unwrap();
        let first = gateway.close_loop(loop_.id, Some("done".into())).await.unwrap();
        let second = gateway.close_loop(loop_.id, Some("again".into())).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn upsert_relationship_is_idempotent_on_identical_delta() {
        let gateway = FakeGateway::new();
        let at = Utc::now();
        let delta = RelationshipDelta {
            interaction_at: at,
            sensitivities: vec![],
        };
        let first = gateway.upsert_relationship("sarah", "Dan", delta.clone()).await.unwrap();
        let second = gateway.upsert_relationship("sarah", "Dan", delta).await.unwrap();
        assert_eq!(first.total_interactions, second.total_interactions);
    }
}
