//! redb-backed persistence gateway for `salience-memory-core` (spec §4.1,
//! §6): typed storage for memories, open loops, timeline events,
//! relationships, context frames, patterns, observations, behavioral
//! fingerprints, predictions, and a brute-force vector index, all behind
//! one [`RedbGateway`] implementing [`PersistenceGateway`].
//!
//! Follows the teacher's layering: one file per entity group holding
//! inherent `impl RedbGateway` methods, with the
//! [`salience_memory_core::storage::PersistenceGateway`] trait impl at the
//! bottom of this file delegating to them.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::Database;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::storage::{MemoryFilter, PersistenceGateway, RelationshipDelta};
use salience_memory_core::types::{
    BehavioralFingerprint, ContextFrame, ContextObservation, Memory, OpenLoop, Pattern,
    Prediction, Relationship, TimelineEvent,
};
use tracing::info;
use uuid::Uuid;

mod context_frames;
mod events;
mod fingerprints;
mod loops;
mod memories;
mod observations;
mod patterns;
mod predictions;
mod relationships;
mod tables;
mod vectors;

pub use vectors::RedbVectorStore;

use tables::{
    CONTEXT_FRAMES_TABLE, EVENTS_TABLE, FINGERPRINTS_TABLE, LOOPS_TABLE, MEMORIES_TABLE,
    OBSERVATIONS_TABLE, PATTERNS_TABLE, PREDICTIONS_TABLE, RELATIONSHIPS_TABLE, VECTORS_TABLE,
};

/// Run a blocking redb operation on the blocking pool, mapping join
/// failures into [`Error::Internal`]. Every gateway method funnels its
/// synchronous redb work through this so the async trait surface never
/// blocks an executor thread (spec §5 "suspension points... must be
/// cancellable").
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("datastore task join error: {e}")))?
}

/// The redb-embedded persistence gateway.
pub struct RedbGateway {
    pub(crate) db: Arc<Database>,
}

impl RedbGateway {
    /// Open (creating if absent) a redb database at `path` and ensure
    /// every table exists.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the file can't be created/opened or
    /// a table can't be initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening redb persistence gateway");
        let path_buf = path.to_path_buf();
        let db = blocking(move || {
            Database::create(&path_buf).map_err(|e| Error::Internal(format!("failed to open redb database: {e}")))
        })
        .await?;
        let gateway = Self { db: Arc::new(db) };
        gateway.initialize_tables().await?;
        Ok(gateway)
    }

    async fn initialize_tables(&self) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::Internal(format!("open memories table: {e}")))?;
                write_txn
                    .open_table(LOOPS_TABLE)
                    .map_err(|e| Error::Internal(format!("open loops table: {e}")))?;
                write_txn
                    .open_table(EVENTS_TABLE)
                    .map_err(|e| Error::Internal(format!("open events table: {e}")))?;
                write_txn
                    .open_table(RELATIONSHIPS_TABLE)
                    .map_err(|e| Error::Internal(format!("open relationships table: {e}")))?;
                write_txn
                    .open_table(CONTEXT_FRAMES_TABLE)
                    .map_err(|e| Error::Internal(format!("open context frames table: {e}")))?;
                write_txn
                    .open_table(PATTERNS_TABLE)
                    .map_err(|e| Error::Internal(format!("open patterns table: {e}")))?;
                write_txn
                    .open_table(OBSERVATIONS_TABLE)
                    .map_err(|e| Error::Internal(format!("open observations table: {e}")))?;
                write_txn
                    .open_table(FINGERPRINTS_TABLE)
                    .map_err(|e| Error::Internal(format!("open fingerprints table: {e}")))?;
                write_txn
                    .open_table(PREDICTIONS_TABLE)
                    .map_err(|e| Error::Internal(format!("open predictions table: {e}")))?;
                write_txn
                    .open_table(VECTORS_TABLE)
                    .map_err(|e| Error::Internal(format!("open vectors table: {e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::Internal(format!("commit table initialization: {e}")))?;
            Ok(())
        })
        .await?;
        info!("redb tables initialized");
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for RedbGateway {
    async fn insert_memory(&self, memory: Memory) -> Result<()> {
        self.insert_memory_inner(memory).await
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        self.get_memory_inner(id).await
    }

    async fn update_memory(&self, memory: Memory) -> Result<()> {
        self.update_memory_inner(memory).await
    }

    async fn find_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        self.find_memories_inner(filter).await
    }

    async fn hard_delete_memory(&self, id: &str) -> Result<()> {
        self.hard_delete_memory_inner(id).await
    }

    async fn create_loop(&self, loop_: OpenLoop) -> Result<()> {
        self.create_loop_inner(loop_).await
    }

    async fn close_loop(&self, id: Uuid, note: Option<String>) -> Result<DateTime<Utc>> {
        self.close_loop_inner(id, note).await
    }

    async fn get_loop(&self, id: Uuid) -> Result<Option<OpenLoop>> {
        self.get_loop_inner(id).await
    }

    async fn find_loops(&self, user: &str, other_party: Option<&str>, open_only: bool) -> Result<Vec<OpenLoop>> {
        self.find_loops_inner(user, other_party, open_only).await
    }

    async fn create_timeline_event(&self, event: TimelineEvent) -> Result<()> {
        self.create_timeline_event_inner(event).await
    }

    async fn find_timeline_events(
        &self,
        user: &str,
        person: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimelineEvent>> {
        self.find_timeline_events_inner(user, person, from, to).await
    }

    async fn delete_timeline_event(&self, id: Uuid) -> Result<()> {
        self.delete_timeline_event_inner(id).await
    }

    async fn upsert_relationship(&self, user: &str, contact_name: &str, delta: RelationshipDelta) -> Result<Relationship> {
        self.upsert_relationship_inner(user, contact_name, delta).await
    }

    async fn get_relationship(&self, user: &str, contact_name: &str) -> Result<Option<Relationship>> {
        self.get_relationship_inner(user, contact_name).await
    }

    async fn list_relationships(&self, user: &str) -> Result<Vec<Relationship>> {
        self.list_relationships_inner(user).await
    }

    async fn put_context_frame(&self, user: &str, frame: ContextFrame) -> Result<()> {
        self.put_context_frame_inner(user, frame).await
    }

    async fn get_context_frame(&self, user: &str, device_id: &str) -> Result<Option<ContextFrame>> {
        self.get_context_frame_inner(user, device_id).await
    }

    async fn list_context_frames(&self, user: &str) -> Result<Vec<ContextFrame>> {
        self.list_context_frames_inner(user).await
    }

    async fn delete_context_frame(&self, user: &str, device_id: &str) -> Result<()> {
        self.delete_context_frame_inner(user, device_id).await
    }

    async fn put_pattern(&self, pattern: Pattern) -> Result<()> {
        self.put_pattern_inner(pattern).await
    }

    async fn get_pattern(&self, id: Uuid) -> Result<Option<Pattern>> {
        self.get_pattern_inner(id).await
    }

    async fn list_patterns(&self, user: &str) -> Result<Vec<Pattern>> {
        self.list_patterns_inner(user).await
    }

    async fn append_observation(&self, obs: ContextObservation) -> Result<()> {
        self.append_observation_inner(obs).await
    }

    async fn list_observations(&self, user: &str) -> Result<Vec<ContextObservation>> {
        self.list_observations_inner(user).await
    }

    async fn put_fingerprint(&self, fingerprint: BehavioralFingerprint) -> Result<()> {
        self.put_fingerprint_inner(fingerprint).await
    }

    async fn get_fingerprint(&self, user: &str) -> Result<Option<BehavioralFingerprint>> {
        self.get_fingerprint_inner(user).await
    }

    async fn list_fingerprints(&self) -> Result<Vec<BehavioralFingerprint>> {
        self.list_fingerprints_inner().await
    }

    async fn put_prediction(&self, prediction: Prediction) -> Result<()> {
        self.put_prediction_inner(prediction).await
    }

    async fn get_prediction(&self, id: Uuid) -> Result<Option<Prediction>> {
        self.get_prediction_inner(id).await
    }

    async fn set_pending_vector_retry(&self, memory_id: &str, pending: bool) -> Result<()> {
        self.set_pending_vector_retry_inner(memory_id, pending).await
    }

    async fn list_pending_vector_retries(&self) -> Result<Vec<Memory>> {
        self.list_pending_vector_retries_inner().await
    }

    async fn sweep_hard_deletes(&self, now: DateTime<Utc>, hard_delete_after_days: i64) -> Result<Vec<String>> {
        self.sweep_hard_deletes_inner(now, hard_delete_after_days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_initializes_all_tables() {
        let dir = tempdir().expect("tempdir");
        let gateway = RedbGateway::open(&dir.path().join("test.redb")).await.expect("open");
        assert!(gateway.get_memory("missing").await.expect("get").is_none());
    }
}
