//! Memory storage (spec §4.1): the `MEMORIES_TABLE` keyed by memory id.
//!
//! `find_memories` is a full-table scan filtered by
//! [`MemoryFilter::matches`] rather than a hand-rolled compound index —
//! the teacher's own `query_episodes_since` takes the same approach
//! (scan + filter, with a doc-comment admitting it doesn't scale past one
//! cache's worth of data) rather than building redb composite-key
//! indexes for every filter combination. The spec's "index discipline"
//! bullet is a deployment concern for a real query planner; this
//! embedded backend documents the gap instead of faking an index.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::storage::MemoryFilter;
use salience_memory_core::types::Memory;
use tracing::debug;

use crate::tables::{MAX_MEMORY_SIZE, MEMORIES_TABLE};
use crate::{blocking, RedbGateway};

fn encode(memory: &Memory) -> Result<Vec<u8>> {
    postcard::to_allocvec(memory).map_err(|e| Error::Internal(format!("serialize memory: {e}")))
}

fn decode(bytes: &[u8]) -> Result<Memory> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize memory: {e}")))
}

impl RedbGateway {
    pub(crate) async fn insert_memory_inner(&self, memory: Memory) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let bytes = encode(&memory)?;
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::Internal(format!("open memories table: {e}")))?;
                if table
                    .get(memory.id.as_str())
                    .map_err(|e| Error::Internal(format!("check memory existence: {e}")))?
                    .is_some()
                {
                    return Err(Error::Conflict(format!("memory {} already exists", memory.id)));
                }
                table
                    .insert(memory.id.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("insert memory: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit memory insert: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn get_memory_inner(&self, id: &str) -> Result<Option<Memory>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::Internal(format!("open memories table: {e}")))?;
            match table.get(id.as_str()).map_err(|e| Error::Internal(format!("get memory: {e}")))? {
                Some(guard) => {
                    let bytes = guard.value();
                    if bytes.len() as u64 > MAX_MEMORY_SIZE {
                        return Err(Error::Internal(format!("memory {id} exceeds max stored size")));
                    }
                    Ok(Some(decode(bytes)?))
                }
                None => Ok(None),
            }
        })
        .await
    }

    pub(crate) async fn update_memory_inner(&self, memory: Memory) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let bytes = encode(&memory)?;
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::Internal(format!("open memories table: {e}")))?;
                if table
                    .get(memory.id.as_str())
                    .map_err(|e| Error::Internal(format!("check memory existence: {e}")))?
                    .is_none()
                {
                    return Err(Error::memory_not_found(&memory.id));
                }
                table
                    .insert(memory.id.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("update memory: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit memory update: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn find_memories_inner(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        let db = Arc::clone(&self.db);
        let filter = filter.clone();
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::Internal(format!("open memories table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate memories: {e}")))?;
            for entry in iter {
                let (_, guard) = entry.map_err(|e| Error::Internal(format!("read memory entry: {e}")))?;
                let memory = decode(guard.value())?;
                if filter.matches(&memory) {
                    out.push(memory);
                }
            }
            Ok(out)
        })
        .await
    }

    pub(crate) async fn hard_delete_memory_inner(&self, id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::Internal(format!("open memories table: {e}")))?;
                table.remove(id.as_str()).map_err(|e| Error::Internal(format!("hard delete memory: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit hard delete: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn set_pending_vector_retry_inner(&self, memory_id: &str, pending: bool) -> Result<()> {
        let mut memory = self
            .get_memory_inner(memory_id)
            .await?
            .ok_or_else(|| Error::memory_not_found(memory_id))?;
        memory.pending_vector_retry = pending;
        self.update_memory_inner(memory).await
    }

    pub(crate) async fn list_pending_vector_retries_inner(&self) -> Result<Vec<Memory>> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::Internal(format!("open memories table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate memories: {e}")))?;
            for entry in iter {
                let (_, guard) = entry.map_err(|e| Error::Internal(format!("read memory entry: {e}")))?;
                let memory = decode(guard.value())?;
                if memory.pending_vector_retry {
                    out.push(memory);
                }
            }
            Ok(out)
        })
        .await
    }

    pub(crate) async fn sweep_hard_deletes_inner(&self, now: DateTime<Utc>, hard_delete_after_days: i64) -> Result<Vec<String>> {
        use salience_memory_core::types::ForgottenState;

        let db = Arc::clone(&self.db);
        let deleted = blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            let mut deleted = Vec::new();
            {
                let mut table = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::Internal(format!("open memories table: {e}")))?;
                let due: Vec<String> = {
                    let iter = table.iter().map_err(|e| Error::Internal(format!("iterate memories: {e}")))?;
                    let mut due = Vec::new();
                    for entry in iter {
                        let (key, guard) = entry.map_err(|e| Error::Internal(format!("read memory entry: {e}")))?;
                        let memory = decode(guard.value())?;
                        let overdue = memory.forgotten_state == ForgottenState::PendingDelete
                            && memory
                                .forgotten_at
                                .is_some_and(|at| now - at >= chrono::Duration::days(hard_delete_after_days));
                        if overdue {
                            due.push(key.value().to_string());
                        }
                    }
                    due
                };
                for id in &due {
                    table.remove(id.as_str()).map_err(|e| Error::Internal(format!("hard delete memory: {e}")))?;
                    deleted.push(id.clone());
                }
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit hard-delete sweep: {e}")))?;
            Ok(deleted)
        })
        .await?;
        if !deleted.is_empty() {
            debug!(count = deleted.len(), "hard-deleted pending-delete memories past their timer");
        }
        Ok(deleted)
    }
}
