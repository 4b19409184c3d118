//! Open loop storage (spec §4.1): `LOOPS_TABLE` keyed by loop id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::types::OpenLoop;
use uuid::Uuid;

use crate::tables::{LOOPS_TABLE, MAX_LOOP_SIZE};
use crate::{blocking, RedbGateway};

fn encode(loop_: &OpenLoop) -> Result<Vec<u8>> {
    postcard::to_allocvec(loop_).map_err(|e| Error::Internal(format!("serialize loop: {e}")))
}

fn decode(bytes: &[u8]) -> Result<OpenLoop> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize loop: {e}")))
}

impl RedbGateway {
    pub(crate) async fn create_loop_inner(&self, loop_: OpenLoop) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let bytes = encode(&loop_)?;
            let key = loop_.id.to_string();
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(LOOPS_TABLE)
                    .map_err(|e| Error::Internal(format!("open loops table: {e}")))?;
                table.insert(key.as_str(), bytes.as_slice()).map_err(|e| Error::Internal(format!("insert loop: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit loop insert: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn close_loop_inner(&self, id: Uuid, note: Option<String>) -> Result<DateTime<Utc>> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let key = id.to_string();
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            let closed_at = {
                let mut table = write_txn
                    .open_table(LOOPS_TABLE)
                    .map_err(|e| Error::Internal(format!("open loops table: {e}")))?;
                let bytes = table
                    .get(key.as_str())
                    .map_err(|e| Error::Internal(format!("get loop: {e}")))?
                    .ok_or_else(|| Error::loop_not_found(id))?;
                if bytes.value().len() as u64 > MAX_LOOP_SIZE {
                    return Err(Error::Internal(format!("loop {id} exceeds max stored size")));
                }
                let mut loop_ = decode(bytes.value())?;
                drop(bytes);
                // Double-close is a no-op returning the prior closed_at (spec §4.1).
                let closed_at = match loop_.closed_at {
                    Some(existing) => existing,
                    None => {
                        let now = Utc::now();
                        loop_.closed_at = Some(now);
                        loop_.closed_note = note;
                        let updated = encode(&loop_)?;
                        table
                            .insert(key.as_str(), updated.as_slice())
                            .map_err(|e| Error::Internal(format!("update loop: {e}")))?;
                        now
                    }
                };
                closed_at
            };
            write_txn.commit().map_err(|e| Error::Internal(format!("commit loop close: {e}")))?;
            Ok(closed_at)
        })
        .await
    }

    pub(crate) async fn get_loop_inner(&self, id: Uuid) -> Result<Option<OpenLoop>> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let key = id.to_string();
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(LOOPS_TABLE)
                .map_err(|e| Error::Internal(format!("open loops table: {e}")))?;
            match table.get(key.as_str()).map_err(|e| Error::Internal(format!("get loop: {e}")))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub(crate) async fn find_loops_inner(&self, user: &str, other_party: Option<&str>, open_only: bool) -> Result<Vec<OpenLoop>> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        let other_party = other_party.map(str::to_string);
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(LOOPS_TABLE)
                .map_err(|e| Error::Internal(format!("open loops table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate loops: {e}")))?;
            for entry in iter {
                let (_, guard) = entry.map_err(|e| Error::Internal(format!("read loop entry: {e}")))?;
                let loop_ = decode(guard.value())?;
                if loop_.user != user {
                    continue;
                }
                if open_only && loop_.closed_at.is_some() {
                    continue;
                }
                if let Some(party) = &other_party {
                    if loop_.other_party.as_deref() != Some(party.as_str()) {
                        continue;
                    }
                }
                out.push(loop_);
            }
            Ok(out)
        })
        .await
    }
}
