//! Context frame storage (spec §4.1, §4.6): `CONTEXT_FRAMES_TABLE` keyed
//! by `"{user}\0{device_id}"`.

use std::sync::Arc;

use redb::ReadableTable;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::types::ContextFrame;

use crate::tables::CONTEXT_FRAMES_TABLE;
use crate::{blocking, RedbGateway};

fn key(user: &str, device_id: &str) -> String {
    format!("{user}\0{device_id}")
}

fn encode(frame: &ContextFrame) -> Result<Vec<u8>> {
    postcard::to_allocvec(frame).map_err(|e| Error::Internal(format!("serialize context frame: {e}")))
}

fn decode(bytes: &[u8]) -> Result<ContextFrame> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize context frame: {e}")))
}

impl RedbGateway {
    pub(crate) async fn put_context_frame_inner(&self, user: &str, frame: ContextFrame) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = key(user, &frame.device_id);
        blocking(move || {
            let bytes = encode(&frame)?;
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(CONTEXT_FRAMES_TABLE)
                    .map_err(|e| Error::Internal(format!("open context frames table: {e}")))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("upsert context frame: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit context frame upsert: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn get_context_frame_inner(&self, user: &str, device_id: &str) -> Result<Option<ContextFrame>> {
        let db = Arc::clone(&self.db);
        let key = key(user, device_id);
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(CONTEXT_FRAMES_TABLE)
                .map_err(|e| Error::Internal(format!("open context frames table: {e}")))?;
            match table.get(key.as_str()).map_err(|e| Error::Internal(format!("get context frame: {e}")))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub(crate) async fn list_context_frames_inner(&self, user: &str) -> Result<Vec<ContextFrame>> {
        let db = Arc::clone(&self.db);
        let prefix = format!("{user}\0");
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(CONTEXT_FRAMES_TABLE)
                .map_err(|e| Error::Internal(format!("open context frames table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate context frames: {e}")))?;
            for entry in iter {
                let (k, guard) = entry.map_err(|e| Error::Internal(format!("read context frame entry: {e}")))?;
                if k.value().starts_with(&prefix) {
                    out.push(decode(guard.value())?);
                }
            }
            Ok(out)
        })
        .await
    }

    pub(crate) async fn delete_context_frame_inner(&self, user: &str, device_id: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = key(user, device_id);
        blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(CONTEXT_FRAMES_TABLE)
                    .map_err(|e| Error::Internal(format!("open context frames table: {e}")))?;
                table
                    .remove(key.as_str())
                    .map_err(|e| Error::Internal(format!("delete context frame: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit context frame delete: {e}")))?;
            Ok(())
        })
        .await
    }
}
