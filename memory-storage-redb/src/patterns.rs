//! Pattern storage (spec §4.1, §4.7): `PATTERNS_TABLE` keyed by pattern id.

use std::sync::Arc;

use redb::ReadableTable;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::types::Pattern;
use uuid::Uuid;

use crate::tables::PATTERNS_TABLE;
use crate::{blocking, RedbGateway};

fn encode(pattern: &Pattern) -> Result<Vec<u8>> {
    postcard::to_allocvec(pattern).map_err(|e| Error::Internal(format!("serialize pattern: {e}")))
}

fn decode(bytes: &[u8]) -> Result<Pattern> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize pattern: {e}")))
}

impl RedbGateway {
    pub(crate) async fn put_pattern_inner(&self, pattern: Pattern) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let bytes = encode(&pattern)?;
            let key = pattern.id.to_string();
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(PATTERNS_TABLE)
                    .map_err(|e| Error::Internal(format!("open patterns table: {e}")))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("upsert pattern: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit pattern upsert: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn get_pattern_inner(&self, id: Uuid) -> Result<Option<Pattern>> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let key = id.to_string();
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(PATTERNS_TABLE)
                .map_err(|e| Error::Internal(format!("open patterns table: {e}")))?;
            match table.get(key.as_str()).map_err(|e| Error::Internal(format!("get pattern: {e}")))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub(crate) async fn list_patterns_inner(&self, user: &str) -> Result<Vec<Pattern>> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(PATTERNS_TABLE)
                .map_err(|e| Error::Internal(format!("open patterns table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate patterns: {e}")))?;
            for entry in iter {
                let (_, guard) = entry.map_err(|e| Error::Internal(format!("read pattern entry: {e}")))?;
                let pattern = decode(guard.value())?;
                if pattern.user == user {
                    out.push(pattern);
                }
            }
            Ok(out)
        })
        .await
    }
}
