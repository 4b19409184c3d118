//! Behavioral fingerprint storage (spec §4.1, §4.8): `FINGERPRINTS_TABLE`
//! keyed by user id (one fingerprint per user).

use std::sync::Arc;

use redb::ReadableTable;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::types::BehavioralFingerprint;

use crate::tables::{FINGERPRINTS_TABLE, MAX_FINGERPRINT_SIZE};
use crate::{blocking, RedbGateway};

fn encode(fp: &BehavioralFingerprint) -> Result<Vec<u8>> {
    postcard::to_allocvec(fp).map_err(|e| Error::Internal(format!("serialize fingerprint: {e}")))
}

fn decode(bytes: &[u8]) -> Result<BehavioralFingerprint> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize fingerprint: {e}")))
}

impl RedbGateway {
    pub(crate) async fn put_fingerprint_inner(&self, fingerprint: BehavioralFingerprint) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let bytes = encode(&fingerprint)?;
            if bytes.len() as u64 > MAX_FINGERPRINT_SIZE {
                return Err(Error::Internal(format!(
                    "fingerprint for {} exceeds max stored size",
                    fingerprint.user
                )));
            }
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(FINGERPRINTS_TABLE)
                    .map_err(|e| Error::Internal(format!("open fingerprints table: {e}")))?;
                table
                    .insert(fingerprint.user.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("upsert fingerprint: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit fingerprint upsert: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn get_fingerprint_inner(&self, user: &str) -> Result<Option<BehavioralFingerprint>> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(FINGERPRINTS_TABLE)
                .map_err(|e| Error::Internal(format!("open fingerprints table: {e}")))?;
            match table.get(user.as_str()).map_err(|e| Error::Internal(format!("get fingerprint: {e}")))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub(crate) async fn list_fingerprints_inner(&self) -> Result<Vec<BehavioralFingerprint>> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(FINGERPRINTS_TABLE)
                .map_err(|e| Error::Internal(format!("open fingerprints table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate fingerprints: {e}")))?;
            for entry in iter {
                let (_, guard) = entry.map_err(|e| Error::Internal(format!("read fingerprint entry: {e}")))?;
                out.push(decode(guard.value())?);
            }
            Ok(out)
        })
        .await
    }
}
