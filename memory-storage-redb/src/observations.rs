//! Context-observation ledger (spec §4.1, §4.7): `OBSERVATIONS_TABLE`
//! keyed by `"{user}\0{observed_at_nanos:020}\0{uuid}"` so insertion order
//! within a user is recoverable by key order alone, while the trailing
//! uuid keeps same-instant observations from colliding.

use std::sync::Arc;

use redb::ReadableTable;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::types::ContextObservation;
use uuid::Uuid;

use crate::tables::OBSERVATIONS_TABLE;
use crate::{blocking, RedbGateway};

fn encode(obs: &ContextObservation) -> Result<Vec<u8>> {
    postcard::to_allocvec(obs).map_err(|e| Error::Internal(format!("serialize observation: {e}")))
}

fn decode(bytes: &[u8]) -> Result<ContextObservation> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize observation: {e}")))
}

fn key(user: &str, observed_at_nanos: i64, id: Uuid) -> String {
    format!("{user}\0{observed_at_nanos:020}\0{id}")
}

impl RedbGateway {
    pub(crate) async fn append_observation_inner(&self, obs: ContextObservation) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let bytes = encode(&obs)?;
            let nanos = obs.observed_at.timestamp_nanos_opt().unwrap_or(obs.observed_at.timestamp());
            let key = key(&obs.user, nanos, Uuid::new_v4());
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(OBSERVATIONS_TABLE)
                    .map_err(|e| Error::Internal(format!("open observations table: {e}")))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("append observation: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit observation append: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn list_observations_inner(&self, user: &str) -> Result<Vec<ContextObservation>> {
        let db = Arc::clone(&self.db);
        let prefix = format!("{user}\0");
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(OBSERVATIONS_TABLE)
                .map_err(|e| Error::Internal(format!("open observations table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate observations: {e}")))?;
            for entry in iter {
                let (k, guard) = entry.map_err(|e| Error::Internal(format!("read observation entry: {e}")))?;
                if k.value().starts_with(&prefix) {
                    out.push(decode(guard.value())?);
                }
            }
            Ok(out)
        })
        .await
    }
}
