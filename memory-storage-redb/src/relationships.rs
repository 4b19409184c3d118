//! Relationship storage (spec §4.1): `RELATIONSHIPS_TABLE` keyed by
//! `"{user}\0{contact_name}"`. The trend arithmetic itself lives in
//! [`salience_memory_core::relationships`]; this module only owns
//! persistence and the idempotent-on-identical-delta check.

use std::sync::Arc;

use salience_memory_core::constants::defaults::COLD_THRESHOLD_DAYS;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::relationships::{apply, new_relationship, InteractionDelta};
use salience_memory_core::storage::RelationshipDelta;
use salience_memory_core::types::Relationship;
use redb::ReadableTable;

use crate::tables::RELATIONSHIPS_TABLE;
use crate::{blocking, RedbGateway};

fn key(user: &str, contact_name: &str) -> String {
    format!("{user}\0{contact_name}")
}

fn encode(rel: &Relationship) -> Result<Vec<u8>> {
    postcard::to_allocvec(rel).map_err(|e| Error::Internal(format!("serialize relationship: {e}")))
}

fn decode(bytes: &[u8]) -> Result<Relationship> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize relationship: {e}")))
}

impl RedbGateway {
    pub(crate) async fn upsert_relationship_inner(
        &self,
        user: &str,
        contact_name: &str,
        delta: RelationshipDelta,
    ) -> Result<Relationship> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        let contact_name = contact_name.to_string();
        blocking(move || {
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            let key = key(&user, &contact_name);
            let updated = {
                let mut table = write_txn
                    .open_table(RELATIONSHIPS_TABLE)
                    .map_err(|e| Error::Internal(format!("open relationships table: {e}")))?;
                let existing = table
                    .get(key.as_str())
                    .map_err(|e| Error::Internal(format!("get relationship: {e}")))?
                    .map(|g| decode(g.value()))
                    .transpose()?;

                let rel = match existing {
                    Some(mut rel) => {
                        // Idempotent on identical deltas (spec §4.1): a replay of
                        // the same interaction timestamp is a no-op.
                        if !rel.recent_interactions.contains(&delta.interaction_at) {
                            apply(
                                &mut rel,
                                &InteractionDelta {
                                    at: delta.interaction_at,
                                    sensitivities: delta.sensitivities.clone(),
                                },
                            );
                        }
                        rel
                    }
                    None => new_relationship(
                        user.clone(),
                        contact_name.clone(),
                        &InteractionDelta {
                            at: delta.interaction_at,
                            sensitivities: delta.sensitivities.clone(),
                        },
                        COLD_THRESHOLD_DAYS,
                    ),
                };

                let bytes = encode(&rel)?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("upsert relationship: {e}")))?;
                rel
            };
            write_txn.commit().map_err(|e| Error::Internal(format!("commit relationship upsert: {e}")))?;
            Ok(updated)
        })
        .await
    }

    pub(crate) async fn get_relationship_inner(&self, user: &str, contact_name: &str) -> Result<Option<Relationship>> {
        let db = Arc::clone(&self.db);
        let key = key(user, contact_name);
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(RELATIONSHIPS_TABLE)
                .map_err(|e| Error::Internal(format!("open relationships table: {e}")))?;
            match table.get(key.as_str()).map_err(|e| Error::Internal(format!("get relationship: {e}")))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub(crate) async fn list_relationships_inner(&self, user: &str) -> Result<Vec<Relationship>> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(RELATIONSHIPS_TABLE)
                .map_err(|e| Error::Internal(format!("open relationships table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate relationships: {e}")))?;
            for entry in iter {
                let (_, guard) = entry.map_err(|e| Error::Internal(format!("read relationship entry: {e}")))?;
                let rel = decode(guard.value())?;
                if rel.user == user {
                    out.push(rel);
                }
            }
            Ok(out)
        })
        .await
    }
}
