//! Timeline event storage (spec §4.1): `EVENTS_TABLE` keyed by event id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::types::TimelineEvent;
use uuid::Uuid;

use crate::tables::EVENTS_TABLE;
use crate::{blocking, RedbGateway};

fn encode(event: &TimelineEvent) -> Result<Vec<u8>> {
    postcard::to_allocvec(event).map_err(|e| Error::Internal(format!("serialize timeline event: {e}")))
}

fn decode(bytes: &[u8]) -> Result<TimelineEvent> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize timeline event: {e}")))
}

impl RedbGateway {
    pub(crate) async fn create_timeline_event_inner(&self, event: TimelineEvent) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let bytes = encode(&event)?;
            let key = event.id.to_string();
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(EVENTS_TABLE)
                    .map_err(|e| Error::Internal(format!("open events table: {e}")))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("insert timeline event: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit timeline event insert: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn find_timeline_events_inner(
        &self,
        user: &str,
        person: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimelineEvent>> {
        let db = Arc::clone(&self.db);
        let user = user.to_string();
        let person = person.map(str::to_string);
        blocking(move || {
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(EVENTS_TABLE)
                .map_err(|e| Error::Internal(format!("open events table: {e}")))?;
            let mut out = Vec::new();
            let iter = table.iter().map_err(|e| Error::Internal(format!("iterate events: {e}")))?;
            for entry in iter {
                let (_, guard) = entry.map_err(|e| Error::Internal(format!("read timeline event entry: {e}")))?;
                let event = decode(guard.value())?;
                if event.user != user || event.event_date < from || event.event_date > to {
                    continue;
                }
                if let Some(p) = &person {
                    if event.person.as_deref() != Some(p.as_str()) {
                        continue;
                    }
                }
                out.push(event);
            }
            out.sort_by_key(|e| e.event_date);
            Ok(out)
        })
        .await
    }

    pub(crate) async fn delete_timeline_event_inner(&self, id: Uuid) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let key = id.to_string();
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(EVENTS_TABLE)
                    .map_err(|e| Error::Internal(format!("open events table: {e}")))?;
                table
                    .remove(key.as_str())
                    .map_err(|e| Error::Internal(format!("delete timeline event: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit timeline event delete: {e}")))?;
            Ok(())
        })
        .await
    }
}
