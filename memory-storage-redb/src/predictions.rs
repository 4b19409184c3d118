//! Behavioral-identity prediction storage (spec §4.1, §4.8):
//! `PREDICTIONS_TABLE` keyed by prediction id.

use std::sync::Arc;

use redb::ReadableTable;
use salience_memory_core::error::{Error, Result};
use salience_memory_core::types::Prediction;
use uuid::Uuid;

use crate::tables::PREDICTIONS_TABLE;
use crate::{blocking, RedbGateway};

fn encode(prediction: &Prediction) -> Result<Vec<u8>> {
    postcard::to_allocvec(prediction).map_err(|e| Error::Internal(format!("serialize prediction: {e}")))
}

fn decode(bytes: &[u8]) -> Result<Prediction> {
    postcard::from_bytes(bytes).map_err(|e| Error::Internal(format!("deserialize prediction: {e}")))
}

impl RedbGateway {
    pub(crate) async fn put_prediction_inner(&self, prediction: Prediction) -> Result<()> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let bytes = encode(&prediction)?;
            let key = prediction.id.to_string();
            let write_txn = db
                .begin_write()
                .map_err(|e| Error::Internal(format!("begin write transaction: {e}")))?;
            {
                let mut table = write_txn
                    .open_table(PREDICTIONS_TABLE)
                    .map_err(|e| Error::Internal(format!("open predictions table: {e}")))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Internal(format!("put prediction: {e}")))?;
            }
            write_txn.commit().map_err(|e| Error::Internal(format!("commit prediction put: {e}")))?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn get_prediction_inner(&self, id: Uuid) -> Result<Option<Prediction>> {
        let db = Arc::clone(&self.db);
        blocking(move || {
            let key = id.to_string();
            let read_txn = db.begin_read().map_err(|e| Error::Internal(format!("begin read transaction: {e}")))?;
            let table = read_txn
                .open_table(PREDICTIONS_TABLE)
                .map_err(|e| Error::Internal(format!("open predictions table: {e}")))?;
            match table.get(key.as_str()).map_err(|e| Error::Internal(format!("get prediction: {e}")))? {
                Some(guard) => Ok(Some(decode(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
    }
}
