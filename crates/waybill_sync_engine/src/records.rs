//! Locally stored domain records and their sync status.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use waybill_core::{LocalStore, Transaction};
use waybill_sync_protocol::time::now_millis;
use waybill_sync_protocol::{EntityMapper, EntityType};

/// A domain record plus the sync flags the UI observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEnvelope {
    /// Entity id.
    pub id: String,
    /// Local-shape body produced by the entity's mapper.
    pub body: Value,
    /// True once the server holds this exact body.
    pub is_synced: bool,
    /// Last delivery failure, cleared by a later success or edit.
    #[serde(default)]
    pub sync_error: Option<String>,
    /// Epoch millis of the last local or pulled write.
    pub updated_at: i64,
}

/// Table holding records of `entity_type`.
pub fn table_for(entity_type: EntityType) -> &'static str {
    entity_type.tag()
}

pub(crate) fn load_in(
    txn: &Transaction<'_>,
    entity_type: EntityType,
    id: &str,
) -> SyncResult<Option<RecordEnvelope>> {
    Ok(txn.get_as(table_for(entity_type), id)?)
}

fn store_in(
    txn: &mut Transaction<'_>,
    entity_type: EntityType,
    record: &RecordEnvelope,
) -> SyncResult<()> {
    txn.put_as(table_for(entity_type), &record.id, record)?;
    Ok(())
}

/// Writes a local edit. Returns true if the record already existed.
pub(crate) fn write_local_in(
    txn: &mut Transaction<'_>,
    entity_type: EntityType,
    id: &str,
    body: Value,
) -> SyncResult<bool> {
    let existed = txn.contains(table_for(entity_type), id);
    store_in(
        txn,
        entity_type,
        &RecordEnvelope {
            id: id.to_string(),
            body,
            is_synced: false,
            sync_error: None,
            updated_at: now_millis(),
        },
    )?;
    Ok(existed)
}

/// Marks a record as accepted, optionally installing the server's copy.
pub(crate) fn mark_synced_in(
    txn: &mut Transaction<'_>,
    entity_type: EntityType,
    id: &str,
    server_body: Option<Value>,
) -> SyncResult<bool> {
    let Some(mut record) = load_in(txn, entity_type, id)? else {
        return Ok(false);
    };
    if let Some(body) = server_body {
        record.body = body;
        record.updated_at = now_millis();
    }
    record.is_synced = true;
    record.sync_error = None;
    store_in(txn, entity_type, &record)?;
    Ok(true)
}

pub(crate) fn mark_failed_in(
    txn: &mut Transaction<'_>,
    entity_type: EntityType,
    id: &str,
    error: &str,
) -> SyncResult<bool> {
    let Some(mut record) = load_in(txn, entity_type, id)? else {
        return Ok(false);
    };
    record.is_synced = false;
    record.sync_error = Some(error.to_string());
    store_in(txn, entity_type, &record)?;
    Ok(true)
}

/// Result of installing a pulled entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Installed {
    Created,
    Updated,
    Unchanged,
}

/// Installs server state as a synced record.
pub(crate) fn install_pulled_in(
    txn: &mut Transaction<'_>,
    entity_type: EntityType,
    id: &str,
    body: Value,
) -> SyncResult<Installed> {
    let installed = match load_in(txn, entity_type, id)? {
        Some(existing) if existing.is_synced && existing.body == body => {
            return Ok(Installed::Unchanged)
        }
        Some(_) => Installed::Updated,
        None => Installed::Created,
    };
    store_in(
        txn,
        entity_type,
        &RecordEnvelope {
            id: id.to_string(),
            body,
            is_synced: true,
            sync_error: None,
            updated_at: now_millis(),
        },
    )?;
    Ok(installed)
}

/// Removes a record. Returns true if it existed.
pub(crate) fn remove_in(txn: &mut Transaction<'_>, entity_type: EntityType, id: &str) -> bool {
    let table = table_for(entity_type);
    let existed = txn.contains(table, id);
    if existed {
        txn.delete(table, id);
    }
    existed
}

/// Read access to synced records.
#[derive(Clone)]
pub struct Records {
    store: Arc<LocalStore>,
}

impl Records {
    /// Reads records kept in `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Returns one record envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored envelope is malformed.
    pub fn get(&self, entity_type: EntityType, id: &str) -> SyncResult<Option<RecordEnvelope>> {
        Ok(self.store.get_as(table_for(entity_type), id)?)
    }

    /// Returns one record body in its typed local shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope or body is malformed.
    pub fn get_as<M: EntityMapper>(&self, id: &str) -> SyncResult<Option<M::Local>> {
        match self.get(M::ENTITY_TYPE, id)? {
            Some(record) => Ok(Some(serde_json::from_value(record.body)?)),
            None => Ok(None),
        }
    }

    /// Every record of a type, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored envelope is malformed.
    pub fn list(&self, entity_type: EntityType) -> SyncResult<Vec<RecordEnvelope>> {
        self.store
            .scan(table_for(entity_type))
            .into_iter()
            .map(|(_, value)| serde_json::from_value(value).map_err(SyncError::from))
            .collect()
    }

    /// Records with local changes the server has not confirmed.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored envelope is malformed.
    pub fn unsynced(&self, entity_type: EntityType) -> SyncResult<Vec<RecordEnvelope>> {
        Ok(self
            .list(entity_type)?
            .into_iter()
            .filter(|r| !r.is_synced)
            .collect())
    }

    /// Number of records of a type.
    pub fn count(&self, entity_type: EntityType) -> usize {
        self.store.count(table_for(entity_type))
    }
}
