//! The pull watermark.

use crate::error::SyncResult;
use crate::tables::{PULL_DEFERRED_TABLE, SYNC_META_TABLE, WATERMARK_KEY};
use serde_json::Value;
use std::sync::Arc;
use waybill_core::{LocalStore, Transaction};
use waybill_sync_protocol::EntityType;

/// Lower bound (epoch millis) for the next pull. Zero means "never pulled".
#[derive(Clone)]
pub struct Watermark {
    store: Arc<LocalStore>,
}

impl Watermark {
    /// Reads the watermark kept in `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Current watermark.
    pub fn get(&self) -> i64 {
        self.store
            .get(SYNC_META_TABLE, WATERMARK_KEY)
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    /// Moves the watermark to `millis`, never backwards. Returns the value
    /// now stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn advance(&self, millis: i64) -> SyncResult<i64> {
        self.store.transaction(|txn| Ok(advance_in(txn, millis)))
    }

    /// Forgets the watermark so the next pull fetches everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn reset(&self) -> SyncResult<()> {
        self.store.transaction(|txn| {
            txn.delete(SYNC_META_TABLE, WATERMARK_KEY);
            for (key, _) in txn.scan(PULL_DEFERRED_TABLE) {
                txn.delete(PULL_DEFERRED_TABLE, &key);
            }
            Ok(())
        })
    }

    /// Number of entities whose server copy was skipped for a queued edit.
    pub fn deferred_count(&self) -> usize {
        self.store.count(PULL_DEFERRED_TABLE)
    }
}

pub(crate) fn advance_in(txn: &mut Transaction<'_>, millis: i64) -> i64 {
    let current = txn
        .get(SYNC_META_TABLE, WATERMARK_KEY)
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let next = current.max(millis);
    if next != current {
        txn.put(SYNC_META_TABLE, WATERMARK_KEY, Value::from(next));
    }
    next
}

/// Remembers that the pull starting at `since` skipped an entity.
///
/// The earliest such watermark is kept.
pub(crate) fn defer_in(txn: &mut Transaction<'_>, entity_type: EntityType, id: &str, since: i64) {
    let key = deferred_key(entity_type, id);
    let earliest = match txn.get(PULL_DEFERRED_TABLE, &key).and_then(|v| v.as_i64()) {
        Some(existing) => existing.min(since),
        None => since,
    };
    txn.put(PULL_DEFERRED_TABLE, &key, Value::from(earliest));
}

/// Drops the deferral marker once the server copy has been applied.
pub(crate) fn settle_in(txn: &mut Transaction<'_>, entity_type: EntityType, id: &str) {
    txn.delete(PULL_DEFERRED_TABLE, &deferred_key(entity_type, id));
}

/// Moves the watermark back to where the entity was first skipped, so
/// the next pull fetches its server copy again. Returns the new watermark
/// if it moved.
pub(crate) fn rewind_for_in(
    txn: &mut Transaction<'_>,
    entity_type: EntityType,
    id: &str,
) -> Option<i64> {
    let key = deferred_key(entity_type, id);
    let since = txn.get(PULL_DEFERRED_TABLE, &key).and_then(|v| v.as_i64())?;
    txn.delete(PULL_DEFERRED_TABLE, &key);
    let current = txn
        .get(SYNC_META_TABLE, WATERMARK_KEY)
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    if since >= current {
        return None;
    }
    txn.put(SYNC_META_TABLE, WATERMARK_KEY, Value::from(since));
    Some(since)
}

fn deferred_key(entity_type: EntityType, id: &str) -> String {
    format!("{}/{}", entity_type.tag(), id)
}
