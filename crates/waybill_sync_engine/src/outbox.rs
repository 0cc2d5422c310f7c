//! The durable outbox of pending mutations.

use crate::error::{SyncError, SyncResult};
use crate::tables::{NEXT_ENTRY_ID_KEY, OUTBOX_INDEX_TABLE, OUTBOX_TABLE, SYNC_META_TABLE};
use crate::watermark;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};
use waybill_core::{LocalStore, Transaction};
use waybill_sync_protocol::time::now_millis;
use waybill_sync_protocol::{EntityType, Operation, Priority, WirePayload};

/// A queued local mutation awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    /// Local entry id, assigned in enqueue order.
    pub id: u64,
    /// Affected record.
    pub entity_id: String,
    /// Affected record's type.
    pub entity_type: EntityType,
    /// What to do on the server.
    pub operation: Operation,
    /// Request body captured at enqueue time; `None` for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<WirePayload>,
    /// Lower is served first.
    pub priority: Priority,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    /// Epoch millis of the most recent attempt.
    #[serde(default)]
    pub last_attempt_at: Option<i64>,
    /// Most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Epoch millis of the first enqueue.
    pub created_at: i64,
    /// Bumped whenever a newer local edit coalesces into the entry.
    pub revision: u64,
}

impl OutboxEntry {
    /// Delivery order: priority, then age, then id.
    pub fn sort_key(&self) -> (Priority, i64, u64) {
        (self.priority, self.created_at, self.id)
    }

    /// Returns true once the entry has used up its attempts.
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.attempts >= max_retries
    }
}

/// What an enqueue did to the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new entry was added.
    Queued(u64),
    /// The edit was folded into the entity's existing entry.
    Coalesced(u64),
    /// A delete cancelled a create that never reached the server.
    Cancelled,
    /// Nothing to deliver: the entity is unknown locally and not queued.
    Ignored,
}

impl EnqueueOutcome {
    /// The id of the entry now holding the edit, if any.
    pub fn entry_id(self) -> Option<u64> {
        match self {
            EnqueueOutcome::Queued(id) | EnqueueOutcome::Coalesced(id) => Some(id),
            EnqueueOutcome::Cancelled | EnqueueOutcome::Ignored => None,
        }
    }
}

/// Folds a new operation into a queued one. `None` drops the entry.
pub fn coalesce(queued: Operation, next: Operation) -> Option<Operation> {
    match (queued, next) {
        (Operation::Create, Operation::Delete) => None,
        (Operation::Create, _) => Some(Operation::Create),
        (Operation::Update, Operation::Delete) => Some(Operation::Delete),
        (Operation::Update, _) => Some(Operation::Update),
        (Operation::Delete, Operation::Delete) => Some(Operation::Delete),
        // The server still holds the entity until the delete is delivered.
        (Operation::Delete, _) => Some(Operation::Update),
    }
}

/// The durable queue of pending mutations.
///
/// Exactly one entry exists per `(entity type, entity id)`. Every method
/// commits through the store, so an `Ok` return means the change is on
/// disk.
///
/// Clones share one enqueue signal; see [`enqueued`](Self::enqueued).
#[derive(Clone)]
pub struct Outbox {
    store: Arc<LocalStore>,
    max_retries: u32,
    enqueued: Arc<Notify>,
}

impl Outbox {
    /// Opens the outbox kept in `store`.
    pub fn new(store: Arc<LocalStore>, max_retries: u32) -> Self {
        Self {
            store,
            max_retries,
            enqueued: Arc::new(Notify::new()),
        }
    }

    /// Notified after every committed enqueue that leaves an entry to
    /// deliver. A notification with no waiter is kept until the next wait.
    pub fn enqueued(&self) -> Arc<Notify> {
        Arc::clone(&self.enqueued)
    }

    /// Signals [`enqueued`](Self::enqueued) if `outcome` left work queued.
    ///
    /// Callers of [`enqueue_in`](Self::enqueue_in) call this once their
    /// transaction has committed.
    pub fn announce(&self, outcome: EnqueueOutcome) {
        if outcome.entry_id().is_some() {
            self.enqueued.notify_one();
        }
    }

    /// The retry cap.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Queues a mutation, or coalesces it into the entity's queued entry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidEntry`] if a create or update has no
    /// payload or the payload describes a different entity, or a store
    /// error if the commit fails.
    pub fn enqueue(
        &self,
        entity_id: &str,
        entity_type: EntityType,
        operation: Operation,
        payload: Option<WirePayload>,
        priority: Priority,
    ) -> SyncResult<EnqueueOutcome> {
        let outcome = self.store.transaction(|txn| {
            Self::enqueue_in(txn, entity_id, entity_type, operation, payload, priority)
        })?;
        self.announce(outcome);
        Ok(outcome)
    }

    /// [`enqueue`](Self::enqueue) inside a caller's transaction, so the
    /// entry commits together with the record write that caused it.
    ///
    /// # Errors
    ///
    /// See [`enqueue`](Self::enqueue).
    pub fn enqueue_in(
        txn: &mut Transaction<'_>,
        entity_id: &str,
        entity_type: EntityType,
        operation: Operation,
        payload: Option<WirePayload>,
        priority: Priority,
    ) -> SyncResult<EnqueueOutcome> {
        let payload = validate(entity_id, entity_type, operation, payload)?;

        let Some(mut queued) = Self::find_in(txn, entity_type, entity_id)? else {
            let entry = OutboxEntry {
                id: next_entry_id(txn)?,
                entity_id: entity_id.to_string(),
                entity_type,
                operation,
                payload,
                priority,
                attempts: 0,
                last_attempt_at: None,
                last_error: None,
                created_at: now_millis(),
                revision: 0,
            };
            put_entry(txn, &entry)?;
            debug!(
                entry_id = entry.id,
                entity_type = %entity_type,
                entity_id,
                operation = %operation,
                priority = %priority,
                "queued outbox entry"
            );
            return Ok(EnqueueOutcome::Queued(entry.id));
        };

        match coalesce(queued.operation, operation) {
            None => {
                delete_entry(txn, &queued);
                debug!(entry_id = queued.id, entity_type = %entity_type, entity_id, "delete cancelled queued create");
                Ok(EnqueueOutcome::Cancelled)
            }
            Some(merged) => {
                let from = queued.operation;
                queued.operation = merged;
                queued.payload = if merged.has_payload() { payload } else { None };
                queued.priority = queued.priority.min(priority);
                queued.attempts = 0;
                queued.last_error = None;
                queued.revision += 1;
                put_entry(txn, &queued)?;
                debug!(
                    entry_id = queued.id,
                    entity_type = %entity_type,
                    entity_id,
                    from = %from,
                    to = %merged,
                    revision = queued.revision,
                    "coalesced outbox entry"
                );
                Ok(EnqueueOutcome::Coalesced(queued.id))
            }
        }
    }

    /// Entries still eligible for delivery, in delivery order.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored entry cannot be decoded.
    pub fn dequeue_batch(&self) -> SyncResult<Vec<OutboxEntry>> {
        let max = self.max_retries;
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| !e.is_exhausted(max))
            .collect())
    }

    /// The first `limit` entries of [`dequeue_batch`](Self::dequeue_batch).
    ///
    /// # Errors
    ///
    /// Returns an error if a stored entry cannot be decoded.
    pub fn dequeue_batch_limited(&self, limit: usize) -> SyncResult<Vec<OutboxEntry>> {
        let mut batch = self.dequeue_batch()?;
        batch.truncate(limit);
        Ok(batch)
    }

    /// Every entry, exhausted or not, in delivery order.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored entry cannot be decoded.
    pub fn entries(&self) -> SyncResult<Vec<OutboxEntry>> {
        let mut entries = self
            .store
            .scan(OUTBOX_TABLE)
            .into_iter()
            .map(|(_, value)| decode_entry(value))
            .collect::<SyncResult<Vec<_>>>()?;
        entries.sort_by_key(OutboxEntry::sort_key);
        Ok(entries)
    }

    /// Entries that used up their attempts and wait for an operator.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored entry cannot be decoded.
    pub fn exhausted(&self) -> SyncResult<Vec<OutboxEntry>> {
        let max = self.max_retries;
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.is_exhausted(max))
            .collect())
    }

    /// Looks up an entry by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be decoded.
    pub fn get(&self, entry_id: u64) -> SyncResult<Option<OutboxEntry>> {
        self.store
            .get(OUTBOX_TABLE, &entry_key(entry_id))
            .map(decode_entry)
            .transpose()
    }

    /// Looks up the entry for an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be decoded.
    pub fn find(&self, entity_type: EntityType, entity_id: &str) -> SyncResult<Option<OutboxEntry>> {
        match self
            .store
            .get(OUTBOX_INDEX_TABLE, &index_key(entity_type, entity_id))
            .and_then(|v| v.as_u64())
        {
            Some(id) => self.get(id),
            None => Ok(None),
        }
    }

    /// Number of entries, exhausted included.
    pub fn len(&self) -> usize {
        self.store.count(OUTBOX_TABLE)
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries still eligible for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored entry cannot be decoded.
    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.dequeue_batch()?.len())
    }

    /// Deletes an entry after the server accepted it.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn remove(&self, entry_id: u64) -> SyncResult<bool> {
        self.store.transaction(|txn| match Self::get_in(txn, entry_id)? {
            Some(entry) => {
                delete_entry(txn, &entry);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Counts a failed delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn record_failure(&self, entry_id: u64, error: &str) -> SyncResult<Option<OutboxEntry>> {
        self.store
            .transaction(|txn| Self::record_failure_in(txn, entry_id, None, error))
    }

    /// Counts a failed attempt inside a caller's transaction.
    ///
    /// With `revision` set, the failure is only counted if the entry still
    /// holds that revision; a newer edit has not been tried yet.
    pub(crate) fn record_failure_in(
        txn: &mut Transaction<'_>,
        entry_id: u64,
        revision: Option<u64>,
        error: &str,
    ) -> SyncResult<Option<OutboxEntry>> {
        let Some(mut entry) = Self::get_in(txn, entry_id)? else {
            return Ok(None);
        };
        if revision.is_some_and(|r| r != entry.revision) {
            return Ok(None);
        }
        entry.attempts += 1;
        entry.last_attempt_at = Some(now_millis());
        entry.last_error = Some(error.to_string());
        put_entry(txn, &entry)?;
        Ok(Some(entry))
    }

    /// Makes an exhausted entry eligible again.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn reset(&self, entry_id: u64) -> SyncResult<bool> {
        let reset = self.store.transaction(|txn| {
            let Some(mut entry) = Self::get_in(txn, entry_id)? else {
                return Ok::<_, SyncError>(false);
            };
            entry.attempts = 0;
            entry.last_error = None;
            put_entry(txn, &entry)?;
            Ok(true)
        })?;
        if reset {
            info!(entry_id, "reset outbox entry");
        }
        Ok(reset)
    }

    /// Resets every entry that has failed at least once.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn reset_all(&self) -> SyncResult<usize> {
        let count = self.store.transaction(|txn| {
            let mut count = 0;
            for (_, value) in txn.scan(OUTBOX_TABLE) {
                let mut entry = decode_entry(value)?;
                if entry.attempts > 0 {
                    entry.attempts = 0;
                    entry.last_error = None;
                    put_entry(txn, &entry)?;
                    count += 1;
                }
            }
            Ok::<_, SyncError>(count)
        })?;
        info!(count, "reset outbox entries");
        Ok(count)
    }

    /// Drops an entry without delivering it.
    ///
    /// The local record keeps `isSynced = false`. If a pull skipped the
    /// entity's server copy while the entry was queued, the watermark moves
    /// back so the next pull installs that copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn discard(&self, entry_id: u64) -> SyncResult<Option<OutboxEntry>> {
        let (discarded, rewound) = self.store.transaction(|txn| {
            let Some(entry) = Self::get_in(txn, entry_id)? else {
                return Ok::<_, SyncError>((None, None));
            };
            delete_entry(txn, &entry);
            let rewound = watermark::rewind_for_in(txn, entry.entity_type, &entry.entity_id);
            Ok((Some(entry), rewound))
        })?;
        if let Some(entry) = &discarded {
            info!(
                entry_id,
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                operation = %entry.operation,
                rewound_to = ?rewound,
                "discarded outbox entry"
            );
        }
        Ok(discarded)
    }

    pub(crate) fn get_in(txn: &Transaction<'_>, entry_id: u64) -> SyncResult<Option<OutboxEntry>> {
        txn.get(OUTBOX_TABLE, &entry_key(entry_id))
            .map(decode_entry)
            .transpose()
    }

    pub(crate) fn find_in(
        txn: &Transaction<'_>,
        entity_type: EntityType,
        entity_id: &str,
    ) -> SyncResult<Option<OutboxEntry>> {
        match txn
            .get(OUTBOX_INDEX_TABLE, &index_key(entity_type, entity_id))
            .and_then(|v| v.as_u64())
        {
            Some(id) => Self::get_in(txn, id),
            None => Ok(None),
        }
    }

    pub(crate) fn put_in(txn: &mut Transaction<'_>, entry: &OutboxEntry) -> SyncResult<()> {
        put_entry(txn, entry)
    }

    pub(crate) fn delete_in(txn: &mut Transaction<'_>, entry: &OutboxEntry) {
        delete_entry(txn, entry)
    }
}

fn validate(
    entity_id: &str,
    entity_type: EntityType,
    operation: Operation,
    payload: Option<WirePayload>,
) -> SyncResult<Option<WirePayload>> {
    if entity_id.trim().is_empty() {
        return Err(SyncError::invalid_entry("entity id must not be empty"));
    }
    if !operation.has_payload() {
        return Ok(None);
    }
    let payload = payload.ok_or_else(|| {
        SyncError::invalid_entry(format!("{operation} of {entity_type} needs a payload"))
    })?;
    payload
        .check_type(entity_type)
        .map_err(|e| SyncError::invalid_entry(e.to_string()))?;
    if payload.entity_id() != entity_id {
        return Err(SyncError::invalid_entry(format!(
            "payload describes {} but the entry is for {entity_id}",
            payload.entity_id()
        )));
    }
    Ok(Some(payload))
}

fn entry_key(entry_id: u64) -> String {
    format!("{entry_id:020}")
}

fn index_key(entity_type: EntityType, entity_id: &str) -> String {
    format!("{}/{}", entity_type.tag(), entity_id)
}

fn decode_entry(value: Value) -> SyncResult<OutboxEntry> {
    Ok(serde_json::from_value(value)?)
}

fn put_entry(txn: &mut Transaction<'_>, entry: &OutboxEntry) -> SyncResult<()> {
    txn.put_as(OUTBOX_TABLE, &entry_key(entry.id), entry)?;
    txn.put(
        OUTBOX_INDEX_TABLE,
        &index_key(entry.entity_type, &entry.entity_id),
        Value::from(entry.id),
    );
    Ok(())
}

fn delete_entry(txn: &mut Transaction<'_>, entry: &OutboxEntry) {
    txn.delete(OUTBOX_TABLE, &entry_key(entry.id));
    txn.delete(OUTBOX_INDEX_TABLE, &index_key(entry.entity_type, &entry.entity_id));
}

fn next_entry_id(txn: &mut Transaction<'_>) -> SyncResult<u64> {
    let id = txn
        .get(SYNC_META_TABLE, NEXT_ENTRY_ID_KEY)
        .and_then(|v| v.as_u64())
        .unwrap_or(1);
    txn.put(SYNC_META_TABLE, NEXT_ENTRY_ID_KEY, Value::from(id + 1));
    Ok(id)
}
