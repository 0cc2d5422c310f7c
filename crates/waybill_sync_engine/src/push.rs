//! The push worker: drains the outbox to the server.

use crate::auth::TokenProvider;
use crate::error::{FailureKind, SyncError, SyncResult};
use crate::flight::{FlightGuard, RunOutcome, SingleFlight};
use crate::outbox::{Outbox, OutboxEntry};
use crate::records;
use crate::transport::SyncTransport;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use waybill_core::{LocalStore, Transaction};
use waybill_sync_protocol::{decode_entity, DecodedEntity, Operation, Route, WirePayload};

/// What happened to one delivered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Accepted; entry removed and record marked synced.
    Pushed,
    /// Accepted, but a newer local edit arrived meanwhile; the entry stays
    /// queued with the newer payload.
    Superseded,
}

/// A failed delivery, as counted against its entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFailure {
    /// Outbox entry id.
    pub entry_id: u64,
    /// Entity type tag.
    pub entity_type: waybill_sync_protocol::EntityType,
    /// Entity id.
    pub entity_id: String,
    /// Failure classification.
    pub kind: FailureKind,
    /// Error text, also stored as the entry's `lastError`.
    pub message: String,
    /// Attempts after this failure.
    pub attempts: u32,
}

/// Summary of one push run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushReport {
    /// Entries sent.
    pub attempted: usize,
    /// Entries accepted and removed.
    pub pushed: usize,
    /// Entries accepted but kept for a newer edit.
    pub superseded: usize,
    /// Entries that failed this run.
    pub failures: Vec<EntryFailure>,
}

impl PushReport {
    /// Returns true if every attempted entry was accepted.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delivers outbox entries in priority order.
pub struct PushWorker<T: SyncTransport> {
    store: Arc<LocalStore>,
    outbox: Outbox,
    transport: Arc<T>,
    tokens: Arc<dyn TokenProvider>,
    flight: Arc<SingleFlight>,
    batch_size: usize,
}

impl<T: SyncTransport> PushWorker<T> {
    /// Creates a worker sharing `flight` with the other sync runs.
    pub fn new(
        store: Arc<LocalStore>,
        outbox: Outbox,
        transport: Arc<T>,
        tokens: Arc<dyn TokenProvider>,
        flight: Arc<SingleFlight>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            outbox,
            transport,
            tokens,
            flight,
            batch_size,
        }
    }

    /// Drains one batch unless a sync run is already active.
    ///
    /// # Errors
    ///
    /// Returns a precondition error (no token, offline) without touching
    /// any entry, or a store error that stopped the run.
    pub fn run(&self) -> SyncResult<RunOutcome<PushReport>> {
        let Some(guard) = self.flight.try_acquire() else {
            debug!("push skipped; a sync run is active");
            return Ok(RunOutcome::Skipped);
        };
        self.drain(&guard).map(RunOutcome::Completed)
    }

    /// Drains one batch under a guard the caller already holds.
    ///
    /// Entries are sent strictly in `(priority, createdAt)` order. A failing
    /// entry is counted and the run moves on to the next one.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn drain(&self, _guard: &FlightGuard<'_>) -> SyncResult<PushReport> {
        let token = self.tokens.token().ok_or(SyncError::NoAuthToken)?;
        if !self.transport.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let batch = self.outbox.dequeue_batch_limited(self.batch_size)?;
        let mut report = PushReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        for entry in &batch {
            report.attempted += 1;
            match self.push_entry(entry, &token) {
                Ok(EntryOutcome::Pushed) => report.pushed += 1,
                Ok(EntryOutcome::Superseded) => report.superseded += 1,
                Err(err) if aborts_run(&err) => {
                    warn!(entry_id = entry.id, error = %err, "push run aborted");
                    return Err(err);
                }
                Err(err) => report.failures.push(self.record_failure(entry, &err)?),
            }
        }

        info!(
            attempted = report.attempted,
            pushed = report.pushed,
            superseded = report.superseded,
            failed = report.failures.len(),
            "push run finished"
        );
        Ok(report)
    }

    /// Sends one entry and commits the outcome.
    fn push_entry(&self, entry: &OutboxEntry, token: &str) -> Result<EntryOutcome, SyncError> {
        let route = Route::for_entry(entry.entity_type, entry.operation, &entry.entity_id);
        let body = entry
            .payload
            .as_ref()
            .map(WirePayload::to_body)
            .transpose()?;

        let data = self.transport.send_entry(&route, body.as_ref(), token)?;
        let server_body = match (entry.operation, data) {
            (Operation::Delete, _) | (_, None) => None,
            (_, Some(data)) => server_copy(entry, data),
        };

        let outcome = self
            .store
            .transaction(|txn| commit_success(txn, entry, server_body))?;
        debug!(
            entry_id = entry.id,
            route = %route,
            outcome = ?outcome,
            "entry accepted"
        );
        Ok(outcome)
    }

    fn record_failure(&self, entry: &OutboxEntry, err: &SyncError) -> SyncResult<EntryFailure> {
        let message = err.to_string();
        let updated = self.store.transaction(|txn| {
            let updated =
                Outbox::record_failure_in(txn, entry.id, Some(entry.revision), &message)?;
            if updated.is_some() {
                records::mark_failed_in(txn, entry.entity_type, &entry.entity_id, &message)?;
            }
            Ok::<_, SyncError>(updated)
        })?;

        let kind = err.kind();
        let attempts = updated.as_ref().map_or(entry.attempts, |e| e.attempts);
        if kind == FailureKind::Rejected {
            warn!(
                entry_id = entry.id,
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                attempts,
                error = %message,
                "server rejected outbox entry"
            );
        } else {
            debug!(
                entry_id = entry.id,
                entity_type = %entry.entity_type,
                attempts,
                error = %message,
                "outbox entry delivery failed"
            );
        }
        if updated.is_some() && attempts >= self.outbox.max_retries() {
            warn!(
                entry_id = entry.id,
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                attempts,
                "outbox entry exhausted; waiting for manual retry or discard"
            );
        }

        Ok(EntryFailure {
            entry_id: entry.id,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id.clone(),
            kind,
            message,
            attempts,
        })
    }
}

fn aborts_run(err: &SyncError) -> bool {
    matches!(err, SyncError::Store(_)) || err.kind() == FailureKind::Precondition
}

/// Maps the server's copy of an accepted entity, if it sent one we can use.
fn server_copy(entry: &OutboxEntry, data: Value) -> Option<Value> {
    if !data.is_object() {
        return None;
    }
    match decode_entity(entry.entity_type, data) {
        Ok(DecodedEntity::Upsert { id, local }) if id == entry.entity_id => Some(local),
        Ok(DecodedEntity::Tombstone { id }) if id == entry.entity_id => {
            warn!(
                entry_id = entry.id,
                entity_id = %id,
                "server answered with a tombstone; keeping local copy"
            );
            None
        }
        Ok(other) => {
            warn!(
                entry_id = entry.id,
                returned_id = other.id(),
                "server returned a different entity; keeping local copy"
            );
            None
        }
        Err(err) => {
            warn!(entry_id = entry.id, error = %err, "cannot map server copy; keeping local copy");
            None
        }
    }
}

/// Commits an accepted delivery.
///
/// The entry is removed only if no newer local edit coalesced into it
/// while the request was in flight.
fn commit_success(
    txn: &mut Transaction<'_>,
    sent: &OutboxEntry,
    server_body: Option<Value>,
) -> SyncResult<EntryOutcome> {
    let (entity_type, entity_id) = (sent.entity_type, sent.entity_id.as_str());

    match Outbox::get_in(txn, sent.id)? {
        Some(current) if current.revision == sent.revision => {
            Outbox::delete_in(txn, &current);
            if sent.operation != Operation::Delete {
                records::mark_synced_in(txn, entity_type, entity_id, server_body)?;
            }
            Ok(EntryOutcome::Pushed)
        }
        Some(current) => {
            rebase(txn, sent.operation, current)?;
            Ok(EntryOutcome::Superseded)
        }
        None => {
            if sent.operation != Operation::Create {
                return Ok(EntryOutcome::Superseded);
            }
            match Outbox::find_in(txn, entity_type, entity_id)? {
                Some(requeued) => rebase(txn, sent.operation, requeued)?,
                None if records::load_in(txn, entity_type, entity_id)?.is_none() => {
                    // Deleted locally while the create was in flight.
                    Outbox::enqueue_in(
                        txn,
                        entity_id,
                        entity_type,
                        Operation::Delete,
                        None,
                        sent.priority,
                    )?;
                }
                None => {
                    records::mark_synced_in(txn, entity_type, entity_id, server_body)?;
                }
            }
            Ok(EntryOutcome::Superseded)
        }
    }
}

/// Rewrites a newer queued entry to match what the server holds once
/// `landed` has been applied there.
fn rebase(txn: &mut Transaction<'_>, landed: Operation, mut queued: OutboxEntry) -> SyncResult<()> {
    let server_has_entity = landed != Operation::Delete;
    match (server_has_entity, queued.operation) {
        (true, Operation::Create) => queued.operation = Operation::Update,
        (false, Operation::Update) => queued.operation = Operation::Create,
        (false, Operation::Delete) => {
            Outbox::delete_in(txn, &queued);
            return Ok(());
        }
        _ => return Ok(()),
    }
    debug!(
        entry_id = queued.id,
        entity_type = %queued.entity_type,
        entity_id = %queued.entity_id,
        operation = %queued.operation,
        "rebased queued entry"
    );
    Outbox::put_in(txn, &queued)
}
