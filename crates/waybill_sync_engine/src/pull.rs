//! The pull reconciler: installs server changes since the watermark.

use crate::auth::TokenProvider;
use crate::error::{SyncError, SyncResult};
use crate::flight::{FlightGuard, RunOutcome, SingleFlight};
use crate::outbox::Outbox;
use crate::records::{self, Installed};
use crate::transport::SyncTransport;
use crate::watermark::{self, Watermark};
use std::sync::Arc;
use tracing::{debug, info, warn};
use waybill_core::{LocalStore, Transaction};
use waybill_sync_protocol::time::now_millis;
use waybill_sync_protocol::{decode_entity, DecodedEntity, EntityType, Operation};

/// Summary of one pull run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullReport {
    /// Watermark the pull started from.
    pub since: i64,
    /// Watermark after the pull.
    pub watermark: i64,
    /// Entities in the response.
    pub received: usize,
    /// Records created locally.
    pub created: usize,
    /// Records replaced with the server copy.
    pub updated: usize,
    /// Entities identical to what was already stored.
    pub unchanged: usize,
    /// Records removed for server tombstones.
    pub deleted: usize,
    /// Entities skipped because a local edit is still queued.
    pub deferred: usize,
    /// Response keys naming no known entity type.
    pub ignored_keys: Vec<String>,
}

/// Fetches server-side changes and upserts them locally.
pub struct PullReconciler<T: SyncTransport> {
    store: Arc<LocalStore>,
    transport: Arc<T>,
    tokens: Arc<dyn TokenProvider>,
    flight: Arc<SingleFlight>,
    watermark: Watermark,
}

impl<T: SyncTransport> PullReconciler<T> {
    /// Creates a reconciler sharing `flight` with the other sync runs.
    pub fn new(
        store: Arc<LocalStore>,
        transport: Arc<T>,
        tokens: Arc<dyn TokenProvider>,
        flight: Arc<SingleFlight>,
    ) -> Self {
        let watermark = Watermark::new(Arc::clone(&store));
        Self {
            store,
            transport,
            tokens,
            flight,
            watermark,
        }
    }

    /// Pulls once unless a sync run is already active.
    ///
    /// # Errors
    ///
    /// Returns the failure that stopped the pull. The watermark is
    /// unchanged in that case, so the next pull covers the same window.
    pub fn run(&self) -> SyncResult<RunOutcome<PullReport>> {
        let Some(guard) = self.flight.try_acquire() else {
            debug!("pull skipped; a sync run is active");
            return Ok(RunOutcome::Skipped);
        };
        self.drain(&guard).map(RunOutcome::Completed)
    }

    /// Pulls once under a guard the caller already holds.
    ///
    /// Each entity is applied in its own transaction and applying is
    /// idempotent, so a pull that fails partway can simply be repeated.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn drain(&self, _guard: &FlightGuard<'_>) -> SyncResult<PullReport> {
        let token = self.tokens.token().ok_or(SyncError::NoAuthToken)?;
        if !self.transport.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let since = self.watermark.get();
        let requested_at = now_millis();
        let data = self.transport.pull(since, &token)?;

        for key in &data.unknown_keys {
            warn!(key = %key, "ignoring unknown entity type in pull response");
        }
        let mut report = PullReport {
            since,
            ignored_keys: data.unknown_keys,
            ..PullReport::default()
        };

        for (entity_type, items) in data.entities {
            for value in items {
                report.received += 1;
                let decoded = decode_entity(entity_type, value).map_err(|err| {
                    warn!(entity_type = %entity_type, error = %err, "pull aborted on unmappable entity");
                    err
                })?;
                self.store
                    .transaction(|txn| apply_in(txn, since, entity_type, decoded, &mut report))?;
            }
        }

        report.watermark = self
            .watermark
            .advance(data.server_time.unwrap_or(requested_at))?;
        info!(
            since,
            watermark = report.watermark,
            received = report.received,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            deferred = report.deferred,
            "pull run finished"
        );
        Ok(report)
    }
}

fn apply_in(
    txn: &mut Transaction<'_>,
    since: i64,
    entity_type: EntityType,
    decoded: DecodedEntity,
    report: &mut PullReport,
) -> SyncResult<()> {
    if let Some(pending) = Outbox::find_in(txn, entity_type, decoded.id())? {
        // A queued local delete already matches a server tombstone.
        if pending.operation == Operation::Delete
            && matches!(decoded, DecodedEntity::Tombstone { .. })
        {
            Outbox::delete_in(txn, &pending);
            watermark::settle_in(txn, entity_type, decoded.id());
            report.unchanged += 1;
            return Ok(());
        }
        // Discarding the entry rewinds the watermark to `since`.
        watermark::defer_in(txn, entity_type, decoded.id(), since);
        debug!(
            entity_type = %entity_type,
            entity_id = decoded.id(),
            entry_id = pending.id,
            "local edit pending; keeping local copy"
        );
        report.deferred += 1;
        return Ok(());
    }

    watermark::settle_in(txn, entity_type, decoded.id());
    match decoded {
        DecodedEntity::Upsert { id, local } => {
            match records::install_pulled_in(txn, entity_type, &id, local)? {
                Installed::Created => report.created += 1,
                Installed::Updated => report.updated += 1,
                Installed::Unchanged => report.unchanged += 1,
            }
        }
        DecodedEntity::Tombstone { id } => {
            if records::remove_in(txn, entity_type, &id) {
                report.deleted += 1;
            } else {
                report.unchanged += 1;
            }
        }
    }
    Ok(())
}
