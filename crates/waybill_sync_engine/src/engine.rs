//! The sync engine: local writes, push, pull and their shared guard.

use crate::auth::TokenProvider;
use crate::config::SyncConfig;
use crate::error::{FailureKind, SyncError, SyncResult};
use crate::flight::{RunOutcome, SingleFlight};
use crate::outbox::{EnqueueOutcome, Outbox};
use crate::pull::{PullReconciler, PullReport};
use crate::push::{PushReport, PushWorker};
use crate::records::{self, Records};
use crate::transport::SyncTransport;
use crate::watermark::Watermark;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};
use waybill_core::LocalStore;
use waybill_sync_protocol::time::now_millis;
use waybill_sync_protocol::{EntityMapper, EntityType, Operation, Priority};

/// What the engine is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No run is active.
    Idle,
    /// Draining the outbox.
    Pushing,
    /// Fetching server changes.
    Pulling,
}

impl SyncState {
    /// Returns true if a run is active.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Full push-then-pull cycles completed.
    pub cycles_completed: u64,
    /// Entries the server accepted.
    pub entries_pushed: u64,
    /// Failed entry deliveries.
    pub entry_failures: u64,
    /// Entities received from pulls.
    pub entities_pulled: u64,
    /// Runs skipped because another was active.
    pub runs_skipped: u64,
    /// Epoch millis of the last successful pull.
    pub last_pull_at: Option<i64>,
    /// Last run-level error.
    pub last_error: Option<String>,
}

/// Result of a full sync cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Push half.
    pub push: PushReport,
    /// Pull half.
    pub pull: PullReport,
}

/// Offline-first sync engine for one local store.
///
/// Construct it once at startup and share it (typically via `Arc`); there
/// is no global instance.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use waybill_core::LocalStore;
/// use waybill_sync_engine::{MockTransport, StaticToken, SyncConfig, SyncEngine};
/// use waybill_sync_protocol::mapper::{Signature, SignatureMapper};
///
/// let store = Arc::new(LocalStore::open_in_memory().unwrap());
/// let engine = SyncEngine::new(
///     SyncConfig::default(),
///     store,
///     MockTransport::new(),
///     Arc::new(StaticToken::new("token")),
/// );
///
/// engine
///     .save_local::<SignatureMapper>(&Signature {
///         id: "sg-1".into(),
///         pickup_request_id: "pr-1".into(),
///         signer_name: "Ana".into(),
///         image_data: "aGk=".into(),
///         signed_at: 0,
///     })
///     .unwrap();
/// assert_eq!(engine.outbox().len(), 1);
///
/// let report = engine.push().unwrap().completed().unwrap();
/// assert_eq!(report.pushed, 1);
/// assert!(engine.outbox().is_empty());
/// ```
pub struct SyncEngine<T: SyncTransport> {
    config: SyncConfig,
    store: Arc<LocalStore>,
    outbox: Outbox,
    transport: Arc<T>,
    flight: Arc<SingleFlight>,
    push: PushWorker<T>,
    pull: PullReconciler<T>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        store: Arc<LocalStore>,
        transport: T,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let transport = Arc::new(transport);
        let flight = Arc::new(SingleFlight::new());
        let outbox = Outbox::new(Arc::clone(&store), config.max_retries);
        let push = PushWorker::new(
            Arc::clone(&store),
            outbox.clone(),
            Arc::clone(&transport),
            Arc::clone(&tokens),
            Arc::clone(&flight),
            config.push_batch_size,
        );
        let pull = PullReconciler::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            tokens,
            Arc::clone(&flight),
        );
        Self {
            config,
            store,
            outbox,
            transport,
            flight,
            push,
            pull,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// The outbox.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Read access to synced records.
    pub fn records(&self) -> Records {
        Records::new(Arc::clone(&self.store))
    }

    /// The pull watermark.
    pub fn watermark(&self) -> Watermark {
        Watermark::new(Arc::clone(&self.store))
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while any sync run holds the guard.
    pub fn is_running(&self) -> bool {
        self.flight.is_active()
    }

    /// Saves a record locally and queues it for delivery, atomically.
    ///
    /// The record is marked unsynced. It is queued as a create if it was
    /// not stored before, otherwise as an update. A started
    /// [`SyncTrigger`](crate::SyncTrigger) pushes it right away.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is invalid or the commit fails.
    pub fn save_local<M: EntityMapper>(&self, local: &M::Local) -> SyncResult<EnqueueOutcome> {
        self.save_local_with_priority::<M>(local, M::ENTITY_TYPE.default_priority())
    }

    /// [`save_local`](Self::save_local) with an explicit priority.
    ///
    /// # Errors
    ///
    /// See [`save_local`](Self::save_local).
    pub fn save_local_with_priority<M: EntityMapper>(
        &self,
        local: &M::Local,
        priority: Priority,
    ) -> SyncResult<EnqueueOutcome> {
        let entity_type = M::ENTITY_TYPE;
        let id = M::local_id(local);
        let body = serde_json::to_value(local)?;
        let payload = M::into_payload(M::to_wire(local));

        let outcome = self.store.transaction(|txn| {
            let existed = records::write_local_in(txn, entity_type, id, body)?;
            let operation = if existed {
                Operation::Update
            } else {
                Operation::Create
            };
            Outbox::enqueue_in(txn, id, entity_type, operation, Some(payload), priority)
        })?;
        self.outbox.announce(outcome);
        Ok(outcome)
    }

    /// Deletes a record locally and queues the delete, atomically.
    ///
    /// Deleting a record that is neither stored nor queued does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn delete_local<M: EntityMapper>(&self, id: &str) -> SyncResult<EnqueueOutcome> {
        self.delete_entity(M::ENTITY_TYPE, id)
    }

    /// Untyped form of [`delete_local`](Self::delete_local).
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn delete_entity(&self, entity_type: EntityType, id: &str) -> SyncResult<EnqueueOutcome> {
        let outcome = self.store.transaction(|txn| {
            let existed = records::remove_in(txn, entity_type, id);
            if !existed && Outbox::find_in(txn, entity_type, id)?.is_none() {
                debug!(entity_type = %entity_type, entity_id = id, "delete of unknown record ignored");
                return Ok(EnqueueOutcome::Ignored);
            }
            Outbox::enqueue_in(
                txn,
                id,
                entity_type,
                Operation::Delete,
                None,
                entity_type.default_priority(),
            )
        })?;
        self.outbox.announce(outcome);
        Ok(outcome)
    }

    /// Drains one outbox batch.
    ///
    /// # Errors
    ///
    /// Returns a precondition or store error that stopped the run.
    pub fn push(&self) -> SyncResult<RunOutcome<PushReport>> {
        let Some(guard) = self.flight.try_acquire() else {
            self.stats.write().runs_skipped += 1;
            return Ok(RunOutcome::Skipped);
        };
        let result = self.with_state(SyncState::Pushing, || self.push.drain(&guard));
        self.record_push(&result);
        result.map(RunOutcome::Completed)
    }

    /// Pulls server changes since the watermark.
    ///
    /// # Errors
    ///
    /// Returns the failure that stopped the pull; the watermark is kept.
    pub fn pull(&self) -> SyncResult<RunOutcome<PullReport>> {
        let Some(guard) = self.flight.try_acquire() else {
            self.stats.write().runs_skipped += 1;
            return Ok(RunOutcome::Skipped);
        };
        let result = self.with_state(SyncState::Pulling, || self.pull.drain(&guard));
        self.record_pull(&result);
        result.map(RunOutcome::Completed)
    }

    /// Runs a full cycle: push, then pull, under one guard.
    ///
    /// Per-entry push failures do not stop the pull; a run-level push
    /// failure does.
    ///
    /// # Errors
    ///
    /// Returns the first run-level failure.
    pub fn sync(&self) -> SyncResult<RunOutcome<CycleReport>> {
        let Some(guard) = self.flight.try_acquire() else {
            self.stats.write().runs_skipped += 1;
            debug!("sync cycle skipped; a sync run is active");
            return Ok(RunOutcome::Skipped);
        };

        let push = self.with_state(SyncState::Pushing, || self.push.drain(&guard));
        self.record_push(&push);
        let push = push?;

        let pull = self.with_state(SyncState::Pulling, || self.pull.drain(&guard));
        self.record_pull(&pull);
        let pull = pull?;

        self.stats.write().cycles_completed += 1;
        Ok(RunOutcome::Completed(CycleReport { push, pull }))
    }

    fn with_state<R>(&self, state: SyncState, f: impl FnOnce() -> R) -> R {
        *self.state.write() = state;
        let result = f();
        *self.state.write() = SyncState::Idle;
        result
    }

    fn record_push(&self, result: &SyncResult<PushReport>) {
        let mut stats = self.stats.write();
        match result {
            Ok(report) => {
                stats.entries_pushed += report.pushed as u64;
                stats.entry_failures += report.failures.len() as u64;
            }
            Err(err) => note_error(&mut stats, "push", err),
        }
    }

    fn record_pull(&self, result: &SyncResult<PullReport>) {
        let mut stats = self.stats.write();
        match result {
            Ok(report) => {
                stats.entities_pulled += report.received as u64;
                stats.last_pull_at = Some(now_millis());
                stats.last_error = None;
            }
            Err(err) => note_error(&mut stats, "pull", err),
        }
    }
}

fn note_error(stats: &mut SyncStats, phase: &str, err: &SyncError) {
    if err.kind() == FailureKind::Precondition {
        debug!(phase, error = %err, "sync run not started");
    } else {
        warn!(phase, error = %err, "sync run failed");
    }
    stats.last_error = Some(format!("{phase}: {err}"));
}
