//! Names of the store tables owned by the sync engine.
//!
//! Synced records live in one table per entity type, named by the type's
//! tag (`pickup-request`, `item`, ...). The tables below hold sync state.

/// Outbox entries keyed by zero-padded entry id.
pub const OUTBOX_TABLE: &str = "outbox";

/// `<entity-type>/<entity-id>` to entry id; enforces one entry per entity.
pub const OUTBOX_INDEX_TABLE: &str = "outbox.index";

/// `<entity-type>/<entity-id>` to the watermark of the first pull that
/// skipped the entity while a local edit was queued.
pub const PULL_DEFERRED_TABLE: &str = "pull.deferred";

/// Counters and the pull watermark.
pub const SYNC_META_TABLE: &str = "sync.meta";

pub(crate) const NEXT_ENTRY_ID_KEY: &str = "outbox.next_id";
pub(crate) const WATERMARK_KEY: &str = "pull.watermark";
