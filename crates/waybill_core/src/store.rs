//! The journaled record store.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::{JournalFrame, WriteOp};
use crate::transaction::{Tables, Transaction};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};
use waybill_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Point-in-time statistics about a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of non-empty tables.
    pub tables: usize,
    /// Number of records across all tables.
    pub records: usize,
    /// Journal size in bytes.
    pub journal_bytes: u64,
    /// Sequence number of the last committed frame.
    pub last_seq: u64,
    /// Frames appended since the journal was last compacted.
    pub frames_since_compaction: u64,
}

struct StoreInner {
    backend: Box<dyn StorageBackend>,
    tables: Tables,
    last_seq: u64,
    frames_since_compaction: u64,
}

/// A durable store of JSON records grouped into tables.
///
/// All mutation goes through [`transaction`](Self::transaction). Writers
/// are serialized; readers never observe a half-applied transaction.
///
/// # Example
///
/// ```rust
/// use waybill_core::{CoreError, LocalStore};
/// use serde_json::json;
///
/// let store = LocalStore::open_in_memory().unwrap();
/// store.transaction(|txn| {
///     txn.put("photo", "ph-1", json!({ "caption": "dock 4" }));
///     Ok::<_, CoreError>(())
/// }).unwrap();
/// assert_eq!(store.count("photo"), 1);
/// ```
pub struct LocalStore {
    config: StoreConfig,
    inner: RwLock<StoreInner>,
    dir: Option<StoreDir>,
}

impl LocalStore {
    /// Opens (or creates) a store directory and replays its journal.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if another handle has the
    /// directory open, or an error if the journal cannot be read.
    pub fn open(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path, true)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        let mut store = Self::open_with_backend(config, Box::new(backend))?;
        info!(path = %path.display(), records = store.stats().records, "opened local store");
        store.dir = Some(dir);
        Ok(store)
    }

    /// Opens an empty store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other openers.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(StoreConfig::default(), Box::new(InMemoryBackend::new()))
    }

    /// Opens a store on top of an arbitrary backend, replaying what it holds.
    ///
    /// A torn frame at the end of the journal is cut off.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or holds frames of an
    /// unknown format version.
    pub fn open_with_backend(
        config: StoreConfig,
        mut backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let bytes = backend.read_all()?;
        let (frames, used) = JournalFrame::decode_all(&bytes)?;

        if used < bytes.len() {
            warn!(
                valid_bytes = used,
                dropped_bytes = bytes.len() - used,
                "dropping torn journal tail"
            );
            backend.truncate(used as u64)?;
        }

        let mut tables = Tables::new();
        let mut last_seq = 0;
        for frame in &frames {
            apply_ops(&mut tables, &frame.ops);
            last_seq = frame.seq;
        }
        debug!(frames = frames.len(), last_seq, "replayed journal");

        Ok(Self {
            config,
            inner: RwLock::new(StoreInner {
                backend,
                tables,
                last_seq,
                frames_since_compaction: frames.len() as u64,
            }),
            dir: None,
        })
    }

    /// Returns the store directory, if file-backed.
    #[must_use]
    pub fn dir(&self) -> Option<&StoreDir> {
        self.dir.as_ref()
    }

    /// Runs `f` as one atomic transaction.
    ///
    /// If `f` returns `Ok`, its writes are appended to the journal as one
    /// frame (synced when [`StoreConfig::sync_on_commit`] is set) and then
    /// applied. If `f` returns `Err`, nothing is written.
    ///
    /// The store's write lock is held while `f` runs; keep network calls
    /// out of it.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the commit failure converted into `E`.
    pub fn transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R, E>,
        E: From<CoreError>,
    {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let mut txn = Transaction::new(&inner.tables);
        let result = f(&mut txn)?;
        let ops = txn.into_ops();

        if !ops.is_empty() {
            self.commit(inner, ops).map_err(E::from)?;
        }
        Ok(result)
    }

    fn commit(&self, inner: &mut StoreInner, ops: Vec<WriteOp>) -> CoreResult<()> {
        let frame = JournalFrame {
            seq: inner.last_seq + 1,
            ops,
        };
        let bytes = frame.encode()?;
        let before = inner.backend.size()?;

        let appended = inner.backend.append(&bytes).and_then(|_| {
            if self.config.sync_on_commit {
                inner.backend.sync()
            } else {
                Ok(())
            }
        });
        if let Err(err) = appended {
            // Leave no partial frame for the next append to land behind.
            if let Err(undo) = inner.backend.truncate(before) {
                warn!(error = %undo, "could not roll back failed journal append");
            }
            return Err(err.into());
        }

        apply_ops(&mut inner.tables, &frame.ops);
        inner.last_seq = frame.seq;
        inner.frames_since_compaction += 1;

        if let Some(limit) = self.config.compact_after_frames {
            if inner.frames_since_compaction >= limit {
                if let Err(err) = compact_locked(inner) {
                    warn!(error = %err, "automatic journal compaction failed");
                }
            }
        }
        Ok(())
    }

    /// Rewrites the journal as a single snapshot frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written; the old journal
    /// stays in place in that case.
    pub fn compact(&self) -> CoreResult<()> {
        compact_locked(&mut self.inner.write())
    }

    /// Returns a record body.
    #[must_use]
    pub fn get(&self, table: &str, id: &str) -> Option<Value> {
        self.inner
            .read()
            .tables
            .get(table)
            .and_then(|t| t.get(id))
            .cloned()
    }

    /// Returns a record decoded as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordShape`] if the body does not decode.
    pub fn get_as<T: DeserializeOwned>(&self, table: &str, id: &str) -> CoreResult<Option<T>> {
        self.get(table, id)
            .map(|value| {
                serde_json::from_value(value).map_err(|source| CoreError::RecordShape {
                    table: table.to_string(),
                    id: id.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Returns true if the record exists.
    #[must_use]
    pub fn contains(&self, table: &str, id: &str) -> bool {
        self.inner
            .read()
            .tables
            .get(table)
            .is_some_and(|t| t.contains_key(id))
    }

    /// Returns every record of `table`, ordered by id.
    #[must_use]
    pub fn scan(&self, table: &str) -> Vec<(String, Value)> {
        self.inner
            .read()
            .tables
            .get(table)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Returns the number of records in `table`.
    #[must_use]
    pub fn count(&self, table: &str) -> usize {
        self.inner.read().tables.get(table).map_or(0, |t| t.len())
    }

    /// Returns the names of all non-empty tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.inner
            .read()
            .tables
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns current store statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            tables: inner.tables.values().filter(|t| !t.is_empty()).count(),
            records: inner.tables.values().map(|t| t.len()).sum(),
            journal_bytes: inner.backend.size().unwrap_or(0),
            last_seq: inner.last_seq,
            frames_since_compaction: inner.frames_since_compaction,
        }
    }
}

fn apply_ops(tables: &mut Tables, ops: &[WriteOp]) {
    for op in ops {
        match op {
            WriteOp::Put { table, id, value } => {
                tables
                    .entry(table.clone())
                    .or_default()
                    .insert(id.clone(), value.clone());
            }
            WriteOp::Delete { table, id } => {
                if let Some(t) = tables.get_mut(table) {
                    t.remove(id);
                }
            }
        }
    }
}

fn compact_locked(inner: &mut StoreInner) -> CoreResult<()> {
    let ops: Vec<WriteOp> = inner
        .tables
        .iter()
        .flat_map(|(table, records)| {
            records.iter().map(move |(id, value)| WriteOp::Put {
                table: table.clone(),
                id: id.clone(),
                value: value.clone(),
            })
        })
        .collect();

    let bytes = if ops.is_empty() {
        Vec::new()
    } else {
        JournalFrame {
            seq: inner.last_seq,
            ops,
        }
        .encode()?
    };

    let before = inner.backend.size()?;
    inner.backend.rewrite(&bytes)?;
    inner.frames_since_compaction = 0;
    debug!(before, after = bytes.len(), "compacted journal");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Branch {
        name: String,
        open: bool,
    }

    fn put(store: &LocalStore, table: &str, id: &str, value: Value) {
        store
            .transaction(|txn| {
                txn.put(table, id, value);
                Ok::<_, CoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn committed_writes_are_visible() {
        let store = LocalStore::open_in_memory().unwrap();
        put(&store, "branch", "b1", json!({ "name": "North", "open": true }));

        let branch: Branch = store.get_as("branch", "b1").unwrap().unwrap();
        assert_eq!(branch.name, "North");
        assert!(store.contains("branch", "b1"));
        assert_eq!(store.count("branch"), 1);
        assert_eq!(store.table_names(), vec!["branch"]);
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let store = LocalStore::open_in_memory().unwrap();
        let result: Result<(), CoreError> = store.transaction(|txn| {
            txn.put("branch", "b1", json!({}));
            Err(CoreError::invalid_argument("rejected"))
        });

        assert!(result.is_err());
        assert!(!store.contains("branch", "b1"));
        assert_eq!(store.stats().last_seq, 0);
    }

    #[test]
    fn read_only_transaction_appends_no_frame() {
        let store = LocalStore::open_in_memory().unwrap();
        let seen = store
            .transaction(|txn| Ok::<_, CoreError>(txn.contains("branch", "b1")))
            .unwrap();
        assert!(!seen);
        assert_eq!(store.stats().journal_bytes, 0);
    }

    #[test]
    fn journal_replays_after_reopen() {
        let root = tempdir().unwrap();
        {
            let store = LocalStore::open(root.path(), StoreConfig::default()).unwrap();
            put(&store, "outbox", "1", json!({ "attempts": 0 }));
            put(&store, "outbox", "2", json!({ "attempts": 1 }));
            store
                .transaction(|txn| {
                    txn.delete("outbox", "1");
                    Ok::<_, CoreError>(())
                })
                .unwrap();
        }

        let store = LocalStore::open(root.path(), StoreConfig::default()).unwrap();
        assert!(!store.contains("outbox", "1"));
        assert_eq!(store.get("outbox", "2"), Some(json!({ "attempts": 1 })));
        assert_eq!(store.stats().last_seq, 3);
    }

    #[test]
    fn torn_frame_is_discarded_on_open() {
        let store = LocalStore::open_in_memory().unwrap();
        put(&store, "item", "i1", json!({ "qty": 1 }));

        let good = {
            let inner = store.inner.read();
            inner.backend.read_all().unwrap()
        };
        let mut torn = good.clone();
        let extra = JournalFrame {
            seq: 2,
            ops: vec![WriteOp::Put {
                table: "item".into(),
                id: "i2".into(),
                value: json!({ "qty": 2 }),
            }],
        }
        .encode()
        .unwrap();
        torn.extend_from_slice(&extra[..extra.len() / 2]);

        let reopened = LocalStore::open_with_backend(
            StoreConfig::default(),
            Box::new(InMemoryBackend::with_data(torn)),
        )
        .unwrap();
        assert!(reopened.contains("item", "i1"));
        assert!(!reopened.contains("item", "i2"));
        assert_eq!(reopened.stats().journal_bytes, good.len() as u64);

        // the next commit lands on a clean boundary
        put(&reopened, "item", "i3", json!({ "qty": 3 }));
        let bytes = reopened.inner.read().backend.read_all().unwrap();
        let (frames, used) = JournalFrame::decode_all(&bytes).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn compaction_preserves_contents() {
        let root = tempdir().unwrap();
        {
            let store = LocalStore::open(root.path(), StoreConfig::default()).unwrap();
            for i in 0..20 {
                put(&store, "location-ping", "driver-1", json!({ "seq": i }));
            }
            let before = store.stats().journal_bytes;
            store.compact().unwrap();
            let stats = store.stats();
            assert!(stats.journal_bytes < before);
            assert_eq!(stats.frames_since_compaction, 0);
            put(&store, "location-ping", "driver-2", json!({ "seq": 0 }));
        }

        let store = LocalStore::open(root.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.get("location-ping", "driver-1"), Some(json!({ "seq": 19 })));
        assert!(store.contains("location-ping", "driver-2"));
    }

    #[test]
    fn automatic_compaction_kicks_in() {
        let store = LocalStore::open_with_backend(
            StoreConfig::new().with_compact_after_frames(Some(5)),
            Box::new(InMemoryBackend::new()),
        )
        .unwrap();
        for i in 0..5 {
            put(&store, "assignment", "a1", json!({ "rev": i }));
        }
        assert_eq!(store.stats().frames_since_compaction, 0);
        assert_eq!(store.get("assignment", "a1"), Some(json!({ "rev": 4 })));
    }

    #[test]
    fn second_handle_on_same_directory_is_rejected() {
        let root = tempdir().unwrap();
        let _first = LocalStore::open(root.path(), StoreConfig::default()).unwrap();
        assert!(matches!(
            LocalStore::open(root.path(), StoreConfig::default()),
            Err(CoreError::StoreLocked)
        ));
    }
}
