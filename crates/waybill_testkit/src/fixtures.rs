//! Store and engine fixtures.

use crate::server::FakeServer;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use waybill_core::{LocalStore, StoreConfig};
use waybill_sync_engine::{HttpTransport, StaticToken, SyncConfig, SyncEngine};

/// Token every fixture engine sends.
pub const TEST_TOKEN: &str = "test-token";

/// Base URL fixture engines point at.
pub const TEST_SERVER_URL: &str = "http://waybill.test/api";

/// Engine type produced by [`test_engine`].
pub type TestEngine = SyncEngine<HttpTransport<FakeServer>>;

/// A test store with automatic cleanup.
pub struct TestStore {
    store: Arc<LocalStore>,
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(LocalStore::open_in_memory().expect("Failed to open in-memory store")),
            temp_dir: None,
        }
    }

    /// Creates a new file-backed test store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = LocalStore::open(&temp_dir.path().join("store"), StoreConfig::default())
            .expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("store"))
    }

    /// Shared handle to the store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Closes and reopens a file-backed store, replaying its journal.
    ///
    /// Every other handle to the store (engines included) must be dropped
    /// first.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores or if the store is still in use.
    pub fn reopen(self) -> Self {
        let path = self.path().expect("Only file stores can be reopened");
        let Self { store, temp_dir } = self;
        drop(store);
        let store = LocalStore::open(&path, StoreConfig::default()).expect("Failed to reopen store");
        Self {
            store: Arc::new(store),
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Sync configuration used by fixture engines.
pub fn test_config() -> SyncConfig {
    SyncConfig::new(TEST_SERVER_URL)
}

/// Builds an engine over `store` that talks to `server` in-process.
pub fn test_engine(store: &TestStore, server: &FakeServer) -> TestEngine {
    test_engine_with_config(store, server, test_config())
}

/// [`test_engine`] with a custom configuration.
pub fn test_engine_with_config(store: &TestStore, server: &FakeServer, config: SyncConfig) -> TestEngine {
    let transport = HttpTransport::with_config(&config, server.clone());
    SyncEngine::new(
        config,
        Arc::clone(store.store()),
        transport,
        Arc::new(StaticToken::new(TEST_TOKEN)),
    )
}
