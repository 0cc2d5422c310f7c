//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use waybill_sync_protocol::{PullData, Route};

/// A sync transport handles network communication with the server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.).
pub trait SyncTransport: Send + Sync {
    /// Delivers one outbox entry. Returns the envelope's `data`, if any.
    fn send_entry(&self, route: &Route, body: Option<&Value>, token: &str) -> SyncResult<Option<Value>>;

    /// Fetches everything changed after `last_sync_at` (epoch millis).
    fn pull(&self, last_sync_at: i64, token: &str) -> SyncResult<PullData>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Records a connectivity change reported by the platform.
    fn set_connected(&self, connected: bool);
}

type SendHook = Box<dyn FnMut(&Route) + Send>;

/// A scripted transport for testing.
///
/// Push calls answer from a queue of results, then with `Ok(None)` once the
/// queue is empty.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    push_results: Mutex<VecDeque<SyncResult<Option<Value>>>>,
    pull_results: Mutex<VecDeque<SyncResult<PullData>>>,
    sent: Mutex<Vec<(Route, Option<Value>)>>,
    pulls: Mutex<Vec<i64>>,
    on_send: Mutex<Option<SendHook>>,
}

impl MockTransport {
    /// Creates a new connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues the result of the next push call.
    pub fn push_result(&self, result: SyncResult<Option<Value>>) {
        self.push_results.lock().push_back(result);
    }

    /// Queues the result of the next pull call.
    pub fn pull_result(&self, result: SyncResult<PullData>) {
        self.pull_results.lock().push_back(result);
    }

    /// Runs `hook` inside every push call, before it answers.
    pub fn on_send(&self, hook: impl FnMut(&Route) + Send + 'static) {
        *self.on_send.lock() = Some(Box::new(hook));
    }

    /// Every push call so far.
    pub fn sent(&self) -> Vec<(Route, Option<Value>)> {
        self.sent.lock().clone()
    }

    /// The `lastSyncAt` of every pull call so far.
    pub fn pulls(&self) -> Vec<i64> {
        self.pulls.lock().clone()
    }
}

impl SyncTransport for MockTransport {
    fn send_entry(&self, route: &Route, body: Option<&Value>, _token: &str) -> SyncResult<Option<Value>> {
        self.sent.lock().push((route.clone(), body.cloned()));
        if let Some(hook) = self.on_send.lock().as_mut() {
            hook(route);
        }
        self.push_results.lock().pop_front().unwrap_or(Ok(None))
    }

    fn pull(&self, last_sync_at: i64, _token: &str) -> SyncResult<PullData> {
        self.pulls.lock().push(last_sync_at);
        self.pull_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Network("no mock pull response set".into())))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waybill_sync_protocol::{EntityType, Operation};

    #[test]
    fn mock_answers_in_order_then_succeeds() {
        let mock = MockTransport::new();
        mock.push_result(Err(SyncError::Timeout));
        let route = Route::for_entry(EntityType::Item, Operation::Create, "it-1");

        assert!(mock.send_entry(&route, Some(&json!({})), "t").is_err());
        assert_eq!(mock.send_entry(&route, None, "t").unwrap(), None);
        assert_eq!(mock.sent().len(), 2);
    }

    #[test]
    fn mock_pull_without_script_fails() {
        let mock = MockTransport::new();
        assert!(mock.pull(0, "t").is_err());
        assert_eq!(mock.pulls(), vec![0]);
    }

    #[test]
    fn mock_connectivity() {
        let mock = MockTransport::new();
        assert!(mock.is_connected());
        mock.set_connected(false);
        assert!(!mock.is_connected());
    }
}
