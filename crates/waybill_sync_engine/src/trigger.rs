//! Background scheduling of sync runs.
//!
//! [`SyncTrigger`] owns one tokio task that funnels three kinds of events
//! into the engine:
//!
//! - a fixed interval tick runs a full cycle (push, then pull)
//! - a connectivity transition from offline to online runs a full cycle
//! - an outbox enqueue runs a push-only pass
//!
//! Every run goes through the engine's single-flight guard on tokio's
//! blocking pool, so overlapping triggers collapse into the active run.

use crate::engine::{CycleReport, SyncEngine};
use crate::error::{FailureKind, SyncError, SyncResult};
use crate::flight::RunOutcome;
use crate::transport::SyncTransport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Which part of the sync cycle a trigger asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    PushOnly,
    Full,
}

/// Schedules sync runs for one engine.
///
/// Construct it once at startup next to the engine and pass it by
/// reference. `start` must be called from within a tokio runtime.
pub struct SyncTrigger<T: SyncTransport + 'static> {
    engine: Arc<SyncEngine<T>>,
    nudge: Arc<Notify>,
    online: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: SyncTransport + 'static> SyncTrigger<T> {
    /// Creates a stopped trigger for `engine`.
    pub fn new(engine: Arc<SyncEngine<T>>) -> Self {
        let (online, _) = watch::channel(engine.transport().is_connected());
        let (shutdown, _) = watch::channel(false);
        Self {
            nudge: engine.outbox().enqueued(),
            engine,
            online,
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// The engine this trigger drives.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.engine
    }

    /// Returns true while the background task is running.
    pub fn is_started(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawns the background task. Does nothing if it is already running.
    ///
    /// The first interval tick fires immediately, so a full cycle runs as
    /// soon as the task starts.
    pub fn start(&self) {
        let mut slot = self.task.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("sync trigger already started");
            return;
        }

        self.shutdown.send_replace(false);
        let period = self.engine.config().sync_interval.max(MIN_INTERVAL);
        *slot = Some(tokio::spawn(run_loop(
            Arc::clone(&self.engine),
            period,
            Arc::clone(&self.nudge),
            self.online.subscribe(),
            self.shutdown.subscribe(),
        )));
        info!(interval_ms = period.as_millis() as u64, "sync trigger started");
    }

    /// Stops the background task, waiting for an in-flight run to finish.
    pub async fn stop(&self) {
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return;
        };
        self.shutdown.send_replace(true);
        if let Err(err) = handle.await {
            error!(error = %err, "sync trigger task failed");
        }
        info!("sync trigger stopped");
    }

    /// Reports a connectivity change from the platform.
    ///
    /// Going from offline to online schedules a full cycle.
    pub fn set_online(&self, online: bool) {
        self.engine.transport().set_connected(online);
        let was_online = self.online.send_replace(online);
        if was_online != online {
            info!(online, "connectivity changed");
        }
    }

    /// Runs a full cycle now on the blocking pool and waits for it.
    ///
    /// # Errors
    ///
    /// Returns the cycle's failure, or [`SyncError::Background`] if the
    /// blocking task could not complete.
    pub async fn run_now(&self) -> SyncResult<RunOutcome<CycleReport>> {
        let engine = Arc::clone(&self.engine);
        task::spawn_blocking(move || engine.sync())
            .await
            .map_err(|err| SyncError::Background(err.to_string()))?
    }
}

async fn run_loop<T: SyncTransport + 'static>(
    engine: Arc<SyncEngine<T>>,
    period: Duration,
    nudge: Arc<Notify>,
    mut online: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut was_online = *online.borrow_and_update();

    loop {
        let cycle = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow_and_update() {
                    break;
                }
                continue;
            }
            Ok(()) = online.changed() => {
                let now_online = *online.borrow_and_update();
                let regained = now_online && !was_online;
                was_online = now_online;
                if !regained {
                    continue;
                }
                info!("connectivity regained; running sync cycle");
                Cycle::Full
            }
            _ = ticker.tick() => Cycle::Full,
            () = nudge.notified() => Cycle::PushOnly,
        };
        run_cycle(&engine, cycle).await;
    }
    debug!("sync trigger loop exited");
}

async fn run_cycle<T: SyncTransport + 'static>(engine: &Arc<SyncEngine<T>>, cycle: Cycle) {
    let worker = Arc::clone(engine);
    let joined = task::spawn_blocking(move || match cycle {
        Cycle::PushOnly => worker.push().map(|outcome| outcome.is_skipped()),
        Cycle::Full => worker.sync().map(|outcome| outcome.is_skipped()),
    })
    .await;

    match joined {
        Ok(Ok(true)) => debug!(?cycle, "trigger collapsed into the active run"),
        Ok(Ok(false)) => debug!(?cycle, "triggered run finished"),
        Ok(Err(err)) if err.kind() == FailureKind::Precondition => {
            debug!(?cycle, error = %err, "triggered run not started")
        }
        Ok(Err(err)) => warn!(?cycle, error = %err, "triggered run failed"),
        Err(err) => error!(?cycle, error = %err, "sync task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::config::SyncConfig;
    use crate::transport::MockTransport;
    use serde_json::json;
    use waybill_core::LocalStore;
    use waybill_sync_protocol::mapper::{EntityMapper, Signature, SignatureMapper};
    use waybill_sync_protocol::{EntityType, Operation, Priority, PullData};

    fn trigger(interval: Duration) -> SyncTrigger<MockTransport> {
        let engine = SyncEngine::new(
            SyncConfig::default().with_sync_interval(interval),
            Arc::new(LocalStore::open_in_memory().unwrap()),
            MockTransport::new(),
            Arc::new(StaticToken::new("token")),
        );
        SyncTrigger::new(Arc::new(engine))
    }

    fn signature(id: &str) -> Signature {
        Signature {
            id: id.into(),
            pickup_request_id: "pr-1".into(),
            signer_name: "Budi".into(),
            image_data: "aGk=".into(),
            signed_at: 1_714_000_000_000,
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn run_now_pushes_then_pulls() {
        let trigger = trigger(Duration::from_secs(3600));
        trigger.engine().save_local::<SignatureMapper>(&signature("sg-1")).unwrap();
        trigger
            .engine()
            .transport()
            .pull_result(Ok(PullData::from_data(Some(json!({ "serverTime": 42 }))).unwrap()));

        let report = trigger.run_now().await.unwrap().completed().unwrap();
        assert_eq!(report.push.pushed, 1);
        assert_eq!(trigger.engine().watermark().get(), 42);
        assert!(!trigger.is_started());
    }

    #[tokio::test]
    async fn enqueue_nudges_a_push() {
        let trigger = trigger(Duration::from_secs(3600));
        trigger.start();
        assert!(trigger.is_started());

        trigger.engine().save_local::<SignatureMapper>(&signature("sg-1")).unwrap();
        let engine = Arc::clone(trigger.engine());
        assert!(eventually(|| engine.outbox().is_empty()).await);

        trigger.stop().await;
        assert!(!trigger.is_started());
    }

    #[tokio::test]
    async fn direct_outbox_enqueue_nudges_a_push() {
        let trigger = trigger(Duration::from_secs(3600));
        trigger.start();
        let engine = Arc::clone(trigger.engine());
        assert!(eventually(|| !engine.transport().pulls().is_empty()).await);

        let local = signature("sg-2");
        let payload = SignatureMapper::into_payload(SignatureMapper::to_wire(&local));
        engine
            .outbox()
            .enqueue("sg-2", EntityType::Signature, Operation::Create, Some(payload), Priority::LOW)
            .unwrap();
        assert!(eventually(|| engine.outbox().is_empty()).await);
        assert_eq!(engine.transport().sent().len(), 1);

        trigger.stop().await;
    }

    #[tokio::test]
    async fn regaining_connectivity_runs_a_full_cycle() {
        let trigger = trigger(Duration::from_secs(3600));
        trigger.set_online(false);
        trigger.start();

        trigger.engine().save_local::<SignatureMapper>(&signature("sg-1")).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(trigger.engine().outbox().len(), 1);
        assert!(trigger.engine().transport().pulls().is_empty());

        trigger.set_online(true);
        let engine = Arc::clone(trigger.engine());
        assert!(eventually(|| engine.outbox().is_empty() && !engine.transport().pulls().is_empty()).await);

        trigger.stop().await;
    }

    #[tokio::test]
    async fn interval_ticks_run_cycles() {
        let trigger = trigger(Duration::from_millis(20));
        trigger.start();

        let engine = Arc::clone(trigger.engine());
        assert!(eventually(|| engine.transport().pulls().len() >= 2).await);

        trigger.stop().await;
    }

    #[tokio::test]
    async fn stopped_trigger_does_not_push() {
        let trigger = trigger(Duration::from_secs(3600));
        trigger.start();
        trigger.stop().await;

        trigger.engine().save_local::<SignatureMapper>(&signature("sg-1")).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(trigger.engine().outbox().len(), 1);
    }

    #[tokio::test]
    async fn start_twice_keeps_one_task() {
        let trigger = trigger(Duration::from_secs(3600));
        trigger.start();
        trigger.start();
        assert!(trigger.is_started());
        trigger.stop().await;
        trigger.stop().await;
        assert!(!trigger.is_started());
    }
}
