//! The "a sync run is active" guard.

use std::sync::atomic::{AtomicBool, Ordering};

/// Admits at most one sync run at a time.
///
/// Push and pull share one guard, so they never overlap each other or
/// themselves.
#[derive(Debug, Default)]
pub struct SingleFlight {
    active: AtomicBool,
}

impl SingleFlight {
    /// Creates an idle guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the guard, or returns `None` if a run is already active.
    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flight: self })
    }

    /// Returns true while a run holds the guard.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the active run. Released on drop.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.active.store(false, Ordering::Release);
    }
}

/// Result of asking for a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<R> {
    /// The run happened.
    Completed(R),
    /// Another run was active; nothing was done.
    Skipped,
}

impl<R> RunOutcome<R> {
    /// Returns the report if the run happened.
    pub fn completed(self) -> Option<R> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Skipped => None,
        }
    }

    /// Returns true if the run was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped)
    }
}
