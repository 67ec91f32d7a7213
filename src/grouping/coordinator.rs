//! In-flight guard for reconciliation runs.
//!
//! Every trigger (user action, lifecycle event, timer) funnels through one
//! [`ReconcileCoordinator`]. At most one run is active; a trigger that arrives
//! while a run is active is coalesced into a single rerun after it.
//!
//! ```text
//! Idle ──trigger──▶ Running ──trigger──▶ RunningWithPendingRerun
//!  ▲                  │  ▲                        │
//!  └──── done ────────┘  └──────── done ──────────┘ (rerun)
//! ```

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// State token of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    RunningWithPendingRerun,
}

/// What a caller of [`ReconcileCoordinator::trigger`] gets back.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome<T> {
    /// This caller drove the run; `T` is the result of the last pass.
    Completed(T),
    /// A run was already active; a rerun has been scheduled on it.
    Coalesced,
}

impl<T> TriggerOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            TriggerOutcome::Completed(value) => Some(value),
            TriggerOutcome::Coalesced => None,
        }
    }
}

/// Serializes reconciliation runs.
#[derive(Debug)]
pub struct ReconcileCoordinator {
    state: Mutex<RunState>,
}

impl Default for ReconcileCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.lock()
    }

    // The guarded value is a plain enum, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `run` unless a run is already active, in which case schedule one
    /// rerun and return [`TriggerOutcome::Coalesced`].
    ///
    /// The driving caller loops until no rerun is pending and returns the
    /// result of the final pass. If the driving future is dropped mid-run the
    /// coordinator returns to `Idle`.
    pub async fn trigger<F, Fut, T>(&self, mut run: F) -> TriggerOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
    {
        {
            let mut state = self.lock();
            match *state {
                RunState::Idle => *state = RunState::Running,
                RunState::Running | RunState::RunningWithPendingRerun => {
                    *state = RunState::RunningWithPendingRerun;
                    tracing::info!("reconciliation already running, coalescing trigger");
                    return TriggerOutcome::Coalesced;
                }
            }
        }

        let guard = IdleOnDrop { coordinator: self };
        let mut passes = 0u32;
        loop {
            passes += 1;
            let result = run().await;

            let rerun = {
                let mut state = self.lock();
                if *state == RunState::RunningWithPendingRerun {
                    *state = RunState::Running;
                    true
                } else {
                    *state = RunState::Idle;
                    false
                }
            };
            if rerun {
                tracing::info!(pass = passes + 1, "running coalesced reconciliation");
                continue;
            }
            std::mem::forget(guard);
            tracing::debug!(passes, "reconciliation finished");
            return TriggerOutcome::Completed(result);
        }
    }
}

/// Resets the coordinator if the driving future is dropped mid-run.
struct IdleOnDrop<'a> {
    coordinator: &'a ReconcileCoordinator,
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.coordinator.lock() = RunState::Idle;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
