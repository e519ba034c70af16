//! Externally ticked scheduling policy.
//!
//! The context advances only when a caller supplies a tick together with
//! the new logical timestamp; wall-clock time never drives dispatch. In
//! synchronous mode the tick protocol runs on the caller's thread, with
//! overlapping callers serialized by a dispatch lock. In asynchronous mode
//! `tick` only signals a dedicated worker and returns; that worker also
//! self-signals on transition requests so synchronous activation waits can
//! converge without an external tick.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::context::{ContextProfile, ExecutionContextCore, PolicyHooks, TransitionPolicy};
use crate::core::error::ContextError;
use crate::core::unit::{LifecycleState, UnitHandle};
use crate::sched::worker::{WorkerControl, WorkerGate, WorkerSignal};
use crate::sched::ExecutionContext;

/// Where the tick protocol runs relative to the caller of `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    /// Dispatch on the caller's thread before `tick` returns.
    Synchronous,
    /// Signal a dedicated worker thread and return immediately.
    Asynchronous,
}

/// Execution context advanced by externally supplied ticks.
pub struct TickScheduler {
    core: Arc<ExecutionContextCore>,
    worker: Arc<WorkerControl>,
    mode: TickMode,
    clock: Mutex<Duration>,
    dispatch: Mutex<()>,
}

/// Hook sink for the asynchronous variant: a pending transition request
/// signals the worker, so the request converges on a self-generated tick.
/// The synchronous variant installs no hooks; pending requests wait for
/// the next external tick.
struct TickHooks {
    worker: Arc<WorkerControl>,
}

impl PolicyHooks for TickHooks {
    fn on_waiting_activated(&self) {
        self.worker.wake();
    }
    fn on_waiting_deactivated(&self) {
        self.worker.wake();
    }
    fn on_waiting_reset(&self) {
        self.worker.wake();
    }
}

impl TickScheduler {
    /// Build an externally ticked context. The rate still matters: it
    /// bounds the poll interval of synchronous transition waits and is
    /// reported in the profile as the nominal tick rate.
    pub fn new(
        rate_hz: f64,
        policy: TransitionPolicy,
        mode: TickMode,
    ) -> Result<Self, ContextError> {
        let core = Arc::new(ExecutionContextCore::new("ticked", rate_hz, policy)?);
        let worker = Arc::new(WorkerControl::new());
        if mode == TickMode::Asynchronous {
            core.set_hooks(Arc::new(TickHooks {
                worker: worker.clone(),
            }));
        }
        Ok(Self {
            core,
            worker,
            mode,
            clock: Mutex::new(Duration::ZERO),
            dispatch: Mutex::new(()),
        })
    }

    /// The shared context core, for diagnostics and tests.
    pub fn core(&self) -> &Arc<ExecutionContextCore> {
        &self.core
    }

    /// Dispatch mode this context was built with.
    pub fn mode(&self) -> TickMode {
        self.mode
    }

    fn ensure_worker(&self) -> Result<(), ContextError> {
        if self.mode != TickMode::Asynchronous {
            return Ok(());
        }
        let core = self.core.clone();
        self.worker.spawn_once("ticked-ec-worker", move |gate| {
            run_worker(core, gate);
        })
    }
}

impl ExecutionContext for TickScheduler {
    fn start(&self) -> Result<(), ContextError> {
        self.ensure_worker()?;
        self.core.start()
    }

    fn stop(&self) -> Result<(), ContextError> {
        self.core.stop()
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn rate_hz(&self) -> f64 {
        self.core.rate_hz()
    }

    fn set_rate(&self, rate_hz: f64) -> Result<(), ContextError> {
        self.core.set_rate(rate_hz)
    }

    fn add_unit(&self, unit: Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        self.core.add_unit(unit)
    }

    fn remove_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        self.core.remove_unit(unit)
    }

    fn activate_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        self.core.activate_unit(unit)
    }

    fn deactivate_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        self.core.deactivate_unit(unit)
    }

    fn reset_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        self.core.reset_unit(unit)
    }

    fn unit_state(&self, unit: &Arc<dyn UnitHandle>) -> Result<LifecycleState, ContextError> {
        self.core.unit_state(unit)
    }

    fn is_all_current(&self, state: LifecycleState) -> bool {
        self.core.is_all_current(state)
    }

    fn is_all_next(&self, state: LifecycleState) -> bool {
        self.core.is_all_next(state)
    }

    fn is_one_of_current(&self, state: LifecycleState) -> bool {
        self.core.is_one_of_current(state)
    }

    fn is_one_of_next(&self, state: LifecycleState) -> bool {
        self.core.is_one_of_next(state)
    }

    fn profile(&self) -> ContextProfile {
        self.core.profile()
    }

    /// Advance the logical clock to `timestamp` and run (or schedule) one
    /// tick. Ticking a stopped context is a silent no-op; the clock does
    /// not move either.
    fn tick(&self, timestamp: Duration) -> Result<(), ContextError> {
        if !self.core.is_running() {
            debug!("tick ignored, context is stopped");
            return Ok(());
        }
        match self.mode {
            TickMode::Synchronous => {
                let _serialized = self.dispatch.lock();
                *self.clock.lock() = timestamp;
                self.core.invoke_tick();
            }
            TickMode::Asynchronous => {
                *self.clock.lock() = timestamp;
                self.worker.wake();
            }
        }
        Ok(())
    }

    fn logical_time(&self) -> Option<Duration> {
        Some(*self.clock.lock())
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        let _ = self.core.stop();
        let _ = self.worker.shutdown_and_join();
    }
}

fn run_worker(core: Arc<ExecutionContextCore>, gate: WorkerGate) {
    while gate.take_work() == WorkerSignal::Work {
        core.invoke_tick();
    }
    debug!("ticked worker shutting down");
}
