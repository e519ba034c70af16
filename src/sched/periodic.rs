//! Internally clocked scheduling policy.
//!
//! A dedicated worker thread drives the tick protocol at the configured
//! rate. The thread parks on a condvar whenever there is nothing to do
//! (context stopped, or every participant settled in `Inactive`) and is
//! woken by the policy hooks when a transition request arrives. Between
//! ticks it sleeps toward a carried absolute deadline so scheduling jitter
//! does not accumulate into rate drift.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::core::context::{ContextProfile, ExecutionContextCore, PolicyHooks, TransitionPolicy};
use crate::core::error::ContextError;
use crate::core::unit::{LifecycleState, UnitHandle};
use crate::sched::worker::{WorkerControl, WorkerGate};
use crate::sched::ExecutionContext;

/// Execution context clocked by its own periodic worker thread.
pub struct PeriodicScheduler {
    core: Arc<ExecutionContextCore>,
    worker: Arc<WorkerControl>,
    no_wait: bool,
    cpu_affinity: Vec<usize>,
}

/// Hook sink waking the parked worker. Holds only the worker control, so
/// no reference cycle with the core exists.
struct PeriodicHooks {
    worker: Arc<WorkerControl>,
}

impl PolicyHooks for PeriodicHooks {
    fn on_started(&self) {
        self.worker.wake();
    }
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

impl PeriodicScheduler {
    /// Build a periodic context.
    ///
    /// `no_wait` skips the inter-tick sleep so ticks run back to back;
    /// `cpu_affinity` optionally pins the worker thread (the first valid
    /// core id wins). Construction does not spawn the thread; the worker
    /// starts lazily on the first [`ExecutionContext::start`].
    pub fn new(
        rate_hz: f64,
        policy: TransitionPolicy,
        no_wait: bool,
        cpu_affinity: Vec<usize>,
    ) -> Result<Self, ContextError> {
        let cpus = num_cpus::get();
        if let Some(bad) = cpu_affinity.iter().find(|&&id| id >= cpus) {
            return Err(ContextError::InvalidConfig(format!(
                "cpu affinity id {bad} out of range, host has {cpus} cpus"
            )));
        }
        let core = Arc::new(ExecutionContextCore::new("periodic", rate_hz, policy)?);
        let worker = Arc::new(WorkerControl::new());
        core.set_hooks(Arc::new(PeriodicHooks {
            worker: worker.clone(),
        }));
        Ok(Self {
            core,
            worker,
            no_wait,
            cpu_affinity,
        })
    }

    /// The shared context core, for diagnostics and tests.
    pub fn core(&self) -> &Arc<ExecutionContextCore> {
        &self.core
    }

    fn ensure_worker(&self) -> Result<(), ContextError> {
        let core = self.core.clone();
        let no_wait = self.no_wait;
        let affinity = self.cpu_affinity.clone();
        self.worker.spawn_once("periodic-ec-worker", move |gate| {
            run_worker(core, gate, no_wait, &affinity);
        })
    }
}

impl ExecutionContext for PeriodicScheduler {
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
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        let _ = self.core.stop();
        let _ = self.worker.shutdown_and_join();
    }
}

/// True when the worker has nothing to dispatch: context stopped, or every
/// participant settled in `Inactive` with nothing pending.
fn all_settled_inactive(core: &ExecutionContextCore) -> bool {
    core.is_all_current(LifecycleState::Inactive) && core.is_all_next(LifecycleState::Inactive)
}

fn run_worker(core: Arc<ExecutionContextCore>, gate: WorkerGate, no_wait: bool, affinity: &[usize]) {
    pin_to_core(affinity);
    loop {
        let parked = gate.park_while(|| !core.is_running() || all_settled_inactive(&core));
        if !parked {
            debug!("periodic worker shutting down");
            return;
        }
        // Deadline is re-based after every park so time spent parked does
        // not count as overrun.
        let mut deadline = Instant::now() + core.period();
        loop {
            if gate.is_shutdown() {
                debug!("periodic worker shutting down");
                return;
            }
            if !core.is_running() {
                break;
            }
            core.invoke_tick();
            if all_settled_inactive(&core) {
                break;
            }
            if no_wait {
                continue;
            }
            let now = Instant::now();
            if now < deadline {
                std::thread::sleep(deadline - now);
                deadline += core.period();
            } else {
                // Overrun: re-base instead of bursting to catch up.
                deadline = now + core.period();
            }
        }
    }
}

/// Pin the current thread to the first configured core id that exists on
/// the host. Pinning is single-core; additional ids are ignored.
fn pin_to_core(affinity: &[usize]) {
    if affinity.is_empty() {
        return;
    }
    let Some(available) = core_affinity::get_core_ids() else {
        warn!("cpu affinity requested but core enumeration is unavailable");
        return;
    };
    for core in available {
        if affinity.contains(&core.id) {
            if core_affinity::set_for_current(core) {
                debug!(core = core.id, "periodic worker pinned");
            } else {
                warn!(core = core.id, "failed to pin periodic worker");
            }
            return;
        }
    }
    warn!(?affinity, "no configured cpu id matched an available core");
}
