//! Scheduler-agnostic execution context core.
//!
//! [`ExecutionContextCore`] owns everything the two scheduling policies
//! share: the participant set, the running flag, the rate, the transition
//! operations with their optional synchronous waits, and the two-pass tick
//! protocol. Policy-specific behavior (waking a parked worker, signalling a
//! tick thread) is injected through [`PolicyHooks`], so the core never
//! depends on either scheduler.
//!
//! Locking discipline: the participant-set lock and the per-unit state
//! locks are held only for bookkeeping, never across a unit callback. Each
//! tick dispatches over a snapshot of the set, so membership changes that
//! race a tick take effect at the next tick boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::ContextError;
use crate::core::participants::ParticipantSet;
use crate::core::state_machine::{Phase, UnitStateMachine};
use crate::core::unit::{LifecycleState, UnitHandle};

/// Observation points a scheduling policy can attach to the core.
///
/// Every method defaults to a no-op. The periodic policy uses the
/// `on_waiting_*` notifications to wake its parked worker; the externally
/// ticked policy uses them to self-signal so pending transitions converge
/// without an external tick.
pub trait PolicyHooks: Send + Sync {
    /// The context is about to start; the running flag is still false.
    fn on_starting(&self) {}
    /// The context started; units have seen `on_startup`.
    fn on_started(&self) {}
    /// The context is about to stop; the running flag is still true.
    fn on_stopping(&self) {}
    /// The context stopped; units have seen `on_shutdown`.
    fn on_stopped(&self) {}
    /// The execution rate changed.
    fn on_rate_changed(&self) {}
    /// A unit is about to be added.
    fn on_adding_unit(&self) {}
    /// A unit was added.
    fn on_added_unit(&self) {}
    /// A unit is about to be removed.
    fn on_removing_unit(&self) {}
    /// A unit was removed.
    fn on_removed_unit(&self) {}
    /// An activation is about to be requested for a unit.
    fn on_activating(&self) {}
    /// A deactivation is about to be requested for a unit.
    fn on_deactivating(&self) {}
    /// A reset is about to be requested for a unit.
    fn on_resetting(&self) {}
    /// An activation was requested and is now pending.
    fn on_waiting_activated(&self) {}
    /// An activation request completed its synchronous wait (or none was
    /// configured).
    fn on_unit_activated(&self) {}
    /// A deactivation was requested and is now pending.
    fn on_waiting_deactivated(&self) {}
    /// A deactivation request completed its synchronous wait.
    fn on_unit_deactivated(&self) {}
    /// A reset was requested and is now pending.
    fn on_waiting_reset(&self) {}
    /// A reset request completed its synchronous wait.
    fn on_unit_reset(&self) {}
}

/// Whether transition operations block until the tick protocol commits the
/// transition, and for how long.
#[derive(Debug, Clone, Copy)]
pub struct TransitionPolicy {
    /// Block `activate_unit` until the unit reaches `Active`.
    pub sync_activation: bool,
    /// Block `deactivate_unit` until the unit reaches `Inactive`.
    pub sync_deactivation: bool,
    /// Block `reset_unit` until the unit reaches `Inactive`.
    pub sync_reset: bool,
    /// Bound for the activation wait.
    pub activation_timeout: Duration,
    /// Bound for the deactivation wait.
    pub deactivation_timeout: Duration,
    /// Bound for the reset wait.
    pub reset_timeout: Duration,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            sync_activation: true,
            sync_deactivation: true,
            sync_reset: true,
            activation_timeout: Duration::from_millis(500),
            deactivation_timeout: Duration::from_millis(500),
            reset_timeout: Duration::from_millis(500),
        }
    }
}

/// One participant as reported by [`ExecutionContextCore::profile`].
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantProfile {
    /// Unit name.
    pub name: String,
    /// Context id the unit assigned for this participation.
    pub context_id: u32,
}

/// Snapshot of a context's identity and membership for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ContextProfile {
    /// Scheduling policy name, e.g. `"periodic"` or `"ticked"`.
    pub kind: String,
    /// Execution rate in Hz.
    pub rate_hz: f64,
    /// Participating units in attach order, which is dispatch order.
    pub participants: Vec<ParticipantProfile>,
}

struct RateState {
    rate_hz: f64,
    period: Duration,
}

/// Derive the tick period for a rate, rejecting rates that are not
/// positive and finite as well as rates so low that the period cannot be
/// represented as a `Duration`.
pub(crate) fn period_from_rate(rate_hz: f64) -> Result<Duration, ContextError> {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return Err(ContextError::BadParameter(format!(
            "rate must be a positive, finite frequency, got {rate_hz}"
        )));
    }
    Duration::try_from_secs_f64(1.0 / rate_hz).map_err(|_| {
        ContextError::BadParameter(format!(
            "rate {rate_hz} Hz yields an unrepresentable tick period"
        ))
    })
}

/// Shared state and operations of one execution context.
pub struct ExecutionContextCore {
    kind: String,
    rate: Mutex<RateState>,
    running: AtomicBool,
    participants: Mutex<ParticipantSet>,
    policy: TransitionPolicy,
    hooks: RwLock<Option<Arc<dyn PolicyHooks>>>,
}

impl ExecutionContextCore {
    /// Build a core with the given policy kind, rate, and transition policy.
    pub fn new(
        kind: impl Into<String>,
        rate_hz: f64,
        policy: TransitionPolicy,
    ) -> Result<Self, ContextError> {
        let period = period_from_rate(rate_hz)?;
        Ok(Self {
            kind: kind.into(),
            rate: Mutex::new(RateState { rate_hz, period }),
            running: AtomicBool::new(false),
            participants: Mutex::new(ParticipantSet::new()),
            policy,
            hooks: RwLock::new(None),
        })
    }

    /// Install the policy hook sink. Called once by the owning scheduler.
    pub fn set_hooks(&self, hooks: Arc<dyn PolicyHooks>) {
        *self.hooks.write() = Some(hooks);
    }

    fn with_hooks(&self, f: impl FnOnce(&dyn PolicyHooks)) {
        if let Some(hooks) = self.hooks.read().as_deref() {
            f(hooks);
        }
    }

    /// True while the context is started.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Execution rate in Hz.
    pub fn rate_hz(&self) -> f64 {
        self.rate.lock().rate_hz
    }

    /// Tick period derived from the rate.
    pub fn period(&self) -> Duration {
        self.rate.lock().period
    }

    /// Transition policy this core was built with.
    pub fn transition_policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Identity and membership snapshot.
    pub fn profile(&self) -> ContextProfile {
        let participants = self
            .participants
            .lock()
            .snapshot()
            .iter()
            .map(|sm| ParticipantProfile {
                name: sm.unit_name().to_owned(),
                context_id: sm.context_id(),
            })
            .collect();
        ContextProfile {
            kind: self.kind.clone(),
            rate_hz: self.rate_hz(),
            participants,
        }
    }

    /// Change the execution rate. Takes effect from the next cycle; every
    /// participant is notified via `on_rate_changed`.
    pub fn set_rate(&self, rate_hz: f64) -> Result<(), ContextError> {
        let period = period_from_rate(rate_hz)?;
        {
            let mut rate = self.rate.lock();
            rate.rate_hz = rate_hz;
            rate.period = period;
        }
        info!(kind = %self.kind, rate_hz, "execution rate changed");
        for sm in self.participants.lock().snapshot() {
            sm.handle().on_rate_changed(sm.context_id());
        }
        self.with_hooks(|h| h.on_rate_changed());
        Ok(())
    }

    /// Start the context. Units see `on_startup` before the first tick can
    /// observe the running flag. Starting a running context is a benign
    /// error and invokes nothing.
    pub fn start(&self) -> Result<(), ContextError> {
        if self.is_running() {
            return Err(ContextError::AlreadyRunning);
        }
        self.with_hooks(|h| h.on_starting());
        for sm in self.participants.lock().snapshot() {
            sm.handle().on_startup(sm.context_id());
        }
        self.running.store(true, Ordering::SeqCst);
        info!(kind = %self.kind, "execution context started");
        self.with_hooks(|h| h.on_started());
        Ok(())
    }

    /// Stop the context. The running flag drops before units see
    /// `on_shutdown`, so no tick can start after the flag is down.
    pub fn stop(&self) -> Result<(), ContextError> {
        if !self.is_running() {
            return Err(ContextError::AlreadyStopped);
        }
        self.with_hooks(|h| h.on_stopping());
        self.running.store(false, Ordering::SeqCst);
        for sm in self.participants.lock().snapshot() {
            sm.handle().on_shutdown(sm.context_id());
        }
        info!(kind = %self.kind, "execution context stopped");
        self.with_hooks(|h| h.on_stopped());
        Ok(())
    }

    /// Add a unit to the context. The unit assigns its own context id via
    /// `on_attached` and enters `Inactive`. Adding the same handle twice is
    /// a `BadParameter` error.
    pub fn add_unit(&self, unit: Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        self.with_hooks(|h| h.on_adding_unit());
        if self.participants.lock().contains(&unit) {
            return Err(ContextError::BadParameter(format!(
                "unit '{}' is already a participant",
                unit.name()
            )));
        }
        let context_id = unit.on_attached();
        let sm = Arc::new(UnitStateMachine::new(unit.clone(), context_id));
        {
            let mut set = self.participants.lock();
            if set.contains(&unit) {
                return Err(ContextError::BadParameter(format!(
                    "unit '{}' is already a participant",
                    unit.name()
                )));
            }
            set.push(sm);
        }
        debug!(kind = %self.kind, unit = unit.name(), context_id, "unit added");
        self.with_hooks(|h| h.on_added_unit());
        Ok(())
    }

    /// Remove a unit from the context. The unit is detached in whatever
    /// state it is in; no implicit deactivation happens.
    pub fn remove_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        self.with_hooks(|h| h.on_removing_unit());
        let sm = self.participants.lock().remove(unit).ok_or_else(|| {
            ContextError::BadParameter(format!("unit '{}' is not a participant", unit.name()))
        })?;
        if sm.is_current(LifecycleState::Active) {
            warn!(kind = %self.kind, unit = unit.name(), "removing a still-active unit");
        }
        unit.on_detached(sm.context_id());
        debug!(kind = %self.kind, unit = unit.name(), "unit removed");
        self.with_hooks(|h| h.on_removed_unit());
        Ok(())
    }

    /// Request activation of `unit`, optionally waiting for the transition
    /// to commit per the context's [`TransitionPolicy`].
    pub fn activate_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        let sm = self.find(unit)?;
        self.with_hooks(|h| h.on_activating());
        sm.request_transition(LifecycleState::Active)?;
        self.with_hooks(|h| h.on_waiting_activated());
        if self.policy.sync_activation {
            self.wait_for_state(&sm, LifecycleState::Active, self.policy.activation_timeout)?;
        }
        self.with_hooks(|h| h.on_unit_activated());
        Ok(())
    }

    /// Request deactivation of `unit`.
    pub fn deactivate_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        let sm = self.find(unit)?;
        self.with_hooks(|h| h.on_deactivating());
        sm.request_transition(LifecycleState::Inactive)?;
        self.with_hooks(|h| h.on_waiting_deactivated());
        if self.policy.sync_deactivation {
            self.wait_for_state(
                &sm,
                LifecycleState::Inactive,
                self.policy.deactivation_timeout,
            )?;
        }
        self.with_hooks(|h| h.on_unit_deactivated());
        Ok(())
    }

    /// Request recovery of an `Error` unit back to `Inactive`.
    pub fn reset_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError> {
        let sm = self.find(unit)?;
        self.with_hooks(|h| h.on_resetting());
        sm.request_transition(LifecycleState::Inactive)?;
        self.with_hooks(|h| h.on_waiting_reset());
        if self.policy.sync_reset {
            self.wait_for_state(&sm, LifecycleState::Inactive, self.policy.reset_timeout)?;
        }
        self.with_hooks(|h| h.on_unit_reset());
        Ok(())
    }

    /// Current lifecycle state of `unit` within this context.
    pub fn unit_state(&self, unit: &Arc<dyn UnitHandle>) -> Result<LifecycleState, ContextError> {
        self.participants
            .lock()
            .find(unit)
            .map(|sm| sm.current())
            .ok_or(ContextError::UnknownState)
    }

    /// True if every participant's current state is `state`.
    pub fn is_all_current(&self, state: LifecycleState) -> bool {
        self.participants.lock().all_current(state)
    }

    /// True if every participant's requested state is `state`.
    pub fn is_all_next(&self, state: LifecycleState) -> bool {
        self.participants.lock().all_next(state)
    }

    /// True if at least one participant's current state is `state`.
    pub fn is_one_of_current(&self, state: LifecycleState) -> bool {
        self.participants.lock().one_of_current(state)
    }

    /// True if at least one participant's requested state is `state`.
    pub fn is_one_of_next(&self, state: LifecycleState) -> bool {
        self.participants.lock().one_of_next(state)
    }

    /// Number of participants.
    pub fn participant_count(&self) -> usize {
        self.participants.lock().len()
    }

    /// Run one complete tick over a snapshot of the participant set.
    ///
    /// Three full passes: pending transitions commit for every unit, then
    /// every unit runs its do action, then every unit runs its second-pass
    /// callback. No unit's second pass starts before every unit's first
    /// pass has finished. A stopped context ticks nothing.
    pub fn invoke_tick(&self) {
        if !self.is_running() {
            return;
        }
        let snapshot = self.participants.lock().snapshot();
        for sm in &snapshot {
            sm.run_entry_and_do(Phase::Pre);
        }
        for sm in &snapshot {
            sm.run_entry_and_do(Phase::Do);
        }
        for sm in &snapshot {
            sm.run_post_do();
        }
    }

    fn find(&self, unit: &Arc<dyn UnitHandle>) -> Result<Arc<UnitStateMachine>, ContextError> {
        self.participants
            .lock()
            .find(unit)
            .cloned()
            .ok_or_else(|| {
                ContextError::BadParameter(format!(
                    "unit '{}' is not a participant",
                    unit.name()
                ))
            })
    }

    /// Poll until `sm` commits to `target` or the bound elapses. The poll
    /// interval tracks the tick period so fast contexts converge quickly
    /// without busy-waiting slow ones.
    fn wait_for_state(
        &self,
        sm: &Arc<UnitStateMachine>,
        target: LifecycleState,
        timeout: Duration,
    ) -> Result<(), ContextError> {
        let interval = (self.period() / 10)
            .clamp(Duration::from_micros(100), Duration::from_millis(10));
        let deadline = Instant::now() + timeout;
        loop {
            if sm.is_current(target) {
                return Ok(());
            }
            // The pending request was consumed by a failed entry action
            // (or superseded by a fault); waiting longer cannot succeed.
            if !sm.is_next(target) {
                return Err(ContextError::PreconditionNotMet {
                    current: sm.current(),
                    requested: target,
                });
            }
            if Instant::now() >= deadline {
                return Err(ContextError::Timeout);
            }
            std::thread::sleep(interval);
        }
    }
}

impl std::fmt::Debug for ExecutionContextCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContextCore")
            .field("kind", &self.kind)
            .field("rate_hz", &self.rate_hz())
            .field("running", &self.is_running())
            .field("participants", &self.participant_count())
            .finish()
    }
}
