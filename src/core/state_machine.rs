//! Per-unit lifecycle state machine.
//!
//! One [`UnitStateMachine`] exists per (unit, execution context) pair. It
//! keeps the `{current, next}` state pair and dispatches the unit's
//! callbacks for each tick phase. `next` is only ever written by a
//! transition request (or by the machine itself when it contains a callback
//! failure); `current` is only ever written by the tick protocol once the
//! requested transition's entry action has succeeded.
//!
//! Callbacks run without the state lock held, so a transition requested
//! while a tick is in flight is queued into `next` and observed at the next
//! Pre phase, never mid-tick.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::error::ContextError;
use crate::core::unit::{LifecycleState, UnitHandle};

/// Tick phases handled by [`UnitStateMachine::run_entry_and_do`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Apply pending transitions (entry actions).
    Pre,
    /// Run the state's do action (`on_execute` / `on_error`).
    Do,
}

/// What a phase did for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// No callback was due in this phase.
    Idle,
    /// A callback ran and succeeded.
    Completed,
    /// A callback failed and the unit was sent toward `Error`.
    Faulted,
}

#[derive(Debug, Clone, Copy)]
struct StatePair {
    current: LifecycleState,
    next: LifecycleState,
}

/// Wraps one unit handle with its lifecycle bookkeeping for one context.
pub struct UnitStateMachine {
    handle: Arc<dyn UnitHandle>,
    context_id: u32,
    states: Mutex<StatePair>,
}

impl UnitStateMachine {
    /// Create a state machine for a freshly attached unit. The unit enters
    /// `Inactive` immediately; `Created` is only observable before attach.
    pub fn new(handle: Arc<dyn UnitHandle>, context_id: u32) -> Self {
        Self {
            handle,
            context_id,
            states: Mutex::new(StatePair {
                current: LifecycleState::Inactive,
                next: LifecycleState::Inactive,
            }),
        }
    }

    /// The wrapped unit handle.
    pub fn handle(&self) -> &Arc<dyn UnitHandle> {
        &self.handle
    }

    /// Context id of this participation, from the unit's perspective.
    pub fn context_id(&self) -> u32 {
        self.context_id
    }

    /// Unit name, for logs.
    pub fn unit_name(&self) -> &str {
        self.handle.name()
    }

    /// Current state.
    pub fn current(&self) -> LifecycleState {
        self.states.lock().current
    }

    /// Requested (next) state.
    pub fn next(&self) -> LifecycleState {
        self.states.lock().next
    }

    /// True if the current state equals `state`.
    pub fn is_current(&self, state: LifecycleState) -> bool {
        self.states.lock().current == state
    }

    /// True if the requested state equals `state`.
    pub fn is_next(&self, state: LifecycleState) -> bool {
        self.states.lock().next == state
    }

    /// Request a transition to `target`, validating that a legal edge exists
    /// from the current state (Inactive→Active, Active→Inactive,
    /// Error→Inactive). Sets `next` on success; invokes no callback.
    ///
    /// At most one transition can be pending: while `next != current` any
    /// further request is refused, so a pending abort in particular cannot
    /// be overwritten.
    pub fn request_transition(&self, target: LifecycleState) -> Result<(), ContextError> {
        let mut st = self.states.lock();
        let legal = matches!(
            (st.current, target),
            (LifecycleState::Inactive, LifecycleState::Active)
                | (LifecycleState::Active, LifecycleState::Inactive)
                | (LifecycleState::Error, LifecycleState::Inactive)
        );
        let pending = st.next != st.current;
        if !legal || pending {
            return Err(ContextError::PreconditionNotMet {
                current: st.current,
                requested: target,
            });
        }
        st.next = target;
        debug!(
            unit = self.unit_name(),
            from = ?st.current,
            to = ?target,
            "transition requested"
        );
        Ok(())
    }

    /// Force the unit toward `Error` after a failed do/post-do callback.
    /// The abort entry action runs at the next Pre phase.
    fn mark_faulted(&self) {
        let mut st = self.states.lock();
        if st.current != LifecycleState::Error {
            st.next = LifecycleState::Error;
        }
    }

    /// Run the given phase for this unit.
    ///
    /// In the `Pre` phase a pending transition's entry callback is invoked;
    /// success commits `current = next`, failure forces both states to
    /// `Error` (a failed reset simply stays in `Error`). In the `Do` phase
    /// an `Active` unit runs `on_execute` and an `Error` unit runs
    /// `on_error`; an `on_execute` failure requests a transition to `Error`.
    pub fn run_entry_and_do(&self, phase: Phase) -> ActionOutcome {
        match phase {
            Phase::Pre => self.run_pre(),
            Phase::Do => self.run_do(),
        }
    }

    fn run_pre(&self) -> ActionOutcome {
        let (current, target) = {
            let st = self.states.lock();
            if st.next == st.current {
                return ActionOutcome::Idle;
            }
            (st.current, st.next)
        };

        let result = match (current, target) {
            (LifecycleState::Inactive, LifecycleState::Active) => {
                self.handle.on_activated(self.context_id)
            }
            (LifecycleState::Active, LifecycleState::Inactive) => {
                self.handle.on_deactivated(self.context_id)
            }
            (LifecycleState::Error, LifecycleState::Inactive) => {
                self.handle.on_reset(self.context_id)
            }
            (_, LifecycleState::Error) => self.handle.on_aborting(self.context_id),
            // No other edge can be pending; request_transition and
            // mark_faulted only produce the four above.
            _ => Ok(()),
        };

        match result {
            Ok(()) => {
                let mut st = self.states.lock();
                st.current = target;
                debug!(unit = self.unit_name(), state = ?target, "transition committed");
                ActionOutcome::Completed
            }
            Err(e) => {
                let mut st = self.states.lock();
                st.current = LifecycleState::Error;
                st.next = LifecycleState::Error;
                warn!(
                    unit = self.unit_name(),
                    target = ?target,
                    error = %e,
                    "entry action failed, unit moved to error state"
                );
                ActionOutcome::Faulted
            }
        }
    }

    fn run_do(&self) -> ActionOutcome {
        let st = *self.states.lock();
        // A unit already headed for Error skips its regular work.
        if st.next == LifecycleState::Error && st.current != LifecycleState::Error {
            return ActionOutcome::Idle;
        }
        match st.current {
            LifecycleState::Active => match self.handle.on_execute(self.context_id) {
                Ok(()) => ActionOutcome::Completed,
                Err(e) => {
                    warn!(unit = self.unit_name(), error = %e, "on_execute failed");
                    self.mark_faulted();
                    ActionOutcome::Faulted
                }
            },
            LifecycleState::Error => {
                if let Err(e) = self.handle.on_error(self.context_id) {
                    warn!(unit = self.unit_name(), error = %e, "on_error callback failed");
                }
                ActionOutcome::Completed
            }
            _ => ActionOutcome::Idle,
        }
    }

    /// Run the second-pass callback. Must be invoked only after
    /// `run_entry_and_do` has been called for every participant this tick.
    pub fn run_post_do(&self) -> ActionOutcome {
        let st = *self.states.lock();
        if st.next == LifecycleState::Error && st.current != LifecycleState::Error {
            return ActionOutcome::Idle;
        }
        if st.current != LifecycleState::Active {
            return ActionOutcome::Idle;
        }
        match self.handle.on_state_update(self.context_id) {
            Ok(()) => ActionOutcome::Completed,
            Err(e) => {
                warn!(unit = self.unit_name(), error = %e, "on_state_update failed");
                self.mark_faulted();
                ActionOutcome::Faulted
            }
        }
    }
}

impl std::fmt::Debug for UnitStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = *self.states.lock();
        f.debug_struct("UnitStateMachine")
            .field("unit", &self.unit_name())
            .field("context_id", &self.context_id)
            .field("current", &st.current)
            .field("next", &st.next)
            .finish()
    }
}
