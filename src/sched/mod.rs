//! Scheduling policies driving the core tick protocol.

pub mod periodic;
pub mod tick;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use crate::core::context::ContextProfile;
use crate::core::error::ContextError;
use crate::core::unit::{LifecycleState, UnitHandle};

pub use periodic::PeriodicScheduler;
pub use tick::{TickMode, TickScheduler};
pub use worker::{WorkerControl, WorkerGate, WorkerSignal};

/// Object-safe operation set common to every execution context.
///
/// Both schedulers implement this by delegating to their shared core, so
/// callers holding a `Box<dyn ExecutionContext>` can drive unit lifecycles
/// without knowing the clocking policy. The externally ticked policy
/// additionally overrides [`ExecutionContext::tick`] and
/// [`ExecutionContext::logical_time`].
pub trait ExecutionContext: Send + Sync {
    /// Start dispatching ticks.
    fn start(&self) -> Result<(), ContextError>;
    /// Stop dispatching ticks.
    fn stop(&self) -> Result<(), ContextError>;
    /// True while started.
    fn is_running(&self) -> bool;
    /// Execution rate in Hz.
    fn rate_hz(&self) -> f64;
    /// Change the execution rate.
    fn set_rate(&self, rate_hz: f64) -> Result<(), ContextError>;
    /// Add a unit as a participant.
    fn add_unit(&self, unit: Arc<dyn UnitHandle>) -> Result<(), ContextError>;
    /// Remove a participating unit.
    fn remove_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError>;
    /// Request activation of a unit.
    fn activate_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError>;
    /// Request deactivation of a unit.
    fn deactivate_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError>;
    /// Request recovery of a unit from `Error`.
    fn reset_unit(&self, unit: &Arc<dyn UnitHandle>) -> Result<(), ContextError>;
    /// Lifecycle state of a unit within this context.
    fn unit_state(&self, unit: &Arc<dyn UnitHandle>) -> Result<LifecycleState, ContextError>;
    /// True if every participant's current state is `state`.
    fn is_all_current(&self, state: LifecycleState) -> bool;
    /// True if every participant's requested state is `state`.
    fn is_all_next(&self, state: LifecycleState) -> bool;
    /// True if at least one participant's current state is `state`.
    fn is_one_of_current(&self, state: LifecycleState) -> bool;
    /// True if at least one participant's requested state is `state`.
    fn is_one_of_next(&self, state: LifecycleState) -> bool;
    /// Identity and membership snapshot.
    fn profile(&self) -> ContextProfile;

    /// Supply one external tick carrying the new logical timestamp. Only
    /// meaningful for externally ticked contexts.
    fn tick(&self, _timestamp: Duration) -> Result<(), ContextError> {
        Err(ContextError::BadParameter(
            "this execution context is not externally ticked".into(),
        ))
    }

    /// Current logical time, if this context keeps a logical clock.
    fn logical_time(&self) -> Option<Duration> {
        None
    }
}
