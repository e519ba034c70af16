//! Lifecycle states and the managed-unit capability contract.
//!
//! A managed unit is anything the runtime registers with an execution
//! context. The context never owns the unit's business object; it holds a
//! shared [`UnitHandle`] and drives the callback set below from its tick
//! protocol. Callbacks that can fail return [`CallbackResult`]; failure is
//! contained by the per-unit state machine (the unit is sent toward
//! [`LifecycleState::Error`]) and never propagates out of the scheduler.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Context ids at or above this value denote contexts the unit merely
/// participates in; ids below it denote contexts the unit owns.
pub const PARTICIPATING_OFFSET: u32 = 1000;

/// Lifecycle state of a unit within one execution context.
///
/// `Created` is the pre-attach state. Once a unit has been added to a
/// context it enters `Inactive` and can never observe `Created` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed but not attached to any context.
    Created,
    /// Attached, not being dispatched.
    Inactive,
    /// Dispatched on every tick (`on_execute` / `on_state_update`).
    Active,
    /// A callback failed; `on_error` runs on every tick until reset.
    Error,
}

/// Error carried out of a failing unit callback.
#[derive(Debug, Error, Clone)]
#[error("unit callback failed: {0}")]
pub struct CallbackError(String);

impl CallbackError {
    /// Build a callback error from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    /// The reason reported by the failing callback.
    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// Result type for unit callbacks that may fail.
pub type CallbackResult = Result<(), CallbackError>;

/// Capability contract of a managed unit.
///
/// Every method has a default implementation so test doubles and simple
/// units only override what they care about. `on_attached` is called when
/// the unit joins a context and returns the context id from the unit's
/// perspective (see [`PARTICIPATING_OFFSET`]); `on_detached` is the
/// symmetric notification on removal. All remaining callbacks receive that
/// id so a unit attached to several contexts can tell them apart.
pub trait UnitHandle: Send + Sync {
    /// Stable name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// The unit has been added to a context; returns the unit-assigned
    /// context id for this participation.
    fn on_attached(&self) -> u32 {
        PARTICIPATING_OFFSET
    }

    /// The unit has been removed from the context. Notification only.
    fn on_detached(&self, _context_id: u32) {}

    /// The context transitioned from stopped to running.
    fn on_startup(&self, _context_id: u32) {}

    /// The context transitioned from running to stopped.
    fn on_shutdown(&self, _context_id: u32) {}

    /// Entry action for `Active`. Failure aborts the unit to `Error`.
    fn on_activated(&self, _context_id: u32) -> CallbackResult {
        Ok(())
    }

    /// Entry action for `Inactive` when leaving `Active`.
    fn on_deactivated(&self, _context_id: u32) -> CallbackResult {
        Ok(())
    }

    /// Entry action for `Error`.
    fn on_aborting(&self, _context_id: u32) -> CallbackResult {
        Ok(())
    }

    /// Invoked every tick while the unit is in `Error`.
    fn on_error(&self, _context_id: u32) -> CallbackResult {
        Ok(())
    }

    /// Recovery attempt leaving `Error`; success returns the unit to
    /// `Inactive`, failure keeps it in `Error`.
    fn on_reset(&self, _context_id: u32) -> CallbackResult {
        Ok(())
    }

    /// First-pass work callback, invoked every tick while `Active`.
    fn on_execute(&self, _context_id: u32) -> CallbackResult {
        Ok(())
    }

    /// Second-pass callback, invoked after every participant's first pass
    /// has completed for the tick.
    fn on_state_update(&self, _context_id: u32) -> CallbackResult {
        Ok(())
    }

    /// The context's execution rate changed. Notification only.
    fn on_rate_changed(&self, _context_id: u32) {}
}
