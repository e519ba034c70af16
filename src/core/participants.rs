//! The ordered set of units participating in one execution context.
//!
//! Membership is by handle identity, not name; the same unit object cannot
//! join a context twice, but two distinct units may share a name. The set
//! is snapshotted at the top of each tick so callbacks run without any
//! set-level lock held; adds and removes that race a tick take effect at
//! the next snapshot.

use std::sync::Arc;

use crate::core::state_machine::UnitStateMachine;
use crate::core::unit::{LifecycleState, UnitHandle};

/// Ordered, identity-unique collection of per-unit state machines.
#[derive(Default)]
pub struct ParticipantSet {
    members: Vec<Arc<UnitStateMachine>>,
}

/// Identity by allocation, ignoring vtables. `Arc::ptr_eq` on trait
/// objects can report false negatives when the two fat pointers carry
/// different vtable copies for the same concrete type.
fn same_unit(a: &Arc<dyn UnitHandle>, b: &Arc<dyn UnitHandle>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ParticipantSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when no unit participates.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Find the state machine wrapping `unit`, by handle identity.
    pub fn find(&self, unit: &Arc<dyn UnitHandle>) -> Option<&Arc<UnitStateMachine>> {
        self.members.iter().find(|sm| same_unit(sm.handle(), unit))
    }

    /// True if `unit` is already a member.
    pub fn contains(&self, unit: &Arc<dyn UnitHandle>) -> bool {
        self.find(unit).is_some()
    }

    /// Append a state machine. The caller must have checked for duplicates.
    pub fn push(&mut self, sm: Arc<UnitStateMachine>) {
        self.members.push(sm);
    }

    /// Remove and return the state machine wrapping `unit`, preserving the
    /// order of the remaining members.
    pub fn remove(&mut self, unit: &Arc<dyn UnitHandle>) -> Option<Arc<UnitStateMachine>> {
        let idx = self
            .members
            .iter()
            .position(|sm| same_unit(sm.handle(), unit))?;
        Some(self.members.remove(idx))
    }

    /// Clone the member list for a lock-free dispatch pass.
    pub fn snapshot(&self) -> Vec<Arc<UnitStateMachine>> {
        self.members.clone()
    }

    /// True if every member's current state is `state`. Vacuously true for
    /// an empty set.
    pub fn all_current(&self, state: LifecycleState) -> bool {
        self.members.iter().all(|sm| sm.is_current(state))
    }

    /// True if every member's requested state is `state`. Vacuously true
    /// for an empty set.
    pub fn all_next(&self, state: LifecycleState) -> bool {
        self.members.iter().all(|sm| sm.is_next(state))
    }

    /// True if at least one member's current state is `state`.
    pub fn one_of_current(&self, state: LifecycleState) -> bool {
        self.members.iter().any(|sm| sm.is_current(state))
    }

    /// True if at least one member's requested state is `state`.
    pub fn one_of_next(&self, state: LifecycleState) -> bool {
        self.members.iter().any(|sm| sm.is_next(state))
    }
}
