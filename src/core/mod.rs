//! Core lifecycle machinery shared by every scheduling policy.

pub mod context;
pub mod error;
pub mod participants;
pub mod state_machine;
pub mod unit;

pub use context::{
    ContextProfile, ExecutionContextCore, ParticipantProfile, PolicyHooks, TransitionPolicy,
};
pub use error::{AppResult, ContextError};
pub use state_machine::{ActionOutcome, Phase, UnitStateMachine};
pub use unit::{CallbackError, CallbackResult, LifecycleState, UnitHandle, PARTICIPATING_OFFSET};
