//! Error types for execution context operations.

use thiserror::Error;

use crate::core::unit::LifecycleState;

/// Errors produced by execution context operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// A unit reference was unknown to this context, or a duplicate add.
    #[error("bad parameter: {0}")]
    BadParameter(String),
    /// A transition was requested from a state that does not permit it.
    #[error("precondition not met: cannot go to {requested:?} from {current:?}")]
    PreconditionNotMet {
        /// State the unit was in when the request arrived.
        current: LifecycleState,
        /// State the caller asked for.
        requested: LifecycleState,
    },
    /// State query for a unit that is not a participant.
    #[error("unknown state: unit is not a participant of this context")]
    UnknownState,
    /// A synchronous wait exceeded its bound; the transition stays pending.
    #[error("timed out waiting for the transition to take effect")]
    Timeout,
    /// `start()` on a context that is already running. Benign.
    #[error("execution context is already running")]
    AlreadyRunning,
    /// `stop()` on a context that is already stopped. Benign.
    #[error("execution context is already stopped")]
    AlreadyStopped,
    /// Configuration rejected during validation or construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The worker thread could not be spawned or joined.
    #[error("worker thread failure: {0}")]
    WorkerFailure(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
