//! Component-lifecycle execution contexts.
//!
//! `unitcycle` drives registered units through an
//! `Inactive` / `Active` / `Error` lifecycle using a two-pass tick
//! protocol: every pending transition commits and every first-pass work
//! callback runs before any unit's second-pass callback starts. Callback
//! failures are contained per unit; a failing unit is parked in `Error`
//! while the rest of the context keeps running.
//!
//! Two clocking policies share one core:
//!
//! - [`sched::PeriodicScheduler`] owns a worker thread that ticks at a
//!   configured rate, parks itself when every unit is settled in
//!   `Inactive`, and sleeps toward absolute deadlines between ticks.
//! - [`sched::TickScheduler`] advances only on externally supplied ticks
//!   carrying a logical timestamp, either on the caller's thread or on a
//!   signalled worker.
//!
//! Contexts are usually built from a [`config::ContextConfig`] through a
//! [`builders::SchedulerRegistry`]:
//!
//! ```
//! use std::sync::Arc;
//! use unitcycle::builders::SchedulerRegistry;
//! use unitcycle::config::ContextConfig;
//! use unitcycle::core::UnitHandle;
//!
//! struct Probe;
//! impl UnitHandle for Probe {
//!     fn name(&self) -> &str {
//!         "probe"
//!     }
//! }
//!
//! let registry = SchedulerRegistry::with_builtins();
//! let config = ContextConfig::from_json_str(r#"{"rate_hz": 200.0}"#)?;
//! let context = registry.build(&config)?;
//!
//! let unit: Arc<dyn UnitHandle> = Arc::new(Probe);
//! context.add_unit(unit.clone())?;
//! context.start()?;
//! context.activate_unit(&unit)?;
//! # context.stop()?;
//! # Ok::<(), unitcycle::core::ContextError>(())
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Lifecycle state machine, participant set, and the shared context core.
pub mod core;
/// Configuration models for contexts and transition policies.
pub mod config;
/// Builders to construct execution contexts from configuration.
pub mod builders;
/// Scheduling policies and the worker-thread plumbing.
pub mod sched;
/// Shared utilities.
pub mod util;

pub use crate::core::{
    CallbackError, CallbackResult, ContextError, ExecutionContextCore, LifecycleState, PolicyHooks,
    TransitionPolicy, UnitHandle,
};
pub use crate::sched::{ExecutionContext, PeriodicScheduler, TickMode, TickScheduler};
