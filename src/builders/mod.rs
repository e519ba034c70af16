//! Assembly helpers for embedding the schedulers.

pub mod registry;

pub use registry::{SchedulerFactory, SchedulerRegistry};
