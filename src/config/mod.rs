//! Configuration models.

pub mod context;

pub use context::ContextConfig;
