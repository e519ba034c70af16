//! Factory registry turning configurations into execution contexts.
//!
//! The registry is plain owned state handed to whoever assembles the
//! application; nothing here is global. The two built-in policies are
//! pre-registered under `"periodic"` and `"ticked"`, and embedders can
//! register additional kinds next to them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::ContextConfig;
use crate::core::error::ContextError;
use crate::sched::{ExecutionContext, PeriodicScheduler, TickMode, TickScheduler};

/// Constructor for one context kind.
pub type SchedulerFactory =
    Box<dyn Fn(&ContextConfig) -> Result<Arc<dyn ExecutionContext>, ContextError> + Send + Sync>;

/// Maps context kind names to scheduler constructors.
pub struct SchedulerRegistry {
    factories: HashMap<String, SchedulerFactory>,
}

impl SchedulerRegistry {
    /// Empty registry with no kinds registered.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `"periodic"` and `"ticked"` kinds.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // new() just registered nothing, so neither insert can collide.
        let _ = registry.register("periodic", |config| {
            Ok(Arc::new(PeriodicScheduler::new(
                config.rate_hz,
                config.transition_policy(),
                config.no_wait,
                config.cpu_affinity.clone(),
            )?))
        });
        let _ = registry.register("ticked", |config| {
            let mode = if config.sync_tick {
                TickMode::Synchronous
            } else {
                TickMode::Asynchronous
            };
            Ok(Arc::new(TickScheduler::new(
                config.rate_hz,
                config.transition_policy(),
                mode,
            )?))
        });
        registry
    }

    /// Register a factory for `kind`. Registering a kind twice is a
    /// `BadParameter` error; existing registrations are never replaced.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(&ContextConfig) -> Result<Arc<dyn ExecutionContext>, ContextError>
            + Send
            + Sync
            + 'static,
    ) -> Result<(), ContextError> {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(ContextError::BadParameter(format!(
                "context kind '{kind}' is already registered"
            )));
        }
        debug!(%kind, "context factory registered");
        self.factories.insert(kind, Box::new(factory));
        Ok(())
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Validate `config` and build the context its kind names.
    pub fn build(&self, config: &ContextConfig) -> Result<Arc<dyn ExecutionContext>, ContextError> {
        config.validate()?;
        let factory = self.factories.get(&config.kind).ok_or_else(|| {
            ContextError::InvalidConfig(format!("unknown context kind '{}'", config.kind))
        })?;
        factory(config)
    }
}

impl Default for SchedulerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_present() {
        let registry = SchedulerRegistry::with_builtins();
        assert_eq!(registry.kinds(), ["periodic", "ticked"]);
    }

    #[test]
    fn build_resolves_by_kind() {
        let registry = SchedulerRegistry::with_builtins();
        let config = ContextConfig {
            kind: "ticked".into(),
            ..ContextConfig::default()
        };
        let context = registry.build(&config).unwrap();
        assert_eq!(context.profile().kind, "ticked");
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let registry = SchedulerRegistry::with_builtins();
        let config = ContextConfig {
            kind: "lunar".into(),
            ..ContextConfig::default()
        };
        assert!(registry.build(&config).is_err());
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut registry = SchedulerRegistry::with_builtins();
        let result = registry.register("periodic", |config| {
            Ok(Arc::new(TickScheduler::new(
                config.rate_hz,
                config.transition_policy(),
                TickMode::Synchronous,
            )?))
        });
        assert!(result.is_err());
    }
}
