//! Declarative execution-context configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::context::TransitionPolicy;
use crate::core::error::ContextError;

fn default_kind() -> String {
    "periodic".to_owned()
}

fn default_rate_hz() -> f64 {
    1000.0
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    500
}

/// Configuration for one execution context, typically deserialized from
/// the application's JSON settings.
///
/// All fields have defaults, so `{}` is a valid configuration: a periodic
/// context at 1 kHz with synchronous, 500 ms-bounded transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    /// Scheduling policy kind, resolved through the factory registry.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Execution rate in Hz. Must be positive and finite.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    /// Block activation requests until the transition commits.
    #[serde(default = "default_true")]
    pub sync_activation: bool,
    /// Block deactivation requests until the transition commits.
    #[serde(default = "default_true")]
    pub sync_deactivation: bool,
    /// Block reset requests until the transition commits.
    #[serde(default = "default_true")]
    pub sync_reset: bool,
    /// Bound for the activation wait, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub activation_timeout_ms: u64,
    /// Bound for the deactivation wait, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub deactivation_timeout_ms: u64,
    /// Bound for the reset wait, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Periodic policy only: skip the inter-tick sleep.
    pub no_wait: bool,
    /// Ticked policy only: run the tick protocol on the caller's thread.
    #[serde(default = "default_true")]
    pub sync_tick: bool,
    /// Periodic policy only: pin the worker thread to one of these cores.
    pub cpu_affinity: Vec<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            rate_hz: default_rate_hz(),
            sync_activation: true,
            sync_deactivation: true,
            sync_reset: true,
            activation_timeout_ms: default_timeout_ms(),
            deactivation_timeout_ms: default_timeout_ms(),
            reset_timeout_ms: default_timeout_ms(),
            no_wait: false,
            sync_tick: true,
            cpu_affinity: Vec::new(),
        }
    }
}

impl ContextConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ContextError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ContextError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration against host-independent and host-dependent
    /// constraints.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.kind.is_empty() {
            return Err(ContextError::InvalidConfig(
                "context kind must not be empty".into(),
            ));
        }
        if !self.rate_hz.is_finite() || self.rate_hz <= 0.0 {
            return Err(ContextError::InvalidConfig(format!(
                "rate must be a positive, finite frequency, got {}",
                self.rate_hz
            )));
        }
        // The derived period must fit in a Duration; absurdly low rates
        // do not.
        if Duration::try_from_secs_f64(1.0 / self.rate_hz).is_err() {
            return Err(ContextError::InvalidConfig(format!(
                "rate {} Hz yields an unrepresentable tick period",
                self.rate_hz
            )));
        }
        let cpus = num_cpus::get();
        if let Some(bad) = self.cpu_affinity.iter().find(|&&id| id >= cpus) {
            return Err(ContextError::InvalidConfig(format!(
                "cpu affinity id {bad} out of range, host has {cpus} cpus"
            )));
        }
        Ok(())
    }

    /// The transition policy encoded in this configuration.
    pub fn transition_policy(&self) -> TransitionPolicy {
        TransitionPolicy {
            sync_activation: self.sync_activation,
            sync_deactivation: self.sync_deactivation,
            sync_reset: self.sync_reset,
            activation_timeout: Duration::from_millis(self.activation_timeout_ms),
            deactivation_timeout: Duration::from_millis(self.deactivation_timeout_ms),
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
        }
    }
}
