//! Instrumented unit double shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use unitcycle::core::{CallbackError, CallbackResult, UnitHandle};

/// Records every callback invocation; failures are switchable per phase.
pub struct CountingUnit {
    name: String,
    /// Shared event log, appended to as `"<unit>:<callback>"`.
    pub log: Arc<Mutex<Vec<String>>>,
    /// Number of `on_execute` invocations.
    pub executes: AtomicUsize,
    /// Number of `on_state_update` invocations.
    pub updates: AtomicUsize,
    /// Number of `on_error` invocations.
    pub errors: AtomicUsize,
    /// Number of `on_startup` invocations.
    pub startups: AtomicUsize,
    /// Number of `on_shutdown` invocations.
    pub shutdowns: AtomicUsize,
    /// Number of `on_rate_changed` invocations.
    pub rate_changes: AtomicUsize,
    /// Number of `on_detached` invocations.
    pub detaches: AtomicUsize,
    /// Make `on_activated` fail.
    pub fail_activate: AtomicBool,
    /// Make `on_execute` fail.
    pub fail_execute: AtomicBool,
    /// Make `on_reset` fail.
    pub fail_reset: AtomicBool,
}

impl CountingUnit {
    /// Double with its own private event log.
    pub fn named(name: &str) -> Arc<Self> {
        Self::with_log(name, Arc::new(Mutex::new(Vec::new())))
    }

    /// Double appending to a log shared with other doubles.
    pub fn with_log(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            log,
            executes: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            startups: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            rate_changes: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            fail_activate: AtomicBool::new(false),
            fail_execute: AtomicBool::new(false),
            fail_reset: AtomicBool::new(false),
        })
    }

    /// This double as the trait object the context API expects. The same
    /// `Arc` allocation backs every handle, so identity checks hold.
    pub fn handle(self: &Arc<Self>) -> Arc<dyn UnitHandle> {
        self.clone()
    }

    fn record(&self, callback: &str) {
        self.log.lock().push(format!("{}:{}", self.name, callback));
    }
}

impl UnitHandle for CountingUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_detached(&self, _context_id: u32) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        self.record("detached");
    }

    fn on_startup(&self, _context_id: u32) {
        self.startups.fetch_add(1, Ordering::SeqCst);
        self.record("startup");
    }

    fn on_shutdown(&self, _context_id: u32) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.record("shutdown");
    }

    fn on_activated(&self, _context_id: u32) -> CallbackResult {
        self.record("activated");
        if self.fail_activate.load(Ordering::SeqCst) {
            Err(CallbackError::new("activation refused"))
        } else {
            Ok(())
        }
    }

    fn on_deactivated(&self, _context_id: u32) -> CallbackResult {
        self.record("deactivated");
        Ok(())
    }

    fn on_aborting(&self, _context_id: u32) -> CallbackResult {
        self.record("aborting");
        Ok(())
    }

    fn on_error(&self, _context_id: u32) -> CallbackResult {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.record("error");
        Ok(())
    }

    fn on_reset(&self, _context_id: u32) -> CallbackResult {
        self.record("reset");
        if self.fail_reset.load(Ordering::SeqCst) {
            Err(CallbackError::new("reset refused"))
        } else {
            Ok(())
        }
    }

    fn on_execute(&self, _context_id: u32) -> CallbackResult {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.record("execute");
        if self.fail_execute.load(Ordering::SeqCst) {
            Err(CallbackError::new("execute failed"))
        } else {
            Ok(())
        }
    }

    fn on_state_update(&self, _context_id: u32) -> CallbackResult {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.record("state_update");
        Ok(())
    }

    fn on_rate_changed(&self, _context_id: u32) {
        self.rate_changes.fetch_add(1, Ordering::SeqCst);
        self.record("rate_changed");
    }
}
