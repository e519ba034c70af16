//! Worker-thread lifecycle shared by the scheduling policies.
//!
//! [`WorkerControl`] is the scheduler-side handle: it spawns the thread at
//! most once, wakes it, and joins it on shutdown. [`WorkerGate`] is the
//! thread-side view: it parks on the shared condvar and observes the
//! shutdown flag. Both sides share one mutex/condvar pair, so a wake can
//! never slip between a condition check and the park.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::core::error::ContextError;

#[derive(Debug, Default)]
struct ParkState {
    work_ready: bool,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<ParkState>,
    condvar: Condvar,
}

/// What [`WorkerGate::take_work`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// Work was signalled; the flag has been consumed.
    Work,
    /// Shutdown was requested; the worker should return.
    Shutdown,
}

/// Thread-side view of the park state.
#[derive(Clone)]
pub struct WorkerGate {
    shared: Arc<Shared>,
}

impl WorkerGate {
    /// Park while `idle()` holds and no shutdown was requested. Returns
    /// false when the worker should exit. The condition is evaluated under
    /// the park mutex, so a wake issued after a state change is never lost.
    pub fn park_while(&self, idle: impl Fn() -> bool) -> bool {
        let mut state = self.shared.state.lock();
        loop {
            if state.shutdown {
                return false;
            }
            if !idle() {
                return true;
            }
            self.shared.condvar.wait(&mut state);
        }
    }

    /// Block until work is signalled or shutdown is requested, consuming
    /// the work flag. Edge-triggered counterpart to [`Self::park_while`].
    pub fn take_work(&self) -> WorkerSignal {
        let mut state = self.shared.state.lock();
        loop {
            if state.shutdown {
                return WorkerSignal::Shutdown;
            }
            if state.work_ready {
                state.work_ready = false;
                return WorkerSignal::Work;
            }
            self.shared.condvar.wait(&mut state);
        }
    }

    /// True once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }
}

/// Scheduler-side handle owning the worker thread.
#[derive(Default)]
pub struct WorkerControl {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerControl {
    /// Fresh control with no thread spawned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the worker thread if it has not been spawned yet. The closure
    /// receives the thread-side [`WorkerGate`] and runs until it returns.
    pub fn spawn_once(
        &self,
        name: &str,
        body: impl FnOnce(WorkerGate) + Send + 'static,
    ) -> Result<(), ContextError> {
        let mut slot = self.handle.lock();
        if slot.is_some() {
            return Ok(());
        }
        let gate = WorkerGate {
            shared: self.shared.clone(),
        };
        let joined = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || body(gate))
            .map_err(|e| ContextError::WorkerFailure(format!("spawn failed: {e}")))?;
        debug!(worker = name, "worker thread spawned");
        *slot = Some(joined);
        Ok(())
    }

    /// Set the work flag and wake the worker.
    pub fn wake(&self) {
        let mut state = self.shared.state.lock();
        state.work_ready = true;
        self.shared.condvar.notify_one();
    }

    /// Request shutdown and join the thread. Safe to call when no thread
    /// was ever spawned, and idempotent.
    pub fn shutdown_and_join(&self) -> Result<(), ContextError> {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.condvar.notify_all();
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let name = handle
                .thread()
                .name()
                .unwrap_or("worker")
                .to_owned();
            if handle.join().is_err() {
                error!(worker = %name, "worker thread panicked before join");
                return Err(ContextError::WorkerFailure(format!(
                    "worker '{name}' panicked"
                )));
            }
            debug!(worker = %name, "worker thread joined");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn spawn_once_is_single_shot() {
        let control = WorkerControl::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let runs = runs.clone();
            control
                .spawn_once("test-worker", move |gate| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    while gate.take_work() == WorkerSignal::Work {}
                })
                .unwrap();
        }
        control.shutdown_and_join().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn take_work_consumes_the_flag() {
        let control = WorkerControl::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let observed = ticks.clone();
        control
            .spawn_once("test-worker", move |gate| {
                while gate.take_work() == WorkerSignal::Work {
                    observed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        control.wake();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ticks.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        control.shutdown_and_join().unwrap();
    }

    #[test]
    fn shutdown_without_spawn_is_fine() {
        let control = WorkerControl::new();
        control.shutdown_and_join().unwrap();
        control.shutdown_and_join().unwrap();
    }
}
