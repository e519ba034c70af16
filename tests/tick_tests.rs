//! Behavior of the externally ticked policy: logical clock, synchronous
//! caller-thread dispatch, and the self-signalling asynchronous worker.

mod common;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::CountingUnit;
use unitcycle::core::{ContextError, LifecycleState, TransitionPolicy};
use unitcycle::sched::{ExecutionContext, TickMode, TickScheduler};

fn manual_policy() -> TransitionPolicy {
    TransitionPolicy {
        sync_activation: false,
        sync_deactivation: false,
        sync_reset: false,
        ..TransitionPolicy::default()
    }
}

fn sync_scheduler() -> TickScheduler {
    TickScheduler::new(100.0, manual_policy(), TickMode::Synchronous).unwrap()
}

#[test]
fn logical_clock_starts_at_zero_and_follows_ticks() {
    let ec = sync_scheduler();
    assert_eq!(ec.logical_time(), Some(Duration::ZERO));
    ec.start().unwrap();

    ec.tick(Duration::from_millis(10)).unwrap();
    assert_eq!(ec.logical_time(), Some(Duration::from_millis(10)));

    // The clock is set, not advanced; going backwards is the caller's call.
    ec.tick(Duration::from_millis(3)).unwrap();
    assert_eq!(ec.logical_time(), Some(Duration::from_millis(3)));
    ec.stop().unwrap();
}

#[test]
fn tick_on_a_stopped_context_is_a_silent_no_op() {
    let ec = sync_scheduler();
    let unit = CountingUnit::named("u");
    ec.add_unit(unit.handle()).unwrap();

    ec.tick(Duration::from_secs(1)).unwrap();
    assert_eq!(ec.logical_time(), Some(Duration::ZERO));
    assert_eq!(unit.executes.load(Ordering::SeqCst), 0);
}

#[test]
fn synchronous_tick_dispatches_on_the_caller_thread() {
    let ec = sync_scheduler();
    let unit = CountingUnit::named("u");
    ec.add_unit(unit.handle()).unwrap();
    ec.start().unwrap();
    ec.activate_unit(&unit.handle()).unwrap();

    // Nothing moves until a tick is supplied.
    assert_eq!(
        ec.unit_state(&unit.handle()).unwrap(),
        LifecycleState::Inactive
    );
    assert_eq!(unit.executes.load(Ordering::SeqCst), 0);

    ec.tick(Duration::from_millis(1)).unwrap();
    // The call has returned, so the whole tick already ran.
    assert_eq!(
        ec.unit_state(&unit.handle()).unwrap(),
        LifecycleState::Active
    );
    assert_eq!(unit.executes.load(Ordering::SeqCst), 1);
    assert_eq!(unit.updates.load(Ordering::SeqCst), 1);

    ec.tick(Duration::from_millis(2)).unwrap();
    assert_eq!(unit.executes.load(Ordering::SeqCst), 2);
    ec.stop().unwrap();
}

#[test]
fn dispatch_order_is_deterministic_per_tick() {
    let ec = sync_scheduler();
    let log = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let a = CountingUnit::with_log("a", log.clone());
    let b = CountingUnit::with_log("b", log.clone());
    ec.add_unit(a.handle()).unwrap();
    ec.add_unit(b.handle()).unwrap();
    ec.start().unwrap();
    ec.activate_unit(&a.handle()).unwrap();
    ec.activate_unit(&b.handle()).unwrap();
    ec.tick(Duration::from_millis(1)).unwrap();

    log.lock().clear();
    ec.tick(Duration::from_millis(2)).unwrap();
    let events = log.lock().clone();
    assert_eq!(
        events,
        ["a:execute", "b:execute", "a:state_update", "b:state_update"]
    );
    ec.stop().unwrap();
}

#[test]
fn asynchronous_tick_returns_before_dispatch_completes() {
    let ec = TickScheduler::new(100.0, manual_policy(), TickMode::Asynchronous).unwrap();
    let unit = CountingUnit::named("u");
    ec.add_unit(unit.handle()).unwrap();
    ec.start().unwrap();
    ec.activate_unit(&unit.handle()).unwrap();

    ec.tick(Duration::from_millis(1)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while unit.executes.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "worker never dispatched the tick");
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(
        ec.unit_state(&unit.handle()).unwrap(),
        LifecycleState::Active
    );
    ec.stop().unwrap();
}

#[test]
fn asynchronous_mode_converges_synchronous_waits_without_external_ticks() {
    let policy = TransitionPolicy {
        activation_timeout: Duration::from_secs(2),
        deactivation_timeout: Duration::from_secs(2),
        ..TransitionPolicy::default()
    };
    let ec = TickScheduler::new(100.0, policy, TickMode::Asynchronous).unwrap();
    let unit = CountingUnit::named("u");
    ec.add_unit(unit.handle()).unwrap();
    ec.start().unwrap();

    // No external tick is ever supplied; the request self-signals the
    // worker and the bounded wait still returns success.
    ec.activate_unit(&unit.handle()).unwrap();
    assert_eq!(
        ec.unit_state(&unit.handle()).unwrap(),
        LifecycleState::Active
    );
    ec.deactivate_unit(&unit.handle()).unwrap();
    assert_eq!(
        ec.unit_state(&unit.handle()).unwrap(),
        LifecycleState::Inactive
    );
    ec.stop().unwrap();
}

#[test]
fn pending_transitions_wait_for_the_next_tick_in_synchronous_mode() {
    let ec = sync_scheduler();
    let unit = CountingUnit::named("u");
    ec.add_unit(unit.handle()).unwrap();
    ec.start().unwrap();

    ec.activate_unit(&unit.handle()).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    // No self-dispatch in synchronous mode.
    assert_eq!(
        ec.unit_state(&unit.handle()).unwrap(),
        LifecycleState::Inactive
    );
    ec.tick(Duration::from_millis(1)).unwrap();
    assert_eq!(
        ec.unit_state(&unit.handle()).unwrap(),
        LifecycleState::Active
    );
    ec.stop().unwrap();
}

#[test]
fn failure_containment_holds_under_external_ticks() {
    let ec = sync_scheduler();
    let steady = CountingUnit::named("steady");
    let flaky = CountingUnit::named("flaky");
    ec.add_unit(steady.handle()).unwrap();
    ec.add_unit(flaky.handle()).unwrap();
    ec.start().unwrap();
    ec.activate_unit(&steady.handle()).unwrap();
    ec.activate_unit(&flaky.handle()).unwrap();
    ec.tick(Duration::from_millis(1)).unwrap();

    flaky.fail_execute.store(true, Ordering::SeqCst);
    ec.tick(Duration::from_millis(2)).unwrap();
    ec.tick(Duration::from_millis(3)).unwrap();
    assert_eq!(
        ec.unit_state(&flaky.handle()).unwrap(),
        LifecycleState::Error
    );
    assert_eq!(
        ec.unit_state(&steady.handle()).unwrap(),
        LifecycleState::Active
    );
    assert_eq!(steady.executes.load(Ordering::SeqCst), 3);
    ec.stop().unwrap();
}

#[test]
fn a_periodic_style_context_refuses_external_ticks() {
    use unitcycle::sched::PeriodicScheduler;
    let ec = PeriodicScheduler::new(100.0, manual_policy(), false, Vec::new()).unwrap();
    let context: &dyn ExecutionContext = &ec;
    assert!(matches!(
        context.tick(Duration::from_millis(1)),
        Err(ContextError::BadParameter(_))
    ));
    assert_eq!(context.logical_time(), None);
}

#[test]
fn profile_reports_the_ticked_kind() {
    let ec = sync_scheduler();
    let unit = CountingUnit::named("solo");
    ec.add_unit(unit.handle()).unwrap();
    let profile = ec.profile();
    assert_eq!(profile.kind, "ticked");
    assert_eq!(profile.participants.len(), 1);
    assert_eq!(profile.participants[0].name, "solo");
}
