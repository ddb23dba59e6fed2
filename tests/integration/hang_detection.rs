//! End-to-end detection scenarios on simulated clocks.
//!
//! These mirror the watcher's core guarantees: a loop that keeps running the
//! canceller step never trips the alarm; a loop that freezes is recorded
//! once per elapsed `max_delay`; recovery clears the live flag but never the
//! history.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hangwatch::callsite;

use crate::helpers::{advance_both, init_tracing, sim_watcher};

#[test]
fn healthy_loop_never_records_a_hang() {
    init_tracing();
    let (mut watcher, scheduler, alarm) = sim_watcher(1, 5);
    watcher.start().unwrap();

    advance_both(6, &scheduler, &alarm);

    let stats = watcher.stats();
    assert_eq!(stats.hang_count, 0);
    assert!(stats.per_site.is_empty());
    assert!(!stats.currently_hung);
    assert_eq!(stats.current_offender, None);
}

#[test]
fn frozen_loop_records_exactly_one_hang_per_max_delay() {
    let (mut watcher, scheduler, alarm) = sim_watcher(1, 5);
    let cell = watcher.site_cell();
    watcher.start().unwrap();

    // One healthy second, then the loop stops inside a callback while the
    // alarm clock keeps running.
    advance_both(1, &scheduler, &alarm);
    cell.enter(callsite!("blocking_callback"));
    alarm.advance(Duration::from_secs(6));

    let stats = watcher.stats();
    assert_eq!(stats.hang_count, 1);
    assert_eq!(stats.per_site.len(), 1);
    assert!(stats.currently_hung);
    assert_eq!(stats.current_offender.unwrap().function, "blocking_callback");
}

#[test]
fn multi_period_stall_is_recorded_once_per_period() {
    let (mut watcher, _scheduler, alarm) = sim_watcher(1, 5);
    watcher.site_cell().enter(callsite!("stuck_forever"));
    watcher.start().unwrap();

    // Armed at t=0 with max_delay 5: expiries at 5, 10, and 15.
    alarm.advance(Duration::from_secs(16));

    let stats = watcher.stats();
    assert_eq!(stats.hang_count, 3);
    assert_eq!(stats.per_site.values().sum::<u64>(), 3);
}

#[test]
fn recovery_clears_live_status_but_keeps_history() {
    let (mut watcher, scheduler, alarm) = sim_watcher(1, 5);
    let cell = watcher.site_cell();
    watcher.start().unwrap();

    advance_both(1, &scheduler, &alarm);
    cell.enter(callsite!("blocking_callback"));
    alarm.advance(Duration::from_secs(6));
    assert!(watcher.stats().currently_hung);

    // Loop comes back: the callback returns and the step runs again.
    cell.exit();
    advance_both(6, &scheduler, &alarm);

    let stats = watcher.stats();
    assert_eq!(stats.hang_count, 1);
    assert_eq!(stats.per_site.len(), 1);
    assert!(!stats.currently_hung);
    assert_eq!(stats.current_offender, None);
}

#[test]
fn repeat_episodes_at_one_site_accumulate() {
    let (mut watcher, scheduler, alarm) = sim_watcher(1, 5);
    let cell = watcher.site_cell();
    let site = callsite!("flaky_callback");
    watcher.start().unwrap();

    for _ in 0..2 {
        cell.enter(site);
        alarm.advance(Duration::from_secs(6));
        cell.exit();
        advance_both(2, &scheduler, &alarm);
    }

    let stats = watcher.stats();
    assert_eq!(stats.hang_count, 2);
    assert_eq!(stats.per_site.get(site), Some(&2));
    assert!(!stats.currently_hung);
}

#[test]
fn reset_during_a_hang_keeps_the_live_flag() {
    let (mut watcher, scheduler, alarm) = sim_watcher(1, 5);
    let cell = watcher.site_cell();
    watcher.start().unwrap();

    cell.enter(callsite!("stuck"));
    alarm.advance(Duration::from_secs(6));
    watcher.reset_stats();

    let stats = watcher.stats();
    assert_eq!(stats.hang_count, 0);
    assert!(stats.per_site.is_empty());
    assert!(stats.currently_hung);
    assert!(stats.current_offender.is_some());

    // Recovery still goes through the canceller step as usual.
    cell.exit();
    advance_both(2, &scheduler, &alarm);
    assert!(!watcher.stats().currently_hung);
}

#[test]
fn observers_are_notified_in_order_with_the_captured_site() {
    let (mut watcher, _scheduler, alarm) = sim_watcher(1, 5);
    let seen = Arc::new(Mutex::new(Vec::new()));
    for label in ["first", "second"] {
        let seen = Arc::clone(&seen);
        watcher
            .add_observer(move |event| {
                seen.lock()
                    .unwrap()
                    .push((label, event.site.function, event.hang_count));
            })
            .unwrap();
    }
    watcher.site_cell().enter(callsite!("stuck"));
    watcher.start().unwrap();

    alarm.advance(Duration::from_secs(6));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("first", "stuck", 1), ("second", "stuck", 1)]
    );
}

#[test]
fn panicking_observer_is_isolated() {
    let (mut watcher, _scheduler, alarm) = sim_watcher(1, 5);
    let later_calls = Arc::new(AtomicUsize::new(0));
    watcher.add_observer(|_| panic!("observer bug")).unwrap();
    let later = Arc::clone(&later_calls);
    watcher
        .add_observer(move |_| {
            later.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    watcher.start().unwrap();

    alarm.advance(Duration::from_secs(6));

    assert_eq!(later_calls.load(Ordering::SeqCst), 1);
    assert_eq!(watcher.observer_failures(), 1);
    // The panic corrupted nothing.
    assert_eq!(watcher.stats().hang_count, 1);
}

#[test]
fn stop_disarms_and_stops_recording() {
    let (mut watcher, scheduler, alarm) = sim_watcher(1, 5);
    watcher.start().unwrap();
    advance_both(1, &scheduler, &alarm);

    watcher.stop();
    assert!(!alarm.pending());

    // Neither clock can produce hangs or re-arms once stopped.
    alarm.advance(Duration::from_secs(20));
    scheduler.advance(Duration::from_secs(20));
    assert_eq!(watcher.stats().hang_count, 0);
    assert!(!alarm.pending());
}
