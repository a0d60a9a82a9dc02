#![allow(missing_docs)]
//! Reference scheduler driving tasks through suspension and wait conditions.

#[macro_use]
mod common;

use common::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use weft::{
    CancelReason, Called, Catalog, Cx, Deadline, Latch, Outcome, Pausable, PauseReason,
    RuntimeConfig, Scheduler,
};

fn config(workers: usize) -> RuntimeConfig {
    RuntimeConfig {
        worker_threads: workers,
        idle_timeout: Some(Duration::from_secs(10)),
        ..RuntimeConfig::default()
    }
}

fn wait_on(reason: PauseReason, log: EventLog) -> impl weft::Routine + 'static {
    move |cx: &mut Cx<'_>| -> Pausable<()> {
        match cx.marker() {
            0 => log.push("waiting"),
            1 => {}
            m => return Err(cx.unknown_marker(m)),
        }
        if let Called::Paused(s) = cx.pause(reason.clone())? {
            return Err(cx.suspend(s, 1, ()));
        }
        log.push("woken");
        Ok(())
    }
}

#[test]
fn pool_drives_nested_tasks_in_order() {
    init_test_logging();
    test_phase!("pool_drives_nested_tasks_in_order");
    let sched = Scheduler::new(config(4));
    let logs: Vec<EventLog> = (0..12).map(|_| EventLog::new()).collect();
    let tasks: Vec<_> = logs
        .iter()
        .map(|log| {
            let task = Arc::new(nested_task(log));
            sched.spawn(Arc::clone(&task));
            task
        })
        .collect();

    let report = sched.run();
    assert_with_log!(report.is_complete(), "all tasks done", 0, report.pending);
    assert_eq!(report.completed, tasks.len());
    assert_eq!(report.failed, 0);

    let expected = ["before yield", "suspend", "after yield", "A done", "entry done"];
    for (task, log) in tasks.iter().zip(&logs) {
        assert!(task.is_done());
        assert_eq!(log.snapshot(), expected, "task {}", task.id());
    }
    test_complete!("pool_drives_nested_tasks_in_order");
}

#[test]
fn deadline_gates_resumption() {
    init_test_logging();
    test_phase!("deadline_gates_resumption");
    let sched = Scheduler::with_catalog(config(1), Arc::new(Catalog::new()));
    let log = EventLog::new();
    let delay = Duration::from_millis(25);
    let started = Instant::now();
    let task = sched.spawn_routine(wait_on(
        PauseReason::wait(Deadline::after(delay)),
        log.clone(),
    ));

    let report = sched.run_current_thread();
    assert!(report.is_complete());
    assert!(started.elapsed() >= delay);
    assert_eq!(log.snapshot(), ["waiting", "woken"]);
    assert!(task.exit_result().is_some_and(|o| o.is_ok()));
    test_complete!("deadline_gates_resumption");
}

#[test]
fn cancellation_wakes_a_blocked_task() {
    init_test_logging();
    test_phase!("cancellation_wakes_a_blocked_task");
    let sched = Scheduler::with_catalog(config(2), Arc::new(Catalog::new()));
    let log = EventLog::new();
    let never = Latch::new();
    let task = sched.spawn_routine(wait_on(PauseReason::wait(never), log.clone()));

    let canceller = {
        let task = Arc::clone(&task);
        thread::spawn(move || {
            while task.pause_reason().is_none() {
                thread::sleep(Duration::from_millis(1));
            }
            task.cancel(CancelReason::user("operator"))
        })
    };
    let report = sched.run();
    assert!(canceller.join().expect("canceller"));
    assert!(report.is_complete());
    assert_eq!(log.snapshot(), ["waiting"]);
    assert_with_log!(
        matches!(task.exit_result(), Some(Outcome::Cancelled(_))),
        "cancelled outcome",
        "Cancelled",
        task.exit_result()
    );
    test_complete!("cancellation_wakes_a_blocked_task");
}

#[test]
fn released_latch_resumes_every_waiter() {
    init_test_logging();
    test_phase!("released_latch_resumes_every_waiter");
    let sched = Scheduler::with_catalog(config(3), Arc::new(Catalog::new()));
    let latch = Latch::new();
    let log = EventLog::new();
    for _ in 0..5 {
        sched.spawn_routine(wait_on(PauseReason::wait(latch.clone()), log.clone()));
    }
    let releaser = {
        let latch = latch.clone();
        let log = log.clone();
        thread::spawn(move || {
            while log.count("waiting") < 5 {
                thread::sleep(Duration::from_millis(1));
            }
            latch.release();
        })
    };
    let report = sched.run();
    releaser.join().expect("releaser");
    assert_eq!(report.completed, 5);
    assert_eq!(log.count("woken"), 5);
    test_complete!("released_latch_resumes_every_waiter");
}
