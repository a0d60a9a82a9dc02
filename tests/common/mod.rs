#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! #[macro_use]
//! mod common;
//! use common::*;
//! ```

use parking_lot::Mutex;
use proptest::prelude::ProptestConfig;
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;
use weft::{
    CallSite, CallTrace, Called, Catalog, Classifier, ClassifierConfig, Cx, Pausable,
    RoutineSignature, RunStatus, Task,
};

static INIT_LOGGING: Once = Once::new();

/// Module name under which the hand-woven test routines are cataloged.
pub const APP: &str = "app";

/// Upper bound on re-entries in [`drive`].
pub const MAX_RUNS: usize = 64;

/// Default number of cases for property tests.
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level. The first call wins.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Log a test phase header.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Ordered record of side effects across task re-entries.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}

/// Catalog describing the routines below.
pub fn app_catalog() -> Catalog {
    let catalog = Catalog::new();
    catalog
        .register(APP, RoutineSignature::new("entry").pausable())
        .register(APP, RoutineSignature::new("routine_a").pausable())
        .register(APP, RoutineSignature::new("routine_b").pausable())
        .register(APP, RoutineSignature::new("format_line"));
    catalog
}

/// Classifier over [`app_catalog`].
pub fn app_classifier() -> Arc<Classifier> {
    Arc::new(Classifier::new(
        Arc::new(app_catalog()),
        ClassifierConfig::default(),
    ))
}

/// Physical trace as seen from inside `routine_a` called by the entry.
pub fn trace_from_routine_a() -> CallTrace {
    CallTrace::starting_at(CallSite::new("weft::task::Cx", "recover_depth"))
        .then(CallSite::new(APP, "routine_a"))
        .then(CallSite::new("core::ops::function", "call_once"))
        .then(CallSite::new(APP, "entry"))
        .then(CallSite::boundary())
}

/// Leaf routine: one side effect, a yield, another side effect.
pub fn routine_b(cx: &mut Cx<'_>, log: &EventLog) -> Pausable<()> {
    match cx.marker() {
        0 => log.push("before yield"),
        1 => {}
        m => return Err(cx.unknown_marker(m)),
    }
    if let Called::Paused(s) = cx.yield_now()? {
        log.push("suspend");
        return Err(cx.suspend(s, 1, ()));
    }
    log.push("after yield");
    Ok(())
}

/// Middle routine: calls [`routine_b`] and records its own completion.
pub fn routine_a(cx: &mut Cx<'_>, log: &EventLog) -> Pausable<()> {
    match cx.marker() {
        0 | 1 => {}
        m => return Err(cx.unknown_marker(m)),
    }
    if let Called::Paused(s) = cx.call(|cx| routine_b(cx, log))? {
        return Err(cx.suspend(s, 1, ()));
    }
    log.push("A done");
    Ok(())
}

/// Task whose entry calls A, which calls B, which yields once.
pub fn nested_task(log: &EventLog) -> Task {
    let log = log.clone();
    Task::with_classifier(
        move |cx: &mut Cx<'_>| -> Pausable<()> {
            match cx.marker() {
                0 | 1 => {}
                m => return Err(cx.unknown_marker(m)),
            }
            if let Called::Paused(s) = cx.call(|cx| routine_a(cx, &log))? {
                return Err(cx.suspend(s, 1, ()));
            }
            log.push("entry done");
            Ok(())
        },
        app_classifier(),
    )
}

/// Re-enters `task` until done, calling `between` after every suspension.
pub fn drive(task: &Task, mut between: impl FnMut(usize)) -> usize {
    for runs in 1..=MAX_RUNS {
        match task.run() {
            Ok(RunStatus::Done) => return runs,
            Ok(RunStatus::Suspended) => between(runs),
            Err(err) => panic!("task {} failed on run {runs}: {err}", task.id()),
        }
    }
    panic!("task {} still suspended after {MAX_RUNS} runs", task.id());
}
