//! Logical stack depth from a physical call trace.

use super::{CallSite, CallTrace, Classifier};
use crate::error::{Error, ErrorKind, Result};
use crate::tracing_compat::trace;

impl Classifier {
    /// Counts the frames between `trace[0]` and the task re-entry boundary
    /// that take part in the suspend protocol.
    ///
    /// Infrastructure frames (native, generated, or under a not-counted
    /// prefix) are skipped. Of the rest, runtime frames always count and
    /// other frames count when they classify as pausable.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::MissingBoundary`] if the walk never reaches
    /// [`CallSite::boundary`].
    pub fn stack_depth(&self, trace: &CallTrace) -> Result<usize> {
        let mut depth = 0;
        for site in trace.frames().iter().skip(1) {
            if site.is_boundary() {
                trace!(depth, frames = trace.len(), "stack depth computed");
                return Ok(depth);
            }
            if self.is_infrastructure(site) {
                continue;
            }
            if self.is_runtime(site) || self.is_pausable(site) {
                depth += 1;
            }
        }
        Err(Error::new(ErrorKind::MissingBoundary).with_message(format!(
            "walked {} frames without reaching {}",
            trace.len(),
            CallSite::boundary()
        )))
    }

    /// Returns true for frames that never count towards stack depth.
    #[must_use]
    pub fn is_infrastructure(&self, site: &CallSite) -> bool {
        site.module.is_empty()
            || site.native
            || site.is_generated()
            || self
                .config()
                .not_counted_prefixes
                .iter()
                .any(|prefix| site.path_starts_with(prefix))
    }

    fn is_runtime(&self, site: &CallSite) -> bool {
        site.module.starts_with(self.config().runtime_namespace.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Catalog, ClassifierConfig, RoutineSignature};
    use super::*;
    use std::sync::Arc;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn classifier() -> Classifier {
        let catalog = Catalog::new();
        catalog
            .register("app", RoutineSignature::new("outer").pausable())
            .register("app", RoutineSignature::new("inner").pausable())
            .register("app", RoutineSignature::new("helper"));
        Classifier::new(Arc::new(catalog), ClassifierConfig::default())
    }

    #[test]
    fn counts_pausable_frames_only() {
        init_test("counts_pausable_frames_only");
        let trace = CallTrace::starting_at(CallSite::new("app", "probe"))
            .then(CallSite::new("app", "inner"))
            .then(CallSite::new("app", "helper"))
            .then(CallSite::new("std::panicking", "try"))
            .then(CallSite::new("app", "outer"))
            .then(CallSite::new("weft::runtime::scheduler", "dispatch"))
            .then(CallSite::boundary())
            .then(CallSite::new("weft::runtime::scheduler", "worker_loop"));
        let c = classifier();
        assert_eq!(c.stack_depth(&trace).expect("boundary present"), 2);
        crate::test_complete!("counts_pausable_frames_only");
    }

    #[test]
    fn runtime_frames_count() {
        let trace = CallTrace::starting_at(CallSite::new("app", "probe"))
            .then(CallSite::new("weft::task::cx", "call"))
            .then(CallSite::new("app", "outer"))
            .then(CallSite::boundary());
        assert_eq!(classifier().stack_depth(&trace).expect("ok"), 2);
    }

    #[test]
    fn call_plumbing_is_skipped_but_invoke_counts() {
        let trace = CallTrace::starting_at(CallSite::new("weft::task::cx::Cx", "current_stack_depth"))
            .then(CallSite::new("app", "inner"))
            .then(CallSite::new("app::outer", "{{closure}}"))
            .then(CallSite::new("weft::task::cx::Cx", "call"))
            .then(CallSite::new("weft::task::cx::Cx::invoke", "{{closure}}"))
            .then(CallSite::new("weft::task::cx::Cx", "call"))
            .then(CallSite::new("weft::task::cx::Cx", "invoke"))
            .then(CallSite::new("app", "outer"))
            .then(CallSite::new("weft::task::Routine", "execute"))
            .then(CallSite::new("weft::task::Task::run", "{{closure}}"))
            .then(CallSite::boundary());
        assert_eq!(classifier().stack_depth(&trace).expect("ok"), 3);
    }

    #[test]
    fn generated_and_native_frames_are_skipped() {
        let trace = CallTrace::starting_at(CallSite::new("app", "probe"))
            .then(CallSite::new("app", "outer").in_file("<generated>"))
            .then(CallSite::new("app", "inner").native())
            .then(CallSite::new("", "anonymous"))
            .then(CallSite::boundary());
        assert_eq!(classifier().stack_depth(&trace).expect("ok"), 0);
    }

    #[test]
    fn the_point_of_computation_is_excluded() {
        let trace = CallTrace::starting_at(CallSite::new("app", "outer")).then(CallSite::boundary());
        assert_eq!(classifier().stack_depth(&trace).expect("ok"), 0);
    }

    #[test]
    fn missing_boundary_is_fatal() {
        init_test("missing_boundary_is_fatal");
        let trace = CallTrace::starting_at(CallSite::new("app", "probe"))
            .then(CallSite::new("app", "outer"));
        let err = classifier().stack_depth(&trace).expect_err("no boundary");
        assert_eq!(err.kind(), ErrorKind::MissingBoundary);
        assert!(err.is_fatal());
        crate::test_complete!("missing_boundary_is_fatal");
    }
}
