//! Sources of routine signatures.
//!
//! [`RoutineCatalog`] is the seam between the classifier and whatever
//! knows the compiled program: a registry fed by a build step, a
//! debug-info reader, or a static analyzer. [`Catalog`] is the in-memory
//! implementation.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use parking_lot::RwLock;

use super::RoutineSignature;
use crate::error::{Error, ErrorKind, Result};

/// Resolves routines by module and name, and source lines to routines.
pub trait RoutineCatalog: Send + Sync {
    /// Returns every routine named `name` declared in `module`.
    ///
    /// Fails with [`ErrorKind::ResolutionFailed`] if the module is unknown.
    fn candidates(&self, module: &str, name: &str) -> Result<Vec<RoutineSignature>>;

    /// Returns the routine whose body encloses `line` in `module`.
    ///
    /// `Ok(None)` means no routine covers the line. An error means the
    /// body descriptions could not be read at all.
    fn locate(&self, module: &str, line: u32) -> Result<Option<RoutineSignature>>;
}

#[derive(Debug)]
struct Entry {
    signature: RoutineSignature,
    lines: Option<RangeInclusive<u32>>,
}

#[derive(Debug, Default)]
struct ModuleEntry {
    routines: Vec<Entry>,
    bodies_unavailable: bool,
}

/// An in-memory, thread-safe [`RoutineCatalog`].
#[derive(Debug, Default)]
pub struct Catalog {
    modules: RwLock<HashMap<String, ModuleEntry>>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `module` with no routines.
    pub fn register_module(&self, module: &str) -> &Self {
        self.modules.write().entry(module.to_string()).or_default();
        self
    }

    /// Registers a routine without body position information.
    pub fn register(&self, module: &str, signature: RoutineSignature) -> &Self {
        self.insert(module, signature, None)
    }

    /// Registers a routine whose body spans `lines`.
    pub fn register_at(
        &self,
        module: &str,
        signature: RoutineSignature,
        lines: RangeInclusive<u32>,
    ) -> &Self {
        self.insert(module, signature, Some(lines))
    }

    /// Makes `locate` fail for `module`, as when its bodies cannot be read.
    pub fn hide_bodies(&self, module: &str) -> &Self {
        self.modules
            .write()
            .entry(module.to_string())
            .or_default()
            .bodies_unavailable = true;
        self
    }

    /// Number of declared modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.read().len()
    }

    fn insert(
        &self,
        module: &str,
        signature: RoutineSignature,
        lines: Option<RangeInclusive<u32>>,
    ) -> &Self {
        self.modules
            .write()
            .entry(module.to_string())
            .or_default()
            .routines
            .push(Entry { signature, lines });
        self
    }
}

fn unknown_module(module: &str) -> Error {
    Error::new(ErrorKind::ResolutionFailed).with_message(format!("module `{module}` is not in the catalog"))
}

impl RoutineCatalog for Catalog {
    fn candidates(&self, module: &str, name: &str) -> Result<Vec<RoutineSignature>> {
        let modules = self.modules.read();
        let entry = modules.get(module).ok_or_else(|| unknown_module(module))?;
        Ok(entry
            .routines
            .iter()
            .filter(|e| e.signature.name == name)
            .map(|e| e.signature.clone())
            .collect())
    }

    fn locate(&self, module: &str, line: u32) -> Result<Option<RoutineSignature>> {
        let modules = self.modules.read();
        let entry = modules.get(module).ok_or_else(|| unknown_module(module))?;
        if entry.bodies_unavailable {
            return Err(Error::new(ErrorKind::ResolutionFailed)
                .with_message(format!("no body descriptions for module `{module}`")));
        }
        Ok(entry
            .routines
            .iter()
            .find(|e| e.lines.as_ref().is_some_and(|r| r.contains(&line)))
            .map(|e| e.signature.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_filter_by_name() {
        let catalog = Catalog::new();
        catalog
            .register("app", RoutineSignature::new("a").pausable())
            .register("app", RoutineSignature::new("a").param("u8"))
            .register("app", RoutineSignature::new("b"));
        assert_eq!(catalog.candidates("app", "a").expect("known").len(), 2);
        assert!(catalog.candidates("app", "zzz").expect("known").is_empty());
        let err = catalog.candidates("other", "a").expect_err("unknown module");
        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);
    }

    #[test]
    fn locate_by_line_range() {
        let catalog = Catalog::new();
        catalog
            .register_at("app", RoutineSignature::new("a").pausable(), 10..=20)
            .register_at("app", RoutineSignature::new("a"), 30..=40);
        let found = catalog.locate("app", 15).expect("ok").expect("covered");
        assert!(found.is_pausable());
        let found = catalog.locate("app", 31).expect("ok").expect("covered");
        assert!(!found.is_pausable());
        assert!(catalog.locate("app", 25).expect("ok").is_none());
    }

    #[test]
    fn hidden_bodies_fail_locate_only() {
        let catalog = Catalog::new();
        catalog
            .register_at("app", RoutineSignature::new("a"), 1..=5)
            .hide_bodies("app");
        assert!(catalog.locate("app", 3).is_err());
        assert_eq!(catalog.candidates("app", "a").expect("ok").len(), 1);
        assert_eq!(catalog.module_count(), 1);
    }
}
