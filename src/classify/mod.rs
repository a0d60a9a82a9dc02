//! Call-site pausability classification.
//!
//! The [`Classifier`] answers one question per call site: may the routine
//! running there suspend? Resolution goes through a [`RoutineCatalog`]:
//!
//! 1. No candidate with the routine's name: not capable.
//! 2. Exactly one candidate, or an original/woven pair: its marker decides.
//! 3. Several candidates and a known line: the routine whose body encloses
//!    the line decides.
//! 4. Otherwise: capable if *any* candidate is. When the candidates
//!    disagree the site is recorded as an [`Ambiguity`] and a warning is
//!    logged once.
//!
//! A module the catalog cannot resolve is logged and answered with
//! [`Classification::NotCapable`]; classification never fails.
//!
//! Answers are memoized per site in a compute-once [`OnceMap`], the only
//! state in this crate shared between tasks.

mod cache;
mod catalog;
mod depth;
mod signature;
mod site;

pub use cache::{CacheStats, OnceMap};
pub use catalog::{Catalog, RoutineCatalog};
pub use signature::{Access, RoutineSignature, FIBER_PARAM, PAUSABLE_EFFECT};
pub use site::{CallSite, CallTrace, BOUNDARY_MODULE, BOUNDARY_ROUTINE, GENERATED_FILE};

use core::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::tracing_compat::{trace, warn};

/// Answer for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The routine may suspend.
    Capable,
    /// The routine never suspends.
    NotCapable,
    /// Same-named candidates disagree; resolved as capable.
    AmbiguousResolvedCapable,
}

impl Classification {
    /// Returns true unless the answer is [`Classification::NotCapable`].
    #[must_use]
    pub const fn may_suspend(self) -> bool {
        !matches!(self, Self::NotCapable)
    }

    const fn from_marker(pausable: bool) -> Self {
        if pausable {
            Self::Capable
        } else {
            Self::NotCapable
        }
    }
}

/// A call site whose same-named candidates disagree on suspend capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    /// The site that was classified.
    pub site: CallSite,
    /// Number of same-named candidates.
    pub candidates: usize,
    /// How many of them may suspend.
    pub capable: usize,
}

/// Infrastructure prefixes that never count towards stack depth.
///
/// `Cx::call` and the closure adapter of [`Routine`](crate::task::Routine)
/// only carry frames that are counted elsewhere.
pub const DEFAULT_NOT_COUNTED: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "weft::runtime::",
    "weft::task::cx::Cx::call",
    "weft::task::Routine::",
];

/// Tunables for classification and stack-depth computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Module prefix of the runtime itself; its frames always count.
    pub runtime_namespace: String,
    /// Path prefixes of infrastructure frames that never count, matched
    /// against `module::routine`.
    pub not_counted_prefixes: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            runtime_namespace: "weft::".to_string(),
            not_counted_prefixes: DEFAULT_NOT_COUNTED.iter().copied().map(String::from).collect(),
        }
    }
}

/// Memoizing call-site classifier.
pub struct Classifier {
    catalog: Arc<dyn RoutineCatalog>,
    config: ClassifierConfig,
    cache: OnceMap<CallSite, Classification>,
    ambiguities: Mutex<Vec<Ambiguity>>,
}

impl Classifier {
    /// Creates a classifier over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn RoutineCatalog>, config: ClassifierConfig) -> Self {
        Self {
            catalog,
            config,
            cache: OnceMap::new(),
            ambiguities: Mutex::new(Vec::new()),
        }
    }

    /// Returns the catalog answers are resolved against.
    #[must_use]
    pub fn catalog(&self) -> Arc<dyn RoutineCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classifies `site`, computing the answer on first use.
    pub fn classify(&self, site: &CallSite) -> Classification {
        self.cache.get_or_init(site, || self.resolve(site))
    }

    /// Shorthand for `classify(site).may_suspend()`.
    #[must_use]
    pub fn is_pausable(&self, site: &CallSite) -> bool {
        self.classify(site).may_suspend()
    }

    /// Returns every ambiguity diagnosed so far, in discovery order.
    #[must_use]
    pub fn ambiguities(&self) -> Vec<Ambiguity> {
        self.ambiguities.lock().clone()
    }

    /// Returns the memo cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn resolve(&self, site: &CallSite) -> Classification {
        let candidates = match self.catalog.candidates(&site.module, &site.routine) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(%site, error = %err, "could not resolve call site; treating as not pausable");
                return Classification::NotCapable;
            }
        };

        let answer = match candidates.as_slice() {
            [] => Classification::NotCapable,
            [only] => Classification::from_marker(only.is_pausable()),
            [a, b] if a.is_woven_pair(b) => Classification::from_marker(a.is_pausable()),
            [a, b] if b.is_woven_pair(a) => Classification::from_marker(b.is_pausable()),
            many => match site.known_line() {
                Some(line) => self.by_line(site, line, many),
                None => self.any_candidate(site, many),
            },
        };
        trace!(%site, ?answer, candidates = candidates.len(), "classified call site");
        answer
    }

    fn by_line(&self, site: &CallSite, line: u32, candidates: &[RoutineSignature]) -> Classification {
        match self.catalog.locate(&site.module, line) {
            Ok(Some(located)) if located.name == site.routine => {
                Classification::from_marker(located.is_pausable())
            }
            Ok(_) => self.any_candidate(site, candidates),
            Err(err) => {
                trace!(%site, error = %err, "line lookup failed; falling back to candidates");
                self.any_candidate(site, candidates)
            }
        }
    }

    fn any_candidate(&self, site: &CallSite, candidates: &[RoutineSignature]) -> Classification {
        let capable = candidates.iter().filter(|c| c.is_pausable()).count();
        if capable == 0 {
            return Classification::NotCapable;
        }
        if capable == candidates.len() {
            return Classification::Capable;
        }
        warn!(
            %site,
            candidates = candidates.len(),
            capable,
            "routines of the same name differ in suspend capability; treating as pausable. \
             Routines that may suspend should not share a name with routines that cannot"
        );
        self.ambiguities.lock().push(Ambiguity {
            site: site.clone(),
            candidates: candidates.len(),
            capable,
        });
        Classification::AmbiguousResolvedCapable
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("config", &self.config)
            .field("cached", &self.cache.len())
            .field("ambiguities", &self.ambiguities.lock().len())
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<Arc<Classifier>> = OnceLock::new();

/// Returns the process-wide classifier.
///
/// Unless [`install_global`] ran first, this is a classifier over an empty
/// [`Catalog`] with the default configuration.
pub fn global() -> Arc<Classifier> {
    Arc::clone(GLOBAL.get_or_init(|| {
        Arc::new(Classifier::new(
            Arc::new(Catalog::new()),
            ClassifierConfig::default(),
        ))
    }))
}

/// Installs the process-wide classifier.
///
/// Fails, returning `classifier`, if one was already installed or
/// [`global`] has already been called.
pub fn install_global(classifier: Arc<Classifier>) -> Result<(), Arc<Classifier>> {
    GLOBAL.set(classifier)
}
