//! Structural descriptions of compiled routines.

use core::fmt;

/// Effect carried by every routine that may suspend.
pub const PAUSABLE_EFFECT: &str = "Pausable";

/// Parameter type appended to a routine when it is woven.
pub const FIBER_PARAM: &str = "weft::fiber::Fiber";

/// Visibility of a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    /// Visible everywhere.
    #[default]
    Public,
    /// Visible inside its crate.
    Crate,
    /// Visible inside its module.
    Private,
}

/// The signature of one routine as recorded in a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RoutineSignature {
    /// Routine name.
    pub name: String,
    /// Parameter type names, in order.
    pub params: Vec<String>,
    /// Visibility.
    pub access: Access,
    /// Declared effects; suspend capability is the [`PAUSABLE_EFFECT`] marker.
    pub effects: Vec<String>,
}

impl RoutineSignature {
    /// A public routine with no parameters and no effects.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a parameter type.
    #[must_use]
    pub fn param(mut self, ty: impl Into<String>) -> Self {
        self.params.push(ty.into());
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Declares an effect.
    #[must_use]
    pub fn effect(mut self, effect: impl Into<String>) -> Self {
        self.effects.push(effect.into());
        self
    }

    /// Declares the suspend-capability marker.
    #[must_use]
    pub fn pausable(self) -> Self {
        self.effect(PAUSABLE_EFFECT)
    }

    /// Returns true if `effect` is declared.
    #[must_use]
    pub fn has_effect(&self, effect: &str) -> bool {
        self.effects.iter().any(|e| e == effect)
    }

    /// Returns true if the suspend-capability marker is declared.
    #[must_use]
    pub fn is_pausable(&self) -> bool {
        self.has_effect(PAUSABLE_EFFECT)
    }

    /// Returns true if `woven` is the woven variant of `self`.
    ///
    /// Both must share name, visibility and effects, and `woven` must take
    /// exactly `self`'s parameters followed by a [`FIBER_PARAM`].
    #[must_use]
    pub fn is_woven_pair(&self, woven: &Self) -> bool {
        self.name == woven.name
            && self.access == woven.access
            && same_effects(&self.effects, &woven.effects)
            && woven.params.len() == self.params.len() + 1
            && woven.params.starts_with(&self.params)
            && woven.params.last().is_some_and(|p| p == FIBER_PARAM)
    }
}

fn same_effects(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|e| b.contains(e))
}

impl fmt::Display for RoutineSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))?;
        if !self.effects.is_empty() {
            write!(f, " [{}]", self.effects.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn woven(sig: &RoutineSignature) -> RoutineSignature {
        sig.clone().param(FIBER_PARAM)
    }

    #[test]
    fn woven_pair_across_visibilities() {
        for access in [Access::Public, Access::Crate, Access::Private] {
            let original = RoutineSignature::new("weave").param("i32").access(access).pausable();
            assert!(original.is_woven_pair(&woven(&original)), "{access:?}");
        }
    }

    #[test]
    fn different_params_are_not_a_pair() {
        let original = RoutineSignature::new("diff").pausable();
        let other = RoutineSignature::new("diff").param("i32").param(FIBER_PARAM).pausable();
        assert!(!original.is_woven_pair(&other));

        let original = RoutineSignature::new("diff").param("i32").pausable();
        let other = RoutineSignature::new("diff").param("String").param(FIBER_PARAM).pausable();
        assert!(!original.is_woven_pair(&other));
    }

    #[test]
    fn different_effects_or_access_are_not_a_pair() {
        let original = RoutineSignature::new("fx").pausable();
        let more = woven(&original).effect("Io");
        assert!(!original.is_woven_pair(&more));

        let swapped = RoutineSignature::new("fx").effect("Io").param(FIBER_PARAM);
        assert!(!original.is_woven_pair(&swapped));

        let private = woven(&original).access(Access::Private);
        assert!(!original.is_woven_pair(&private));
    }

    #[test]
    fn trailing_param_must_be_fiber() {
        let original = RoutineSignature::new("tail").pausable();
        let other = RoutineSignature::new("tail").param("u8").pausable();
        assert!(!original.is_woven_pair(&other));
    }

    #[test]
    fn display_lists_params_and_effects() {
        let sig = RoutineSignature::new("run").param("u32").pausable();
        assert_eq!(sig.to_string(), "run(u32) [Pausable]");
    }
}
