//! The frame store that stands in for a native call stack across suspension.
//!
//! A [`Fiber`] is an ordered stack of frame slots indexed by depth. Each slot
//! is either empty (the frame has nothing captured), a pause sentinel (the
//! frame of the primitive that suspended), or captured state: a resume
//! marker plus an opaque value holding the locals the frame needs to continue.
//!
//! A single re-entry of a task is bracketed by [`Fiber::begin`] and
//! [`Fiber::end`]. Every nested suspend-capable call is bracketed by
//! [`Fiber::down`] and [`Fiber::up`] in strict stack discipline:
//!
//! ```text
//! begin()            depth 0 -> 1   entry frame
//!   down()           depth 1 -> 2   callee frame
//!     ...
//!   up() -> Up       depth 2 -> 1   four-way outcome for the caller
//! end() -> bool      depth 1 -> 0   true if left suspended
//! ```
//!
//! While unwinding, [`Up`] tells each caller whether it must capture its own
//! locals before propagating the suspension further, so no frame needs to
//! coordinate with any other. While rewinding, [`Fiber::down`] exposes the
//! marker of the frame being re-entered so the routine can jump back to the
//! call that suspended, and [`Fiber::state`] hands back exactly the value
//! that frame stored.
//!
//! Mis-stacked calls (`up()` with no matching `down()`, `end()` away from
//! the entry frame) are programming errors and panic. Mismatches between
//! what was recorded and what the re-entered code expects are reported as
//! [`ErrorKind::ProtocolViolation`] or [`ErrorKind::StateMismatch`].

use core::any::{self, Any};
use core::fmt;

use crate::error::{Error, ErrorKind, Result};
use crate::tracing_compat::trace;

/// Marker reported by a frame that has no captured state.
pub const FRESH: u32 = 0;

/// Marker reported by the frame of a suspend primitive while it is rewound.
pub const PAUSE_MARKER: u32 = u32::MAX;

/// Outcome of [`Fiber::up`], seen by the caller of a suspend-capable routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Up {
    /// The callee returned normally and this frame had nothing captured.
    NotPausingNoState,
    /// The callee returned normally after this frame was rewound; its captured
    /// state has been released.
    NotPausingHasState,
    /// The callee is suspending and this frame must capture its locals.
    PausingNoState,
    /// The callee is suspending again and this frame's earlier capture is still valid.
    PausingHasState,
}

impl Up {
    /// Returns true if the stack is unwinding towards the scheduler.
    #[must_use]
    pub const fn is_pausing(self) -> bool {
        matches!(self, Self::PausingNoState | Self::PausingHasState)
    }

    /// Returns true if the caller's frame held captured state.
    #[must_use]
    pub const fn has_state(self) -> bool {
        matches!(self, Self::NotPausingHasState | Self::PausingHasState)
    }
}

enum Slot {
    Pause,
    Saved {
        marker: u32,
        type_name: &'static str,
        locals: Box<dyn Any + Send>,
    },
}

impl Slot {
    fn marker(&self) -> u32 {
        match self {
            Self::Pause => PAUSE_MARKER,
            Self::Saved { marker, .. } => *marker,
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => write!(f, "Pause"),
            Self::Saved {
                marker, type_name, ..
            } => write!(f, "Saved({marker}, {type_name})"),
        }
    }
}

/// An explicit per-task stack of call frames.
#[derive(Debug, Default)]
pub struct Fiber {
    slots: Vec<Option<Slot>>,
    /// Number of wound frames; 0 when no re-entry is in progress.
    depth: usize,
    /// Resume marker of the frame at the top of the wound stack.
    marker: u32,
    pausing: bool,
}

impl Fiber {
    /// Creates an empty, unwound fiber.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Winds the fiber for a fresh re-entry and enters the entry frame.
    ///
    /// # Panics
    ///
    /// Panics if a re-entry is already in progress.
    pub fn begin(&mut self) -> &mut Self {
        assert!(
            self.depth == 0,
            "Fiber::begin: re-entry already in progress at depth {}",
            self.depth
        );
        self.pausing = false;
        self.down()
    }

    /// Finishes a re-entry after the entry routine has returned.
    ///
    /// Returns true if the fiber is left suspended, in which case it retains
    /// every frame from the suspend point back to the entry frame. Otherwise
    /// all captured state is released.
    ///
    /// # Panics
    ///
    /// Panics if the wound depth is not exactly the entry frame.
    pub fn end(&mut self) -> bool {
        assert!(
            self.depth == 1,
            "Fiber::end: expected only the entry frame to be wound, found depth {}",
            self.depth
        );
        let suspended = self.pausing;
        if !suspended {
            self.slots.clear();
        }
        self.pausing = false;
        self.depth = 0;
        self.marker = FRESH;
        trace!(suspended, retained = self.retained(), "fiber end");
        suspended
    }

    /// Enters a nested frame. Must be matched by exactly one [`Fiber::up`].
    pub fn down(&mut self) -> &mut Self {
        let index = self.depth;
        self.depth += 1;
        if self.slots.len() <= index {
            self.slots.push(None);
        }
        self.marker = self.slots[index].as_ref().map_or(FRESH, Slot::marker);
        trace!(depth = self.depth, marker = self.marker, "fiber down");
        self
    }

    /// Leaves a nested frame and reports what the caller must do.
    ///
    /// # Panics
    ///
    /// Panics if there is no matching [`Fiber::down`].
    pub fn up(&mut self) -> Up {
        assert!(
            self.depth >= 2,
            "Fiber::up: no matching down (depth {})",
            self.depth
        );
        let callee = self.depth - 1;
        self.depth -= 1;
        let caller = callee - 1;

        let outcome = if self.pausing {
            self.marker = self.slots[caller].as_ref().map_or(FRESH, Slot::marker);
            if self.slots[caller].is_some() {
                Up::PausingHasState
            } else {
                Up::PausingNoState
            }
        } else {
            self.slots[callee] = None;
            // The caller is live again from here on, whatever it was rewound from.
            self.marker = FRESH;
            if self.slots[caller].take().is_some() {
                Up::NotPausingHasState
            } else {
                Up::NotPausingNoState
            }
        };
        trace!(depth = self.depth, ?outcome, "fiber up");
        outcome
    }

    /// Returns the resume marker of the current frame ([`FRESH`] on first entry).
    #[must_use]
    pub const fn marker(&self) -> u32 {
        self.marker
    }

    /// Returns true if the current frame is being re-entered.
    #[must_use]
    pub const fn is_rewinding(&self) -> bool {
        self.marker != FRESH
    }

    /// Returns true if a suspension is propagating towards the entry frame.
    #[must_use]
    pub const fn is_pausing(&self) -> bool {
        self.pausing
    }

    /// Returns the number of wound frames (0 outside a re-entry).
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns true if the current frame holds captured state.
    #[must_use]
    pub fn has_state(&self) -> bool {
        self.depth > 0 && matches!(self.slots[self.depth - 1], Some(Slot::Saved { .. }))
    }

    /// Returns the number of frames holding captured state or a pause sentinel.
    #[must_use]
    pub fn retained(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Captures `locals` for the current frame and marks the fiber as pausing.
    ///
    /// On the next re-entry this frame reports `marker` from [`Fiber::down`].
    ///
    /// # Panics
    ///
    /// Panics outside a re-entry, or if `marker` is [`FRESH`] or [`PAUSE_MARKER`].
    pub fn set_state<S: Any + Send>(&mut self, marker: u32, locals: S) {
        assert!(self.depth > 0, "Fiber::set_state: fiber is not wound");
        assert!(
            marker != FRESH && marker != PAUSE_MARKER,
            "Fiber::set_state: marker {marker} is reserved"
        );
        let index = self.depth - 1;
        self.slots[index] = Some(Slot::Saved {
            marker,
            type_name: any::type_name::<S>(),
            locals: Box::new(locals),
        });
        self.pausing = true;
    }

    /// Borrows the state captured at the current frame.
    pub fn state<S: Any>(&self) -> Result<&S> {
        match self.current_slot()? {
            Some(Slot::Saved {
                locals, type_name, ..
            }) => locals.downcast_ref::<S>().ok_or_else(|| {
                self.mismatch(any::type_name::<S>(), type_name)
            }),
            Some(Slot::Pause) => Err(self.mismatch(any::type_name::<S>(), "pause sentinel")),
            None => Err(self.missing_state()),
        }
    }

    /// Mutably borrows the state captured at the current frame.
    pub fn state_mut<S: Any>(&mut self) -> Result<&mut S> {
        let index = self.wound_index()?;
        let err = match &self.slots[index] {
            Some(Slot::Saved { locals, type_name, .. }) if !locals.is::<S>() => {
                Some(self.mismatch(any::type_name::<S>(), type_name))
            }
            Some(Slot::Pause) => Some(self.mismatch(any::type_name::<S>(), "pause sentinel")),
            None => Some(self.missing_state()),
            Some(Slot::Saved { .. }) => None,
        };
        if let Some(err) = err {
            return Err(err);
        }
        match &mut self.slots[index] {
            Some(Slot::Saved { locals, .. }) => locals
                .downcast_mut::<S>()
                .ok_or_else(|| Error::internal("captured state changed type during borrow")),
            _ => Err(Error::internal("captured state vanished during borrow")),
        }
    }

    /// Removes and returns the state captured at the current frame.
    ///
    /// On a type mismatch the slot is left untouched.
    pub fn take_state<S: Any>(&mut self) -> Result<S> {
        let index = self.wound_index()?;
        match self.slots[index].take() {
            Some(Slot::Saved {
                marker,
                type_name,
                locals,
            }) => match locals.downcast::<S>() {
                Ok(locals) => Ok(*locals),
                Err(locals) => {
                    self.slots[index] = Some(Slot::Saved {
                        marker,
                        type_name,
                        locals,
                    });
                    Err(self.mismatch(any::type_name::<S>(), type_name))
                }
            },
            Some(Slot::Pause) => {
                self.slots[index] = Some(Slot::Pause);
                Err(self.mismatch(any::type_name::<S>(), "pause sentinel"))
            }
            None => Err(self.missing_state()),
        }
    }

    /// Flips the pause sentinel at the current frame.
    ///
    /// Called by suspend primitives between their `down()` and `up()`: on
    /// first pass it installs the sentinel and marks the fiber as pausing; on
    /// rewind it removes the sentinel and resumes forward execution.
    pub fn toggle_pause(&mut self) -> Result<()> {
        let index = self.wound_index()?;
        match &self.slots[index] {
            None => {
                self.slots[index] = Some(Slot::Pause);
                self.pausing = true;
                Ok(())
            }
            Some(Slot::Pause) => {
                self.slots[index] = None;
                self.pausing = false;
                Ok(())
            }
            Some(Slot::Saved { marker, .. }) => Err(Error::protocol(format!(
                "toggle_pause: expected a pause sentinel at depth {}, found state with marker {marker}",
                self.depth
            ))),
        }
    }

    /// Re-synchronises the fiber after frames were abandoned without `up()`.
    ///
    /// `index` is the zero-based position of the frame that is live again
    /// (the entry frame is 0). State above it is released. Returns the
    /// marker of that frame.
    pub fn up_ex(&mut self, index: usize) -> Result<u32> {
        if index >= self.depth {
            return Err(Error::protocol(format!(
                "up_ex: frame {index} is not wound (depth {})",
                self.depth
            )));
        }
        for slot in self.slots.iter_mut().skip(index + 1) {
            *slot = None;
        }
        self.depth = index + 1;
        self.marker = self.slots[index].as_ref().map_or(FRESH, Slot::marker);
        trace!(depth = self.depth, marker = self.marker, "fiber up_ex");
        Ok(self.marker)
    }

    /// Drops all frames and captured state.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.depth = 0;
        self.marker = FRESH;
        self.pausing = false;
    }

    fn wound_index(&self) -> Result<usize> {
        if self.depth == 0 {
            return Err(Error::protocol("fiber is not wound"));
        }
        Ok(self.depth - 1)
    }

    fn current_slot(&self) -> Result<Option<&Slot>> {
        let index = self.wound_index()?;
        Ok(self.slots[index].as_ref())
    }

    fn mismatch(&self, expected: &str, found: &str) -> Error {
        Error::new(ErrorKind::StateMismatch).with_message(format!(
            "frame at depth {} holds {found}, expected {expected}",
            self.depth
        ))
    }

    fn missing_state(&self) -> Error {
        Error::protocol(format!("no captured state at depth {}", self.depth))
    }
}
