//! Call-site descriptors and call traces.

use core::fmt;
use std::backtrace::{Backtrace, BacktraceStatus};

/// Module of the frame that bounds every task re-entry.
pub const BOUNDARY_MODULE: &str = "weft::task::Task";

/// Routine of the frame that bounds every task re-entry.
pub const BOUNDARY_ROUTINE: &str = "run";

/// File name reported by frames of generated code.
pub const GENERATED_FILE: &str = "<generated>";

/// Module of the frame that captures a physical trace.
const CAPTURE_MODULE: &str = "weft::classify::site::CallTrace";

/// A single frame of a call trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// Fully qualified module (or type) path, e.g. `app::greeter`.
    pub module: String,
    /// Routine name within the module.
    pub routine: String,
    /// Source file, if known.
    pub file: Option<String>,
    /// Source line, if known.
    pub line: Option<u32>,
    /// True for routines implemented outside the managed code.
    pub native: bool,
}

impl CallSite {
    /// A frame of `module::routine` with no position information.
    #[must_use]
    pub fn new(module: impl Into<String>, routine: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            routine: routine.into(),
            file: None,
            line: None,
            native: false,
        }
    }

    /// The frame of [`Task::run`](crate::task::Task::run).
    #[must_use]
    pub fn boundary() -> Self {
        Self::new(BOUNDARY_MODULE, BOUNDARY_ROUTINE)
    }

    /// Sets the source file.
    #[must_use]
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Sets the source line.
    #[must_use]
    pub const fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Marks the frame as native.
    #[must_use]
    pub const fn native(mut self) -> Self {
        self.native = true;
        self
    }

    /// Returns true if this is the task re-entry boundary.
    #[must_use]
    pub fn is_boundary(&self) -> bool {
        self.module == BOUNDARY_MODULE && self.routine == BOUNDARY_ROUTINE
    }

    /// Returns true for frames of generated code, closures included.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.file.as_deref() == Some(GENERATED_FILE)
            || self.routine.starts_with('{')
            || self.module.contains('{')
    }

    /// True if `module::routine` starts with `prefix`.
    #[must_use]
    pub fn path_starts_with(&self, prefix: &str) -> bool {
        match prefix.strip_prefix(self.module.as_str()) {
            Some(rest) if !rest.is_empty() => rest
                .strip_prefix("::")
                .is_some_and(|routine| self.routine.starts_with(routine)),
            _ => self.module.starts_with(prefix),
        }
    }

    /// Builds a frame from a demangled symbol name.
    ///
    /// `<T as Trait>::method` lands in `T` when `T` is a path and in `Trait`
    /// otherwise. Symbol hashes and generic arguments are dropped.
    fn from_symbol(symbol: &str) -> Self {
        if symbol == "<unknown>" {
            return Self::new("", symbol).native();
        }
        let symbol = strip_hash(symbol);
        let (module, routine) = match symbol.strip_prefix('<').and_then(split_qualified) {
            Some((owner, rest)) => {
                let owner = match owner.split_once(" as ") {
                    Some((self_ty, trait_path)) if !strip_generics(self_ty).contains("::") => {
                        trait_path
                    }
                    Some((self_ty, _)) => self_ty,
                    None => owner,
                };
                (strip_generics(owner), strip_generics(rest.trim_start_matches("::")))
            }
            None => {
                let path = strip_generics(symbol);
                match path.rsplit_once("::") {
                    Some((module, routine)) => (module.to_string(), routine.to_string()),
                    None => (String::new(), path),
                }
            }
        };
        Self::new(module, routine)
    }

    fn is_capture_point(&self) -> bool {
        self.module == CAPTURE_MODULE && self.routine == "capture"
    }

    /// Returns the usable line number; 0 counts as unknown.
    #[must_use]
    pub fn known_line(&self) -> Option<u32> {
        self.line.filter(|&line| line > 0)
    }
}

/// Drops a trailing `::h<16 hex digits>` symbol hash.
fn strip_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::") {
        Some((head, tail))
            if tail.len() == 17
                && tail.starts_with('h')
                && tail[1..].chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            head
        }
        _ => symbol,
    }
}

/// Splits `T as Trait>::rest` at the `>` that closes the leading `<`.
fn split_qualified(after_open: &str) -> Option<(&str, &str)> {
    let mut depth = 1_usize;
    for (index, c) in after_open.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&after_open[..index], &after_open[index + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Removes every `<...>` group along with a `::` turbofish before it.
fn strip_generics(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0_usize;
    for c in path.chars() {
        match c {
            '<' => {
                if depth == 0 && out.ends_with("::") {
                    out.truncate(out.len() - 2);
                }
                depth += 1;
            }
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}


impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.routine)?;
        match (&self.file, self.line, self.native) {
            (_, _, true) => write!(f, " (native)"),
            (Some(file), Some(line), _) => write!(f, " ({file}:{line})"),
            (Some(file), None, _) => write!(f, " ({file})"),
            (None, Some(line), _) => write!(f, " (line {line})"),
            (None, None, false) => Ok(()),
        }
    }
}

/// A captured call path, innermost frame first.
///
/// `frames()[0]` is the point of computation; stack-depth walks start at
/// the frame after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTrace {
    frames: Vec<CallSite>,
}

impl CallTrace {
    /// A trace whose innermost frame is `point`.
    #[must_use]
    pub fn starting_at(point: CallSite) -> Self {
        Self {
            frames: vec![point],
        }
    }

    /// Appends the next frame outward.
    #[must_use]
    pub fn then(mut self, caller: CallSite) -> Self {
        self.frames.push(caller);
        self
    }

    /// Captures the physical call stack of the current thread.
    ///
    /// Frames up to and including this function are dropped, so frame 0
    /// is the caller. Returns an empty trace when the platform cannot
    /// capture or symbolize a backtrace.
    #[inline(never)]
    #[must_use]
    pub fn capture() -> Self {
        let backtrace = Backtrace::force_capture();
        if backtrace.status() != BacktraceStatus::Captured {
            return Self::default();
        }
        let mut trace = Self::parse_backtrace(&backtrace.to_string());
        if let Some(point) = trace.frames.iter().position(CallSite::is_capture_point) {
            trace.frames.drain(..=point);
        }
        trace
    }

    /// Parses the `Display` rendering of a [`Backtrace`].
    ///
    /// Every symbol line becomes a frame, inlined ones included; an
    /// `at file:line:col` line fills in the position of the frame above it.
    fn parse_backtrace(text: &str) -> Self {
        let mut trace = Self::default();
        for line in text.lines() {
            let line = line.trim_start();
            if line.is_empty() {
                continue;
            }
            if let Some(location) = line.strip_prefix("at ") {
                if let Some(site) = trace.frames.last_mut() {
                    let mut parts = location.rsplitn(3, ':');
                    let (col, row, file) = (parts.next(), parts.next(), parts.next());
                    match (file, row.and_then(|r| r.parse().ok()), col) {
                        (Some(file), Some(row), Some(_)) => {
                            site.file = Some(file.to_string());
                            site.line = Some(row);
                        }
                        _ => site.file = Some(location.to_string()),
                    }
                }
                continue;
            }
            let symbol = match line.split_once(": ") {
                Some((index, name)) if index.chars().all(|c| c.is_ascii_digit()) => name,
                _ => line,
            };
            trace.frames.push(CallSite::from_symbol(symbol.trim()));
        }
        trace
    }

    /// Appends the next frame outward.
    pub fn push(&mut self, caller: CallSite) {
        self.frames.push(caller);
    }

    /// Returns the frames, innermost first.
    #[must_use]
    pub fn frames(&self) -> &[CallSite] {
        &self.frames
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if there are no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<CallSite> for CallTrace {
    fn from_iter<I: IntoIterator<Item = CallSite>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}
