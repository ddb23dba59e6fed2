//! Call site identification.
//!
//! A hang is attributed to whatever callback the host loop was running when
//! the alarm interrupted it. The loop publishes the site of the currently
//! executing callback into a [`SiteCell`] before invoking it; the signal
//! handler reads the cell with a single atomic load. Sites are `'static`
//! (minted once per call site by the [`callsite!`] macro) so capturing one
//! from the handler is a pointer copy, never an allocation.

use std::fmt;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Identifies where execution was interrupted: function name, source file,
/// and defining line. Equality is structural — the same triple is the same
/// site, regardless of which static it was minted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub function: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}:{}", self.function, self.file, self.line)
    }
}

/// Fallback used when the alarm fires outside any tracked callback, so the
/// per-site tallies still account for every recorded hang.
pub(crate) static UNKNOWN_SITE: CallSite = CallSite {
    function: "<unknown>",
    file: "<unknown>",
    line: 0,
};

/// Mint a `&'static CallSite` for the enclosing code location.
///
/// # Example
/// ```
/// let site = hangwatch::callsite!("poll_connections");
/// assert_eq!(site.function, "poll_connections");
/// ```
#[macro_export]
macro_rules! callsite {
    ($function:expr) => {{
        static SITE: $crate::CallSite = $crate::CallSite {
            function: $function,
            file: file!(),
            line: line!(),
        };
        &SITE
    }};
}

/// Shared cell holding the call site of the callback the host loop is
/// currently executing, or nothing while the loop is between callbacks.
///
/// Written only by the loop thread (`enter`/`exit`), read from the signal
/// handler (`current_ref`). Both sides are single atomic pointer operations,
/// so the cell is safe to touch from the interrupted-notification context.
pub struct SiteCell {
    current: AtomicPtr<CallSite>,
}

impl SiteCell {
    pub fn new() -> Self {
        Self {
            current: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Publish `site` as the currently executing callback.
    pub fn enter(&self, site: &'static CallSite) {
        self.current
            .store(site as *const CallSite as *mut CallSite, Ordering::Release);
    }

    /// Clear the cell once the callback returns.
    pub fn exit(&self) {
        self.current.store(std::ptr::null_mut(), Ordering::Release);
    }

    /// The currently published site, by value.
    pub fn current(&self) -> Option<CallSite> {
        self.current_ref().copied()
    }

    pub(crate) fn current_ref(&self) -> Option<&'static CallSite> {
        let ptr = self.current.load(Ordering::Acquire);
        // Published pointers always come from `&'static CallSite`.
        unsafe { (ptr as *const CallSite).as_ref() }
    }
}

impl Default for SiteCell {
    fn default() -> Self {
        Self::new()
    }
}
