//! Observer callbacks invoked when a hang is detected.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::site::CallSite;

/// Minimal immutable projection of a detected hang, handed to each observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HangEvent {
    /// Where the loop was interrupted.
    pub site: CallSite,
    /// Lifetime hang total including this event.
    pub hang_count: u64,
}

pub(crate) type Observer = Box<dyn Fn(&HangEvent) + Send + Sync>;

/// Ordered list of hang observers. Registration order is notification order.
///
/// Entries are added only before the watcher starts (the watcher enforces
/// this), so `notify_all` can iterate without any lock even though it runs
/// in the signal-handler context.
pub(crate) struct ObserverRegistry {
    observers: Vec<Observer>,
    failures: AtomicU64,
}

impl ObserverRegistry {
    pub(crate) fn new() -> Self {
        Self {
            observers: Vec::new(),
            failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn add(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    /// Invoke every observer in registration order. A panicking observer is
    /// contained: the panic is caught, counted, noted on stderr with a raw
    /// `write(2)` (the only logging that is signal-safe here), and the
    /// remaining observers still run.
    pub(crate) fn notify_all(&self, event: &HangEvent) {
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                self.failures.fetch_add(1, Ordering::SeqCst);
                let msg = b"hangwatch: observer panicked during hang notification\n";
                unsafe {
                    libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
                }
            }
        }
    }

    /// Number of observer invocations that panicked since construction.
    pub(crate) fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}
