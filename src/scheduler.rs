//! Host-loop collaborator traits.
//!
//! The watcher never runs a loop of its own; the host event loop supplies
//! "invoke this repeatedly" through [`Scheduler`]. Whatever drives the loop
//! (a reactor crate, a hand-rolled poll loop, a test harness with a manual
//! clock) adapts itself behind this trait.

use std::time::Duration;

/// Repeating-callback scheduling offered by the host event loop.
///
/// The step must run *on* the monitored loop: the whole detection scheme
/// rests on the step not running while the loop is hung.
pub trait Scheduler: Send {
    fn schedule_repeating(
        &mut self,
        interval: Duration,
        step: Box<dyn FnMut() + Send>,
    ) -> Box<dyn ScheduledTask>;
}

/// Handle to a scheduled repeating step.
pub trait ScheduledTask: Send {
    /// Stop future invocations. Idempotent.
    fn cancel(&mut self);
}
