//! The hang recorder: what runs when the alarm was not disarmed in time.
//!
//! [`alarm_fired`](HangRecorder::alarm_fired) is the asynchronous entry
//! point, reached from the SIGALRM handler. It may interrupt the host loop
//! anywhere, including inside this crate's own code, so it takes no locks
//! and performs no allocation: an atomic read of the current call site,
//! atomic counter updates, observer fan-out over a pre-built list, and a
//! re-arm. [`cancel_step`](HangRecorder::cancel_step) is the other half,
//! run by the host loop on its normal schedule.

use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use crate::alarm::AlarmBackend;
use crate::observers::{HangEvent, ObserverRegistry};
use crate::site::{SiteCell, UNKNOWN_SITE};
use crate::stats::StatsStore;

/// Shared recorder state: everything both the signal path and the loop path
/// need to reach.
pub struct HangRecorder {
    pub(crate) stats: StatsStore,
    pub(crate) site: Arc<SiteCell>,
    pub(crate) observers: ObserverRegistry,
    alarm: Arc<dyn AlarmBackend>,
    max_delay: Duration,
}

impl HangRecorder {
    pub(crate) fn new(alarm: Arc<dyn AlarmBackend>, max_delay: Duration) -> Self {
        Self {
            stats: StatsStore::new(),
            site: Arc::new(SiteCell::new()),
            observers: ObserverRegistry::new(),
            alarm,
            max_delay,
        }
    }

    /// Alarm expiry entry point: `max_delay` elapsed without the canceller
    /// step running. Records the hang, notifies observers, and re-arms so a
    /// hang spanning several periods is recorded once per period.
    ///
    /// Runs in signal-handler context when driven by
    /// [`crate::alarm::ItimerAlarm`]: only async-signal-safe operations
    /// here, and observers must honor the same constraint.
    pub fn alarm_fired(&self) {
        let site = self.site.current_ref().unwrap_or(&UNKNOWN_SITE);
        let hang_count = self.stats.record_hang(site);
        let event = HangEvent {
            site: *site,
            hang_count,
        };
        self.observers.notify_all(&event);
        if self.alarm.arm(self.max_delay).is_err() {
            // tracing is not signal-safe; a raw write is.
            let msg = b"hangwatch: failed to re-arm alarm after hang\n";
            unsafe {
                libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
            }
        }
    }

    /// The periodic canceller step, invoked by the host loop every
    /// `cancel_interval`: disarm the pending alarm, clear the live-hang
    /// status, re-arm for `max_delay`. This running at all is the loop's
    /// proof of life, and it is the only path that clears the hang flag.
    pub fn cancel_step(&self) {
        let was_pending = self.alarm.disarm();
        self.stats.clear_current();
        if let Err(err) = self.alarm.arm(self.max_delay) {
            warn!(error = %err, "failed to re-arm watchdog alarm");
        }
        trace!(was_pending, "watchdog canceller step");
    }
}
