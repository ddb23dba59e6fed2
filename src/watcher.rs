//! The watcher facade: configuration, lifecycle, stats access, reporting.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::alarm::{AlarmBackend, ItimerAlarm};
use crate::error::WatchError;
use crate::observers::HangEvent;
use crate::recorder::HangRecorder;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::site::SiteCell;
use crate::stats::HangStats;

/// Watcher timing configuration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// How often the host loop runs the canceller step.
    pub cancel_interval: Duration,
    /// How long the step may fail to run before the loop counts as hung.
    /// Should exceed `cancel_interval`, otherwise false positives are
    /// likely; the watcher recommends but does not enforce this.
    pub max_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            cancel_interval: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        }
    }
}

/// Watches a cooperatively scheduled event loop for failure to yield.
///
/// Construction installs the alarm mechanism; `attach` supplies the host
/// loop's scheduling handle; `start` arms the watchdog. Everything else is
/// observation: `stats`, `reset_stats`, `print_report`, observers.
pub struct HangWatcher {
    config: WatcherConfig,
    recorder: Arc<HangRecorder>,
    alarm: Arc<dyn AlarmBackend>,
    scheduler: Option<Box<dyn Scheduler>>,
    task: Option<Box<dyn ScheduledTask>>,
}

impl HangWatcher {
    /// Create a watcher backed by the real interval timer. Fails if the
    /// SIGALRM handler cannot be installed, since the watchdog cannot
    /// function without it.
    pub fn new(config: WatcherConfig) -> Result<Self, WatchError> {
        let alarm: Arc<dyn AlarmBackend> = Arc::new(ItimerAlarm::install()?);
        Ok(Self::with_alarm(config, alarm))
    }

    /// Create a watcher with a custom alarm backend. Used by tests to drive
    /// expiry off a simulated clock.
    pub fn with_alarm(config: WatcherConfig, alarm: Arc<dyn AlarmBackend>) -> Self {
        let recorder = Arc::new(HangRecorder::new(alarm.clone(), config.max_delay));
        Self {
            config,
            recorder,
            alarm,
            scheduler: None,
            task: None,
        }
    }

    /// Supply the host loop's scheduling handle. Required before `start`.
    pub fn attach(&mut self, scheduler: Box<dyn Scheduler>) {
        self.scheduler = Some(scheduler);
    }

    /// Register a hang observer. Observers are notified in registration
    /// order on every detected hang, and can only be added before the first
    /// `start` — and after `stop` only once the scheduler has released the
    /// cancelled step closure, since a retained step still shares the
    /// recorder state.
    ///
    /// With the real alarm backend, observers run in signal-handler context
    /// and must restrict themselves to async-signal-safe operations.
    pub fn add_observer<F>(&mut self, observer: F) -> Result<(), WatchError>
    where
        F: Fn(&HangEvent) + Send + Sync + 'static,
    {
        let recorder = Arc::get_mut(&mut self.recorder).ok_or(WatchError::AlreadyStarted)?;
        recorder.observers.add(Box::new(observer));
        Ok(())
    }

    /// The cell the host loop publishes its currently executing call site
    /// into. Hangs are attributed to whatever site is published when the
    /// alarm fires.
    pub fn site_cell(&self) -> Arc<SiteCell> {
        Arc::clone(&self.recorder.site)
    }

    /// Arm the watchdog: bind the alarm to the recorder, arm it for
    /// `max_delay`, and schedule the canceller step every `cancel_interval`.
    ///
    /// Fails with [`WatchError::NotConfigured`] if no scheduler was
    /// attached, [`WatchError::AlreadyStarted`] if already running, and
    /// [`WatchError::AlarmInUse`] if another watcher holds the alarm slot.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.task.is_some() {
            return Err(WatchError::AlreadyStarted);
        }
        let scheduler = self.scheduler.as_mut().ok_or(WatchError::NotConfigured)?;

        self.alarm.bind(Arc::clone(&self.recorder))?;
        if let Err(err) = self.alarm.arm(self.config.max_delay) {
            self.alarm.unbind();
            return Err(err);
        }

        let recorder = Arc::clone(&self.recorder);
        let task = scheduler.schedule_repeating(
            self.config.cancel_interval,
            Box::new(move || recorder.cancel_step()),
        );
        self.task = Some(task);
        info!(
            cancel_interval = ?self.config.cancel_interval,
            max_delay = ?self.config.max_delay,
            "hang watcher started"
        );
        Ok(())
    }

    /// Disarm and cease periodic scheduling. Safe to call when stopped.
    ///
    /// Only touches the alarm when this watcher actually started: the alarm
    /// slot is process-wide, and a watcher whose `start` failed must not
    /// disarm or unbind a watcher that holds it.
    pub fn stop(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        task.cancel();
        self.alarm.disarm();
        self.alarm.unbind();
        info!("hang watcher stopped");
    }

    /// Whether `start` has been called without a matching `stop`.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Point-in-time snapshot of the hang counters.
    pub fn stats(&self) -> HangStats {
        self.recorder.stats.snapshot()
    }

    /// Zero the historical counters. A live hang flag is deliberately left
    /// set; only the canceller step clears it.
    pub fn reset_stats(&self) {
        self.recorder.stats.reset();
        debug!("hang stats reset");
    }

    /// Number of observer notifications that panicked so far.
    pub fn observer_failures(&self) -> u64 {
        self.recorder.observers.failure_count()
    }

    /// Write the hang report to `w`: the total line, and if any hangs were
    /// recorded, the offending sites sorted by descending occurrence count.
    /// With `reset`, clears the counters after writing.
    pub fn write_report<W: Write>(&self, w: &mut W, reset: bool) -> io::Result<()> {
        let stats = self.stats();
        writeln!(w, "Event loop was hung {} times", stats.hang_count)?;

        if stats.hang_count > 0 {
            let mut sites: Vec<_> = stats.per_site.into_iter().collect();
            sites.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.function.cmp(b.0.function)));

            writeln!(w, "Offending call sites:")?;
            for (site, count) in sites {
                writeln!(w, "{} {} in {}:{}", count, site.function, site.file, site.line)?;
            }
        }

        if reset {
            self.reset_stats();
        }
        Ok(())
    }

    /// Print the hang report to stdout. See [`write_report`](Self::write_report).
    pub fn print_report(&self, reset: bool) {
        let mut stdout = io::stdout().lock();
        let _ = self.write_report(&mut stdout, reset);
    }
}

impl Drop for HangWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
