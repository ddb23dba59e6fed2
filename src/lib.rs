//! hangwatch: detect when a cooperatively scheduled event loop stops
//! yielding.
//!
//! A step scheduled on the host loop disarms and re-arms an OS interval
//! timer every `cancel_interval`. If the loop hangs, the step stops running,
//! the timer expires after `max_delay`, and the SIGALRM handler records
//! which call site was executing, updates counters, and notifies observers.
//! The alarm fires independently of the loop, which is the point: a hung
//! loop cannot report on itself.

pub mod alarm;
pub mod error;
pub mod observers;
pub mod recorder;
pub mod scheduler;
pub mod site;
pub mod stats;
pub mod watcher;

pub use alarm::{AlarmBackend, ItimerAlarm};
pub use error::WatchError;
pub use observers::HangEvent;
pub use recorder::HangRecorder;
pub use scheduler::{ScheduledTask, Scheduler};
pub use site::{CallSite, SiteCell};
pub use stats::HangStats;
pub use watcher::{HangWatcher, WatcherConfig};
