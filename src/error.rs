//! Error types for the hang watcher.

use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced by the watcher's public API.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The duration passed to `arm` was zero, or too small to survive the
    /// conversion to whole microseconds. The pending alarm, if any, is left
    /// untouched.
    #[error("invalid timer duration: {0:?}")]
    InvalidTimerArgument(Duration),

    /// `start()` was called before a host-loop scheduler was attached.
    #[error("no scheduler attached; call attach() before start()")]
    NotConfigured,

    /// The watcher is already running, or its shared state is already
    /// published (observers can only be added before `start()`).
    #[error("watcher already started")]
    AlreadyStarted,

    /// Another recorder is already bound to the process's single
    /// ITIMER_REAL slot.
    #[error("alarm slot already bound by another watcher")]
    AlarmInUse,

    /// Installing the SIGALRM handler failed. The watcher cannot function
    /// without it.
    #[error("failed to install SIGALRM handler: {0}")]
    HandlerInstall(#[source] Errno),
}
