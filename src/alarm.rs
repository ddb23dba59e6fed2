//! Interval-timer alarm backends.
//!
//! The production backend wraps ITIMER_REAL + SIGALRM: `arm` schedules a
//! one-shot expiry, `disarm` cancels it, and expiry routes through the
//! process-wide SIGALRM handler into the bound [`HangRecorder`]. The
//! [`AlarmBackend`] trait is the seam that lets tests swap in an alarm
//! driven off a simulated clock instead of the real one.

use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::WatchError;
use crate::recorder::HangRecorder;

/// One-shot alarm with a single slot per process.
///
/// `arm` and `disarm` must be non-blocking and callable from the
/// interrupted-notification context itself (the recorder re-arms from inside
/// the handler).
pub trait AlarmBackend: Send + Sync {
    /// Schedule one expiry after `delay`, superseding any pending expiry.
    /// Fails with [`WatchError::InvalidTimerArgument`] if `delay` is zero or
    /// truncates to zero microseconds; the pending alarm is left untouched.
    fn arm(&self, delay: Duration) -> Result<(), WatchError>;

    /// Cancel the pending expiry, if any. Returns whether one was pending.
    /// Idempotent.
    fn disarm(&self) -> bool;

    /// Route future expiries to `recorder`. At most one recorder may be
    /// bound at a time; a second bind fails with [`WatchError::AlarmInUse`].
    fn bind(&self, recorder: Arc<HangRecorder>) -> Result<(), WatchError>;

    /// Detach the bound recorder. Callers must `disarm` first so no expiry
    /// is in flight. Idempotent.
    fn unbind(&self);
}

// The kernel gives the process exactly one ITIMER_REAL slot, so expiry
// dispatch goes through exactly one recorder pointer. The handler no-ops
// while nothing is bound.
static BOUND_RECORDER: AtomicPtr<HangRecorder> = AtomicPtr::new(std::ptr::null_mut());

extern "C" fn on_sigalrm(_signo: libc::c_int) {
    let ptr = BOUND_RECORDER.load(Ordering::Acquire);
    if let Some(recorder) = unsafe { (ptr as *const HangRecorder).as_ref() } {
        recorder.alarm_fired();
    }
}

/// SIGALRM-backed alarm. [`install`](ItimerAlarm::install) registers the
/// signal handler; the watcher cannot function if that fails.
pub struct ItimerAlarm {
    _private: (),
}

impl ItimerAlarm {
    /// Register the SIGALRM handler and return the backend.
    pub fn install() -> Result<Self, WatchError> {
        let action = SigAction::new(
            SigHandler::Handler(on_sigalrm),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        unsafe { sigaction(Signal::SIGALRM, &action) }.map_err(WatchError::HandlerInstall)?;
        Ok(Self { _private: () })
    }

    /// Write `value` to the real interval timer, returning the superseded
    /// value. `it_interval` stays zero: expiries are one-shot and the
    /// recorder re-arms explicitly. setitimer is async-signal-safe; EINVAL
    /// means the kernel rejected the timeval.
    fn set_timer(value: libc::timeval) -> Result<libc::itimerval, nix::errno::Errno> {
        let zero = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        let new = libc::itimerval {
            it_interval: zero,
            it_value: value,
        };
        let mut old = libc::itimerval {
            it_interval: zero,
            it_value: zero,
        };
        let rc = unsafe { libc::setitimer(libc::ITIMER_REAL, &new, &mut old) };
        if rc != 0 {
            return Err(nix::errno::Errno::last());
        }
        Ok(old)
    }
}

impl AlarmBackend for ItimerAlarm {
    fn arm(&self, delay: Duration) -> Result<(), WatchError> {
        let tv_sec = libc::time_t::try_from(delay.as_secs())
            .map_err(|_| WatchError::InvalidTimerArgument(delay))?;
        let tv_usec = delay.subsec_micros() as libc::suseconds_t;
        if tv_sec == 0 && tv_usec == 0 {
            return Err(WatchError::InvalidTimerArgument(delay));
        }
        Self::set_timer(libc::timeval { tv_sec, tv_usec })
            .map_err(|_| WatchError::InvalidTimerArgument(delay))?;
        Ok(())
    }

    fn disarm(&self) -> bool {
        // A zeroed timeval is always valid; treat a failed write as nothing
        // pending rather than a phantom cancellation.
        match Self::set_timer(libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        }) {
            Ok(old) => old.it_value.tv_sec != 0 || old.it_value.tv_usec != 0,
            Err(_) => false,
        }
    }

    fn bind(&self, recorder: Arc<HangRecorder>) -> Result<(), WatchError> {
        let ptr = Arc::into_raw(recorder) as *mut HangRecorder;
        match BOUND_RECORDER.compare_exchange(
            std::ptr::null_mut(),
            ptr,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(_) => {
                // Give the refcount back before reporting the conflict.
                unsafe { drop(Arc::from_raw(ptr)) };
                Err(WatchError::AlarmInUse)
            }
        }
    }

    fn unbind(&self) {
        let old = BOUND_RECORDER.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if !old.is_null() {
            unsafe { drop(Arc::from_raw(old as *const HangRecorder)) };
        }
    }
}
