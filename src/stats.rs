//! Hang counters and the live hang flag.
//!
//! [`StatsStore`] is written from two paths that must never block each
//! other: the periodic canceller step running inside the host loop, and the
//! SIGALRM handler that may interrupt that very step. Every field is a
//! primitive atomic and the per-site tallies live in a fixed-capacity,
//! preallocated intern table, so no path ever takes a lock or allocates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use crate::site::CallSite;

/// Slots in the per-site intern table. A watched loop has a small, bounded
/// set of callback sites; overflow drops the per-site tally but never the
/// total hang count.
const SITE_TABLE_CAPACITY: usize = 32;

struct SiteSlot {
    site: AtomicPtr<CallSite>,
    count: AtomicU64,
}

impl SiteSlot {
    fn new() -> Self {
        Self {
            site: AtomicPtr::new(std::ptr::null_mut()),
            count: AtomicU64::new(0),
        }
    }
}

/// Immutable view of the watcher's counters at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HangStats {
    /// Lifetime total of recorded hangs. Monotonic between resets.
    pub hang_count: u64,
    /// Occurrence count per interrupted call site.
    pub per_site: HashMap<CallSite, u64>,
    /// Whether the loop was hung as of the last alarm/canceller activity.
    pub currently_hung: bool,
    /// The site last seen hung; present iff `currently_hung`.
    pub current_offender: Option<CallSite>,
}

/// Lock-free counter store shared between the canceller step and the signal
/// handler.
pub struct StatsStore {
    hang_count: AtomicU64,
    currently_hung: AtomicBool,
    current_offender: AtomicPtr<CallSite>,
    sites: [SiteSlot; SITE_TABLE_CAPACITY],
}

impl StatsStore {
    pub(crate) fn new() -> Self {
        Self {
            hang_count: AtomicU64::new(0),
            currently_hung: AtomicBool::new(false),
            current_offender: AtomicPtr::new(std::ptr::null_mut()),
            sites: std::array::from_fn(|_| SiteSlot::new()),
        }
    }

    /// Record one hang attributed to `site`. Called only from the alarm
    /// entry point; every operation here is async-signal-safe.
    ///
    /// Returns the post-increment hang count.
    pub(crate) fn record_hang(&self, site: &'static CallSite) -> u64 {
        let total = self.hang_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.current_offender
            .store(site as *const CallSite as *mut CallSite, Ordering::SeqCst);
        self.currently_hung.store(true, Ordering::SeqCst);
        self.bump_site(site);
        total
    }

    /// Clear the live-hang status. Called by the canceller step each time it
    /// runs; this is the only path that flips the flag back to false.
    pub(crate) fn clear_current(&self) {
        self.currently_hung.store(false, Ordering::SeqCst);
        self.current_offender
            .store(std::ptr::null_mut(), Ordering::SeqCst);
    }

    /// Intern `site` into the slot table and increment its count. Linear
    /// probe with CAS claim; structural equality on the triple, so duplicate
    /// statics for the same location share a slot's count at snapshot time.
    fn bump_site(&self, site: &'static CallSite) {
        let new = site as *const CallSite as *mut CallSite;
        for slot in &self.sites {
            let key = slot.site.load(Ordering::Acquire);
            if key.is_null() {
                match slot.site.compare_exchange(
                    std::ptr::null_mut(),
                    new,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        slot.count.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                    Err(raced) => {
                        if unsafe { &*raced } == site {
                            slot.count.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                        continue;
                    }
                }
            }
            if unsafe { &*key } == site {
                slot.count.fetch_add(1, Ordering::SeqCst);
                return;
            }
        }
        // Table full: the hang is still in hang_count, only the per-site
        // attribution is dropped.
    }

    /// Point-in-time copy of all counters. Does not mutate state.
    pub(crate) fn snapshot(&self) -> HangStats {
        let mut per_site = HashMap::new();
        for slot in &self.sites {
            let key = slot.site.load(Ordering::Acquire);
            if let Some(site) = unsafe { (key as *const CallSite).as_ref() } {
                let count = slot.count.load(Ordering::SeqCst);
                if count > 0 {
                    *per_site.entry(*site).or_insert(0) += count;
                }
            }
        }
        let offender = self.current_offender.load(Ordering::SeqCst);
        HangStats {
            hang_count: self.hang_count.load(Ordering::SeqCst),
            per_site,
            currently_hung: self.currently_hung.load(Ordering::SeqCst),
            current_offender: unsafe { (offender as *const CallSite).as_ref() }.copied(),
        }
    }

    /// Zero the historical counters. Leaves `currently_hung` and
    /// `current_offender` alone: those reflect live status, not history, and
    /// only the canceller step may clear them.
    pub(crate) fn reset(&self) {
        self.hang_count.store(0, Ordering::SeqCst);
        for slot in &self.sites {
            slot.count.store(0, Ordering::SeqCst);
            slot.site.store(std::ptr::null_mut(), Ordering::SeqCst);
        }
    }
}
