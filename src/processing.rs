//! # Per-task-family mutual exclusion.
//!
//! Backup and render cycles must never overlap themselves; each coordinator
//! owns a `Processing` flag that is checked-and-set like a non-reentrant
//! lock. [`ProcessingGuard`] pairs the acquisition with an RAII release so
//! the flag is cleared on **every** exit path — early return, `?`
//! propagation or panic — and a failed invocation can never wedge the
//! coordinator against all future ones.

use std::sync::atomic::{AtomicBool, Ordering};

/// RAII guard over a coordinator's `Processing` flag.
///
/// Acquired with a compare-and-swap; dropped (and thus released) when the
/// invocation leaves scope, whatever the reason.
#[must_use = "dropping the guard immediately releases the Processing flag"]
pub struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    /// Attempts to set the flag; returns `None` if another invocation is
    /// already processing.
    pub fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
