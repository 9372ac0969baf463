//! Try-acquire boolean flag with scoped release.

use std::sync::atomic::{AtomicBool, Ordering};

/// A boolean "busy" flag that is acquired without waiting.
///
/// Acquisition fails immediately when the flag is already held. The returned
/// guard clears the flag when dropped, on every exit path including panics
/// and early returns.
#[derive(Debug, Default)]
pub struct BusyFlag {
    held: AtomicBool,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: self })
    }
}

/// Releases its [`BusyFlag`] on drop.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a BusyFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.held.store(false, Ordering::Release);
    }
}
