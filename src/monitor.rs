//! Cooperative cancellation for long byte copies.
//!
//! A load session is synchronous and single-threaded, but initialized-region
//! creation can copy large images. `LoadMonitor` is a clonable flag a host
//! (typically a UI thread) can raise; the store's byte-copy primitive checks
//! it between chunks. The builder itself never polls the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation handle for one load session.
#[derive(Debug, Clone, Default)]
pub struct LoadMonitor {
    cancelled: Arc<AtomicBool>,
}

impl LoadMonitor {
    /// Create a fresh, un-cancelled monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the cancellation flag. Irrevocable for the session.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let monitor = LoadMonitor::new();
        let observer = monitor.clone();
        assert!(!observer.is_cancelled());
        monitor.cancel();
        assert!(observer.is_cancelled());
    }
}
