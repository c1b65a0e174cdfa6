use std::sync::atomic::{AtomicI64, Ordering};

/// Opt-in high-water mark of modification times, shared by the descriptor-backed accessors.
///
/// Updates are a load followed by a store, not a compare-and-swap: an accessor with tracking
/// enabled must be driven from one thread. Sharing such an accessor is a caller error that is
/// not detected here.
#[derive(Debug, Default)]
pub(crate) struct MtimeTracker {
    enabled: bool,
    mtime: AtomicI64,
}

impl MtimeTracker {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            mtime: AtomicI64::new(0),
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn update(&self, mtime: i64) {
        if !self.enabled {
            return;
        }
        let current = self.mtime.load(Ordering::Relaxed);
        if mtime > current {
            self.mtime.store(mtime, Ordering::Relaxed);
        }
    }

    pub(crate) fn get(&self) -> Option<i64> {
        self.enabled.then(|| self.mtime.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reports_nothing() {
        let tracker = MtimeTracker::new(false);
        tracker.update(42);
        assert_eq!(tracker.get(), None);
    }

    #[test]
    fn test_high_water_mark() {
        let tracker = MtimeTracker::new(true);
        assert_eq!(tracker.get(), Some(0));
        tracker.update(10);
        tracker.update(5);
        assert_eq!(tracker.get(), Some(10));
        tracker.update(11);
        assert_eq!(tracker.get(), Some(11));
    }
}
