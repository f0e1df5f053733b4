//! Proxy liveness tracking (spec.md section 4.9). The cheap trivial
//! check — "was there a notification recently?" — lives here; the
//! active probe (send a zero-body `Connect`, wait up to the liveness
//! window) needs the facade's transport and connect machinery and
//! lives in `facade.rs`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const LIVENESS_WINDOW_MS: i64 = 50;

pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Tracks the wall-clock time of the most recent notification on any
/// time base.
pub struct LivenessTracker {
    last_notification_ns: AtomicI64,
}

impl LivenessTracker {
    pub fn new() -> Self {
        LivenessTracker {
            last_notification_ns: AtomicI64::new(0),
        }
    }

    pub fn record(&self, now_ns: i64) {
        self.last_notification_ns.store(now_ns, Ordering::Release);
    }

    /// Trivially alive if the last notification is within
    /// `LIVENESS_WINDOW_MS` of `now_ns`; otherwise the caller must
    /// actively probe.
    pub fn is_recent(&self, now_ns: i64) -> bool {
        let last = self.last_notification_ns.load(Ordering::Acquire);
        if last == 0 {
            return false;
        }
        (now_ns - last) <= LIVENESS_WINDOW_MS * 1_000_000
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_notification_is_recent() {
        let tracker = LivenessTracker::new();
        let now = now_ns();
        tracker.record(now);
        assert!(tracker.is_recent(now + 10_000_000)); // +10ms
    }

    #[test]
    fn stale_notification_is_not_recent() {
        let tracker = LivenessTracker::new();
        let now = now_ns();
        tracker.record(now);
        assert!(!tracker.is_recent(now + 200_000_000)); // +200ms
    }

    #[test]
    fn no_notification_yet_is_not_recent() {
        let tracker = LivenessTracker::new();
        assert!(!tracker.is_recent(now_ns()));
    }
}
