//! Process-wide registry of per-time-base client state. Grounded on the
//! teacher's `session.rs` (`Arc<DashMap<K, Context>>` keyed registry with
//! per-context internal locking), generalized from a session-id-keyed
//! PTY context table to a `timeBaseIndex`-keyed clock state table, and
//! on `original_source/clkmgr/client/timebase_state.hpp`'s `TimeBaseState`
//! (the fields this record caches) minus its singleton map — the registry
//! here is an owned value the facade constructs once, not a Meyers
//! singleton.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use clkmgr_core::timebase::TimeBaseSnapshot;

use crate::subscription::{evaluate, Counters, EvaluatedState, EventCounts, Subscription};

/// The read-only aggregate a `statusWait` call copies into the caller's
/// `out_data`, recovered from `original_source`'s
/// `ClockSyncBaseHandler::updateAll` (a single "read everything the
/// client cares about" snapshot, assembled in one pass under the
/// record's mutex instead of field-by-field).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSnapshot {
    pub raw: TimeBaseSnapshot,
    pub offset_in_range: bool,
    pub synced_with_gm: bool,
    pub as_capable: bool,
    pub composite_event: bool,
    pub gm_changed: bool,
    pub sys_offset_in_range: bool,
    pub counts: EventCounts,
    pub last_notification_ns: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    EventDetected,
    NoEventDetected,
}

/// `timeout=0` polls once without blocking; `timeout<0` waits forever;
/// otherwise `timeout` is whole seconds (spec.md section 4.8).
#[derive(Debug, Clone, Copy)]
pub enum WaitTimeout {
    Immediate,
    Bounded(Duration),
    Forever,
}

impl WaitTimeout {
    pub fn from_seconds(timeout: i64) -> Self {
        match timeout.cmp(&0) {
            std::cmp::Ordering::Equal => WaitTimeout::Immediate,
            std::cmp::Ordering::Less => WaitTimeout::Forever,
            std::cmp::Ordering::Greater => WaitTimeout::Bounded(Duration::from_secs(timeout as u64)),
        }
    }
}

/// How long a "wait forever" statusWait call sleeps between predicate
/// re-checks. Not part of the wire protocol; bounds how promptly a
/// forever-wait notices shutdown/spurious-wakeup handling.
const FOREVER_POLL_INTERVAL: Duration = Duration::from_millis(200);

struct RecordInner {
    subscription: Option<Subscription>,
    state: EvaluatedState,
    prev_gm: Option<[u8; 8]>,
    raw: TimeBaseSnapshot,
    /// Set once the first notification since the last `set_subscription`
    /// has been folded in. The counter is defined over "differs from its
    /// value at the previous notification" (spec.md section 4.8), and
    /// there is no previous notification yet at that first one, so it is
    /// never counted regardless of what the caller passes for
    /// `count_transitions`.
    baseline_established: bool,
}

/// Per-`timeBaseIndex` cache: PTP/sys event state plus atomic
/// transition counters, a `subscribed` flag, and the mutex/condvar pair
/// `statusWait` parks on (spec.md section 4.7). Only the listener
/// thread mutates raw values and booleans; `statusWait` callers take
/// the mutex only to snapshot them, reading the counters lock-free.
pub struct TimeBaseRecord {
    subscribed: AtomicBool,
    last_notification_ns: AtomicI64,
    inner: Mutex<RecordInner>,
    cv: Condvar,
    counters: Counters,
}

impl TimeBaseRecord {
    fn new() -> Self {
        TimeBaseRecord {
            subscribed: AtomicBool::new(false),
            last_notification_ns: AtomicI64::new(0),
            inner: Mutex::new(RecordInner {
                subscription: None,
                state: EvaluatedState::default(),
                prev_gm: None,
                raw: TimeBaseSnapshot::default(),
                baseline_established: false,
            }),
            cv: Condvar::new(),
            counters: Counters::default(),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    /// Replaces the subscription and resets all counters. Idempotent:
    /// calling this twice with an equal subscription leaves the
    /// effective subscription unchanged (spec.md section 8's
    /// "idempotent subscribe" law), though each call still resets
    /// counters exactly once, as the law specifies.
    pub fn set_subscription(&self, subscription: Subscription) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscription = Some(subscription);
        inner.state = EvaluatedState::default();
        inner.prev_gm = None;
        inner.baseline_established = false;
        drop(inner);
        self.counters.reset();
        self.subscribed.store(true, Ordering::Release);
    }

    pub fn clear_subscription(&self) {
        self.subscribed.store(false, Ordering::Release);
    }

    /// Folds a received snapshot into the cached state. `count_transitions`
    /// is false for the baseline snapshot returned by a `Subscribe`
    /// reply (spec.md section 4.8: "folded in as if it were a Notify
    /// but without incrementing any counters"), but the first
    /// notification folded in after any `set_subscription` is a
    /// baseline too, whether it arrives this way or as a real `Notify`
    /// — `baseline_established` makes that true regardless of what the
    /// caller passes.
    pub fn apply_notification(&self, snapshot: TimeBaseSnapshot, now_ns: i64, count_transitions: bool) {
        let mut inner = self.inner.lock().unwrap();
        let Some(subscription) = inner.subscription.clone() else {
            return;
        };
        let prev_gm = inner.prev_gm;
        let counts_this_time = count_transitions && inner.baseline_established;
        let next = evaluate(
            &subscription,
            &inner.state,
            prev_gm,
            &snapshot,
            &self.counters,
            counts_this_time,
        );
        inner.state = next;
        inner.baseline_established = true;
        if let Some(ptp) = snapshot.ptp {
            inner.prev_gm = Some(ptp.gm_identity);
        }
        inner.raw = snapshot;
        drop(inner);
        self.last_notification_ns.store(now_ns, Ordering::Release);
        self.cv.notify_all();
    }

    /// Reads the cached raw snapshot without draining or touching the
    /// transition counters — `getTime` must never consume a pending
    /// `statusWait` event (spec.md section 4.8's "no transition is
    /// ever lost" guarantee).
    pub fn raw_snapshot(&self) -> TimeBaseSnapshot {
        self.inner.lock().unwrap().raw
    }

    pub fn last_notification_ns(&self) -> i64 {
        self.last_notification_ns.load(Ordering::Acquire)
    }

    fn snapshot_status(&self, counts: EventCounts) -> StatusSnapshot {
        let inner = self.inner.lock().unwrap();
        StatusSnapshot {
            raw: inner.raw,
            offset_in_range: inner.state.offset_in_range,
            synced_with_gm: inner.state.synced_with_gm,
            as_capable: inner.state.as_capable,
            composite_event: inner.state.composite_event,
            gm_changed: inner.state.gm_changed,
            sys_offset_in_range: inner.state.sys_offset_in_range,
            counts,
            last_notification_ns: self.last_notification_ns(),
        }
    }

    /// The blocking core of `statusWait`, once the caller has already
    /// validated the argument and checked proxy liveness: drains the
    /// counters if any are nonzero, otherwise parks on the condition
    /// variable up to the deadline, always returning a populated
    /// snapshot even on timeout (spec.md section 7).
    pub fn wait(&self, timeout: WaitTimeout) -> (WaitResult, StatusSnapshot) {
        let deadline = match timeout {
            WaitTimeout::Bounded(d) => Some(Instant::now() + d),
            _ => None,
        };
        loop {
            if self.counters.total() > 0 {
                let counts = self.counters.drain();
                return (WaitResult::EventDetected, self.snapshot_status(counts));
            }
            match timeout {
                WaitTimeout::Immediate => {
                    return (WaitResult::NoEventDetected, self.snapshot_status(EventCounts::default()));
                }
                WaitTimeout::Bounded(_) => {
                    let deadline = deadline.unwrap();
                    let now = Instant::now();
                    if now >= deadline {
                        return (WaitResult::NoEventDetected, self.snapshot_status(EventCounts::default()));
                    }
                    let guard = self.inner.lock().unwrap();
                    let _ = self.cv.wait_timeout(guard, deadline - now).unwrap();
                }
                WaitTimeout::Forever => {
                    let guard = self.inner.lock().unwrap();
                    let _ = self.cv.wait_timeout(guard, FOREVER_POLL_INTERVAL).unwrap();
                }
            }
        }
    }
}

/// Process-wide, `timeBaseIndex`-keyed registry. Owned by the
/// `ClockManagerClient` that constructs it — not a global singleton,
/// per spec.md section 9's first REDESIGN FLAG.
#[derive(Default)]
pub struct TimeBaseRegistry {
    records: DashMap<u32, Arc<TimeBaseRecord>>,
}

impl TimeBaseRegistry {
    pub fn new() -> Self {
        TimeBaseRegistry {
            records: DashMap::new(),
        }
    }

    pub fn ensure(&self, time_base_index: u32) -> Arc<TimeBaseRecord> {
        Arc::clone(
            &self
                .records
                .entry(time_base_index)
                .or_insert_with(|| Arc::new(TimeBaseRecord::new())),
        )
    }

    pub fn get(&self, time_base_index: u32) -> Option<Arc<TimeBaseRecord>> {
        self.records.get(&time_base_index).map(|r| Arc::clone(&r))
    }

    pub fn most_recent_notification_ns(&self) -> i64 {
        self.records
            .iter()
            .map(|r| r.last_notification_ns())
            .max()
            .unwrap_or(0)
    }
}
