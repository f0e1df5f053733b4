//! Per-subscription configuration and the pure evaluation step that
//! turns a raw notification into booleans, a composite event, and
//! counter deltas. Kept as a free function over explicit state rather
//! than a method reaching into another type's privates, per spec.md
//! section 9's REDESIGN FLAG against `ClockEventHandler`'s raw-pointer
//! friend-class field access in `original_source`.

use std::sync::atomic::{AtomicU32, Ordering};

use clkmgr_core::events::{CompositeMask, EventMask};
use clkmgr_core::timebase::{Threshold, TimeBaseSnapshot};

#[derive(Debug, Clone)]
pub struct Subscription {
    pub event_mask: EventMask,
    pub composite_mask: CompositeMask,
    pub gm_offset_threshold: Option<Threshold>,
    pub sys_offset_threshold: Option<Threshold>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluatedState {
    pub offset_in_range: bool,
    pub synced_with_gm: bool,
    pub as_capable: bool,
    pub composite_event: bool,
    pub gm_changed: bool,
    pub sys_offset_in_range: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub offset_in_range: u32,
    pub synced_with_gm: u32,
    pub as_capable: u32,
    pub gm_changed: u32,
    pub composite: u32,
    pub sys_offset_in_range: u32,
}

/// The six 32-bit saturating transition counters backing one time
/// base's record. Separately atomic from the record's mutex so
/// `statusWait`'s fast path can read them without blocking (spec.md
/// section 5).
#[derive(Default)]
pub struct Counters {
    pub offset_in_range: AtomicU32,
    pub synced_with_gm: AtomicU32,
    pub as_capable: AtomicU32,
    pub gm_changed: AtomicU32,
    pub composite: AtomicU32,
    pub sys_offset_in_range: AtomicU32,
}

impl Counters {
    fn bump(counter: &AtomicU32) {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_add(1))
            })
            .ok();
    }

    pub fn reset(&self) {
        self.offset_in_range.store(0, Ordering::SeqCst);
        self.synced_with_gm.store(0, Ordering::SeqCst);
        self.as_capable.store(0, Ordering::SeqCst);
        self.gm_changed.store(0, Ordering::SeqCst);
        self.composite.store(0, Ordering::SeqCst);
        self.sys_offset_in_range.store(0, Ordering::SeqCst);
    }

    pub fn total(&self) -> u64 {
        self.offset_in_range.load(Ordering::SeqCst) as u64
            + self.synced_with_gm.load(Ordering::SeqCst) as u64
            + self.as_capable.load(Ordering::SeqCst) as u64
            + self.gm_changed.load(Ordering::SeqCst) as u64
            + self.composite.load(Ordering::SeqCst) as u64
            + self.sys_offset_in_range.load(Ordering::SeqCst) as u64
    }

    /// Atomically reads and zeroes every counter, i.e. "subtract the
    /// observed counts" with the observation being everything
    /// accumulated up to this instant (spec.md section 4.8 step 4).
    pub fn drain(&self) -> EventCounts {
        EventCounts {
            offset_in_range: self.offset_in_range.swap(0, Ordering::SeqCst),
            synced_with_gm: self.synced_with_gm.swap(0, Ordering::SeqCst),
            as_capable: self.as_capable.swap(0, Ordering::SeqCst),
            gm_changed: self.gm_changed.swap(0, Ordering::SeqCst),
            composite: self.composite.swap(0, Ordering::SeqCst),
            sys_offset_in_range: self.sys_offset_in_range.swap(0, Ordering::SeqCst),
        }
    }
}

/// Applies one received notification: computes the new booleans,
/// detects transitions against `prev`, and bumps `counters` for every
/// event whose bit is set in the subscription's event mask (skipped
/// entirely when `count_transitions` is false, i.e. the baseline fold
/// of a subscribe reply's snapshot).
pub fn evaluate(
    subscription: &Subscription,
    prev: &EvaluatedState,
    prev_gm: Option<[u8; 8]>,
    snapshot: &TimeBaseSnapshot,
    counters: &Counters,
    count_transitions: bool,
) -> EvaluatedState {
    let mut next = *prev;

    if let Some(ptp) = &snapshot.ptp {
        next.as_capable = ptp.as_capable;
        next.synced_with_gm = ptp.synced_to_primary;
        next.offset_in_range = subscription
            .gm_offset_threshold
            .map(|t| t.in_range(ptp.offset_ns))
            .unwrap_or(false);
        next.gm_changed = match prev_gm {
            Some(old) => old != ptp.gm_identity,
            None => false,
        };
    } else {
        next.gm_changed = false;
    }

    if let Some(sys) = &snapshot.sys {
        next.sys_offset_in_range = subscription
            .sys_offset_threshold
            .map(|t| t.in_range(sys.offset_ns))
            .unwrap_or(false);
    }

    let mask = subscription.composite_mask;
    next.composite_event = !mask.is_empty()
        && (!mask.contains(EventMask::OFFSET_IN_RANGE) || next.offset_in_range)
        && (!mask.contains(EventMask::SYNCED_TO_GM) || next.synced_with_gm)
        && (!mask.contains(EventMask::AS_CAPABLE) || next.as_capable);

    if count_transitions {
        let event_mask = subscription.event_mask;
        if event_mask.contains(EventMask::OFFSET_IN_RANGE) && next.offset_in_range != prev.offset_in_range {
            Counters::bump(&counters.offset_in_range);
        }
        if event_mask.contains(EventMask::SYNCED_TO_GM) && next.synced_with_gm != prev.synced_with_gm {
            Counters::bump(&counters.synced_with_gm);
        }
        if event_mask.contains(EventMask::AS_CAPABLE) && next.as_capable != prev.as_capable {
            Counters::bump(&counters.as_capable);
        }
        if event_mask.contains(EventMask::GM_CHANGED) && next.gm_changed {
            Counters::bump(&counters.gm_changed);
        }
        if next.composite_event != prev.composite_event {
            Counters::bump(&counters.composite);
        }
        if next.sys_offset_in_range != prev.sys_offset_in_range {
            Counters::bump(&counters.sys_offset_in_range);
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use clkmgr_core::timebase::{PtpSnapshot, ThresholdKind};
    use proptest::prelude::*;

    fn ptp(offset: i64, as_capable: bool, synced: bool, gm: [u8; 8]) -> TimeBaseSnapshot {
        TimeBaseSnapshot {
            ptp: Some(PtpSnapshot {
                offset_ns: offset,
                gm_identity: gm,
                as_capable,
                synced_to_primary: synced,
                instance_id: 0,
                sync_interval_us: 1_000_000,
            }),
            sys: None,
        }
    }

    fn subscription(event_mask: EventMask, composite_mask: CompositeMask) -> Subscription {
        Subscription {
            event_mask,
            composite_mask,
            gm_offset_threshold: Some(Threshold::new(ThresholdKind::GmOffset, -1000, 1000).unwrap()),
            sys_offset_threshold: None,
        }
    }

    /// spec.md section 8 scenario 1: a baseline notification (offset
    /// 500, not counted — there is no "previous notification" yet),
    /// then offsets 1500, 900 against (-1000, 1000) transition out ->
    /// in, counter = 2.
    #[test]
    fn counter_monotonicity_scenario() {
        let sub = subscription(EventMask::OFFSET_IN_RANGE, CompositeMask::empty());
        let counters = Counters::default();
        let mut state = evaluate(&sub, &EvaluatedState::default(), None, &ptp(500, true, true, [0; 8]), &counters, false);

        for offset in [1500, 900] {
            state = evaluate(&sub, &state, None, &ptp(offset, true, true, [0; 8]), &counters, true);
        }
        assert_eq!(counters.offset_in_range.load(Ordering::SeqCst), 2);
        assert!(state.offset_in_range);
    }

    /// spec.md section 8 scenario 2: composite mask {AsCapable,
    /// SyncedToGm}; (true,false) -> (true,true) -> (true,false) should
    /// give composite transitions false -> true -> false, counter = 2.
    #[test]
    fn composite_event_scenario() {
        let sub = subscription(
            EventMask::empty(),
            CompositeMask::AS_CAPABLE | CompositeMask::SYNCED_TO_GM,
        );
        let counters = Counters::default();
        let mut state = EvaluatedState::default();

        for (as_capable, synced) in [(true, false), (true, true), (true, false)] {
            state = evaluate(&sub, &state, None, &ptp(0, as_capable, synced, [0; 8]), &counters, true);
        }
        assert_eq!(counters.composite.load(Ordering::SeqCst), 2);
        assert!(!state.composite_event);
    }

    #[test]
    fn composite_mask_zero_is_always_false() {
        let sub = subscription(EventMask::empty(), CompositeMask::empty());
        let counters = Counters::default();
        let state = evaluate(&sub, &EvaluatedState::default(), None, &ptp(0, true, true, [0; 8]), &counters, true);
        assert!(!state.composite_event);
    }

    #[test]
    fn gm_changed_first_notification_does_not_count() {
        let sub = subscription(EventMask::GM_CHANGED, CompositeMask::empty());
        let counters = Counters::default();
        let state = evaluate(&sub, &EvaluatedState::default(), None, &ptp(0, true, true, [1; 8]), &counters, true);
        assert!(!state.gm_changed);
        assert_eq!(counters.gm_changed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn gm_changed_detects_any_byte_difference() {
        let sub = subscription(EventMask::GM_CHANGED, CompositeMask::empty());
        let counters = Counters::default();
        let state = evaluate(
            &sub,
            &EvaluatedState::default(),
            Some([1, 2, 3, 4, 5, 6, 7, 8]),
            &ptp(0, true, true, [1, 2, 3, 4, 5, 6, 7, 9]),
            &counters,
            true,
        );
        assert!(state.gm_changed);
        assert_eq!(counters.gm_changed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gm_unchanged_does_not_bump_counter() {
        let sub = subscription(EventMask::GM_CHANGED, CompositeMask::empty());
        let counters = Counters::default();
        let gm = [9; 8];
        let state = evaluate(&sub, &EvaluatedState::default(), Some(gm), &ptp(0, true, true, gm), &counters, true);
        assert!(!state.gm_changed);
        assert_eq!(counters.gm_changed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn counters_saturate_at_u32_max() {
        let sub = subscription(EventMask::AS_CAPABLE, CompositeMask::empty());
        let counters = Counters::default();
        counters.as_capable.store(u32::MAX, Ordering::SeqCst);
        let mut state = EvaluatedState {
            as_capable: false,
            ..Default::default()
        };
        state = evaluate(&sub, &state, None, &ptp(0, true, true, [0; 8]), &counters, true);
        assert!(state.as_capable);
        assert_eq!(counters.as_capable.load(Ordering::SeqCst), u32::MAX);
    }

    #[test]
    fn drain_reads_and_zeroes() {
        let counters = Counters::default();
        counters.offset_in_range.store(3, Ordering::SeqCst);
        counters.gm_changed.store(1, Ordering::SeqCst);
        let drained = counters.drain();
        assert_eq!(drained.offset_in_range, 3);
        assert_eq!(drained.gm_changed, 1);
        assert_eq!(counters.total(), 0);
    }

    proptest! {
        /// The offset-in-range counter only ever advances by a run of
        /// offsets and never counts more transitions than there are
        /// adjacent pairs that cross the threshold boundary.
        #[test]
        fn offset_in_range_counter_never_exceeds_transition_count(offsets in proptest::collection::vec(-2000i64..2000i64, 1..20)) {
            let sub = subscription(EventMask::OFFSET_IN_RANGE, CompositeMask::empty());
            let counters = Counters::default();
            let mut state = EvaluatedState::default();
            let mut prev_in_range = None;
            let mut expected_transitions = 0u32;
            for (i, offset) in offsets.iter().enumerate() {
                let in_range = -1000 < *offset && *offset < 1000;
                if let Some(prev) = prev_in_range {
                    if prev != in_range {
                        expected_transitions += 1;
                    }
                }
                prev_in_range = Some(in_range);
                // The first notification establishes the baseline and is
                // never counted, matching the real subscribe/notify flow.
                state = evaluate(&sub, &state, None, &ptp(*offset, true, true, [0; 8]), &counters, i > 0);
            }
            prop_assert_eq!(counters.offset_in_range.load(Ordering::SeqCst), expected_transitions);
        }
    }
}
