//! Per-time-base latest-snapshot cache and subscriber fanout. Grounded
//! on the teacher's `im/daemon.rs` `OutboundHub<T>` (a `DashMap`-keyed
//! hub fanning work out to per-channel state), reworked from an async
//! per-channel send-daemon into a synchronous push-then-fanout under a
//! per-slot mutex, per spec.md section 4.5's explicit ordering
//! guarantee.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::warn;

use clkmgr_core::message::{Header, NotifyBody};
use clkmgr_core::timebase::{PtpSnapshot, SysSnapshot, TimeBaseSnapshot};
use clkmgr_core::Message;

use crate::session::SessionRegistry;

struct TimeBaseSlot {
    snapshot: Mutex<TimeBaseSnapshot>,
}

/// Holds the latest PTP and system snapshot per configured time base
/// and pushes `Notify` messages to every subscribed session whenever a
/// snapshot is replaced.
pub struct TimeBaseAggregator {
    slots: DashMap<u32, TimeBaseSlot>,
    sessions: Arc<SessionRegistry>,
}

impl TimeBaseAggregator {
    pub fn new(sessions: Arc<SessionRegistry>, time_base_indices: impl IntoIterator<Item = u32>) -> Self {
        let slots = DashMap::new();
        for index in time_base_indices {
            slots.insert(
                index,
                TimeBaseSlot {
                    snapshot: Mutex::new(TimeBaseSnapshot::default()),
                },
            );
        }
        TimeBaseAggregator { slots, sessions }
    }

    pub fn snapshot(&self, index: u32) -> Option<TimeBaseSnapshot> {
        self.slots.get(&index).map(|slot| *slot.snapshot.lock().unwrap())
    }

    pub fn known_index(&self, index: u32) -> bool {
        self.slots.contains_key(&index)
    }

    pub fn push_ptp(&self, index: u32, snap: PtpSnapshot) {
        self.push(index, |s| s.ptp = Some(snap));
    }

    pub fn push_sys(&self, index: u32, snap: SysSnapshot) {
        self.push(index, |s| s.sys = Some(snap));
    }

    /// Overwrites the slot and, while still holding its mutex, fans the
    /// new snapshot out to every subscriber — this is what gives a
    /// single session's notifications for one time base their
    /// serialized-in-acceptance-order guarantee; a second `push` for
    /// the same index blocks on this slot's mutex until fanout here
    /// finishes.
    fn push(&self, index: u32, mutate: impl FnOnce(&mut TimeBaseSnapshot)) {
        let Some(slot) = self.slots.get(&index) else {
            warn!("push for unconfigured time base {index}");
            return;
        };
        let mut guard = slot.snapshot.lock().unwrap();
        mutate(&mut guard);
        let snapshot = *guard;
        self.fanout(index, snapshot);
    }

    fn fanout(&self, index: u32, snapshot: TimeBaseSnapshot) {
        let mut failed = Vec::new();
        for session_id in self.sessions.subscribers_for(index) {
            let Some(transport) = self.sessions.get_transport(session_id) else {
                continue;
            };
            let msg = Message::Notify {
                header: Header::new(session_id, ""),
                body: NotifyBody {
                    time_base_index: index,
                    snapshot,
                },
            };
            if let Err(e) = transport.send(&msg) {
                warn!("notify send to session {session_id:#06x} failed: {e}");
                failed.push(session_id);
            }
        }
        for session_id in failed {
            self.sessions.remove(session_id);
        }
    }
}
