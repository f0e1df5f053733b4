//! The single owned value applications construct: `connect`,
//! `subscribe`, `statusWait`, `disconnect`, `getTime`, plus the
//! liveness probe. Replaces `original_source`'s `ClockManager` Meyers
//! singleton (spec.md section 9's first REDESIGN FLAG) with an
//! explicitly constructed value threaded through every call.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use clkmgr_core::events::COMPOSITE_LEGAL_BITS;
use clkmgr_core::message::{AckKind, ConnectBody, Header, SubscribeBody, INVALID_SESSION_ID};
use clkmgr_core::timebase::TimeBaseCfg;
use clkmgr_core::transport::{Listener, ListenerRegistry, QueueTransport, Transport, PROXY_QUEUE_NAME};
use clkmgr_core::Message;

use crate::error::ClientError;
use crate::liveness::{self, LivenessTracker, LIVENESS_WINDOW_MS};
use crate::state::{StatusSnapshot, TimeBaseRegistry, WaitResult, WaitTimeout};
use crate::subscription::Subscription;

/// `original_source/clkmgr/client/clockmanager.cpp`'s
/// `DEFAULT_CONNECT_TIME_OUT`.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// `original_source`'s `DEFAULT_SUBSCRIBE_TIME_OUT`.
const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A slot a background listener fills in once and a foreground caller
/// blocks on, used for the connect and subscribe reply rendezvous. One
/// instance per in-flight request, not a single condvar shared across
/// unrelated protocols.
struct ReplyWaiter<T> {
    slot: Mutex<Option<T>>,
    cv: Condvar,
}

impl<T> ReplyWaiter<T> {
    fn new() -> Self {
        ReplyWaiter {
            slot: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn set(&self, value: T) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(value);
        self.cv.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<T> {
        let mut slot = self.slot.lock().unwrap();
        let deadline = Instant::now() + timeout;
        while slot.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timed_out) = self.cv.wait_timeout(slot, deadline - now).unwrap();
            slot = guard;
        }
        slot.take()
    }
}

#[derive(Clone)]
struct ConnectReply {
    ack_kind: AckKind,
    session_id: u16,
    timebases: Vec<TimeBaseCfg>,
}

#[derive(Clone)]
struct SubscribeReply {
    ack_kind: AckKind,
    body: SubscribeBody,
}

/// The three outcomes spec.md sections 4.8 and 7 specify for
/// `statusWait`; a malformed argument never reaches this type and is
/// instead a distinct `Err(ClientError::InvalidArgument)` from the call
/// itself.
pub enum ClockStatus {
    EventDetected(StatusSnapshot),
    NoEventDetected(StatusSnapshot),
    LostConnection,
}

pub struct ClockManagerClient {
    client_id: String,
    session_id: AtomicU16,
    proxy_transport: QueueTransport,
    listener_registry: ListenerRegistry,
    registry: Arc<TimeBaseRegistry>,
    liveness: Arc<LivenessTracker>,
    connect_wait: Arc<ReplyWaiter<ConnectReply>>,
    subscribe_waits: Arc<DashMap<u32, Arc<ReplyWaiter<SubscribeReply>>>>,
    timebases: Mutex<Vec<TimeBaseCfg>>,
}

impl ClockManagerClient {
    /// Creates the client's own inbound queue (named by `client_id`)
    /// and starts its listener before opening the outbound handle to
    /// the proxy's well-known queue.
    pub fn new(client_id: impl Into<String>) -> Result<Self, ClientError> {
        let client_id = client_id.into();
        let registry = Arc::new(TimeBaseRegistry::new());
        let liveness = Arc::new(LivenessTracker::new());
        let connect_wait = Arc::new(ReplyWaiter::<ConnectReply>::new());
        let subscribe_waits: Arc<DashMap<u32, Arc<ReplyWaiter<SubscribeReply>>>> =
            Arc::new(DashMap::new());

        let h_registry = Arc::clone(&registry);
        let h_liveness = Arc::clone(&liveness);
        let h_connect_wait = Arc::clone(&connect_wait);
        let h_subscribe_waits = Arc::clone(&subscribe_waits);

        let listener = Listener::spawn(
            client_id.clone(),
            true,
            Box::new(move |msg| match msg {
                Message::Notify { body, .. } => {
                    let now = liveness::now_ns();
                    h_liveness.record(now);
                    let record = h_registry.ensure(body.time_base_index);
                    record.apply_notification(body.snapshot, now, true);
                }
                Message::Connect { header, body } => {
                    h_connect_wait.set(ConnectReply {
                        ack_kind: header.ack_kind,
                        session_id: header.session_id,
                        timebases: body.timebases,
                    });
                }
                Message::Subscribe { header, body } => {
                    if let Some(waiter) = h_subscribe_waits.get(&body.time_base_index) {
                        waiter.set(SubscribeReply {
                            ack_kind: header.ack_kind,
                            body,
                        });
                    }
                }
            }),
        )?;

        let listener_registry = ListenerRegistry::new();
        listener_registry.register(listener);

        let proxy_transport = QueueTransport::connect(PROXY_QUEUE_NAME)?;

        Ok(ClockManagerClient {
            client_id,
            session_id: AtomicU16::new(INVALID_SESSION_ID),
            proxy_transport,
            listener_registry,
            registry,
            liveness,
            connect_wait,
            subscribe_waits,
            timebases: Mutex::new(Vec::new()),
        })
    }

    pub fn timebases(&self) -> Vec<TimeBaseCfg> {
        self.timebases.lock().unwrap().clone()
    }

    fn session_id(&self) -> u16 {
        self.session_id.load(Ordering::Acquire)
    }

    /// Sends `Connect` and waits up to the default connect timeout for
    /// a reply bearing a fresh session id and the time-base table.
    pub fn connect(&self) -> Result<bool, ClientError> {
        let header = Header::new(INVALID_SESSION_ID, &self.client_id);
        let msg = Message::Connect {
            header,
            body: ConnectBody { timebases: Vec::new() },
        };
        self.proxy_transport.send(&msg)?;

        match self.connect_wait.wait(DEFAULT_CONNECT_TIMEOUT) {
            Some(reply) if reply.ack_kind == AckKind::Success => {
                self.session_id.store(reply.session_id, Ordering::Release);
                *self.timebases.lock().unwrap() = reply.timebases;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ClientError::LostConnection),
        }
    }

    /// Replaces the subscription, clears all counters, and sends the
    /// wire `Subscribe`; on success the proxy's snapshot is folded in
    /// as a baseline (no counters incremented).
    pub fn subscribe(&self, time_base_index: u32, subscription: Subscription) -> Result<bool, ClientError> {
        if self.session_id() == INVALID_SESSION_ID {
            return Err(ClientError::InvalidArgument("not connected".into()));
        }
        if !COMPOSITE_LEGAL_BITS.contains(subscription.composite_mask) {
            return Err(ClientError::InvalidArgument(format!(
                "composite mask {:?} contains bits illegal in a composite (e.g. GM_CHANGED)",
                subscription.composite_mask
            )));
        }

        let record = self.registry.ensure(time_base_index);
        record.set_subscription(subscription.clone());

        let waiter = Arc::new(ReplyWaiter::<SubscribeReply>::new());
        self.subscribe_waits.insert(time_base_index, Arc::clone(&waiter));

        let mut thresholds = Vec::new();
        if let Some(t) = subscription.gm_offset_threshold {
            thresholds.push(t);
        }
        if let Some(t) = subscription.sys_offset_threshold {
            thresholds.push(t);
        }

        let header = Header::new(self.session_id(), &self.client_id);
        let msg = Message::Subscribe {
            header,
            body: SubscribeBody {
                time_base_index,
                event_mask: subscription.event_mask,
                composite_mask: subscription.composite_mask,
                thresholds,
                snapshot: None,
            },
        };
        self.proxy_transport.send(&msg)?;

        let reply = waiter.wait(DEFAULT_SUBSCRIBE_TIMEOUT);
        self.subscribe_waits.remove(&time_base_index);

        match reply {
            Some(r) if r.ack_kind == AckKind::Success => {
                if let Some(snapshot) = r.body.snapshot {
                    record.apply_notification(snapshot, liveness::now_ns(), false);
                }
                Ok(true)
            }
            Some(_) => {
                record.clear_subscription();
                Ok(false)
            }
            None => {
                record.clear_subscription();
                Err(ClientError::LostConnection)
            }
        }
    }

    /// Trivially alive if a notification arrived within the liveness
    /// window; otherwise sends a zero-body `Connect` probe carrying the
    /// existing session id and waits up to the liveness window. Reuses
    /// `connect_wait` because the probe's reply is, on the wire, the
    /// same `Connect` ack a real connect waits for — not two unrelated
    /// protocols sharing one condvar.
    fn probe_liveness(&self) -> bool {
        let now = liveness::now_ns();
        if self.liveness.is_recent(now) {
            return true;
        }
        let session_id = self.session_id();
        if session_id == INVALID_SESSION_ID {
            return false;
        }
        let header = Header::new(session_id, &self.client_id);
        let msg = Message::Connect {
            header,
            body: ConnectBody { timebases: Vec::new() },
        };
        if self.proxy_transport.send(&msg).is_err() {
            return false;
        }
        match self
            .connect_wait
            .wait(Duration::from_millis(LIVENESS_WINDOW_MS as u64))
        {
            Some(reply) if reply.ack_kind == AckKind::Success => {
                self.liveness.record(liveness::now_ns());
                true
            }
            _ => false,
        }
    }

    /// `timeBaseIndex` unknown or not subscribed -> `InvalidArgument`.
    /// Dead proxy -> `ClockStatus::LostConnection`. Otherwise blocks up
    /// to `timeout` seconds (`0` polls once, negative waits forever)
    /// and always returns a populated snapshot, even on timeout.
    pub fn status_wait(&self, timeout_secs: i64, time_base_index: u32) -> Result<ClockStatus, ClientError> {
        let Some(record) = self.registry.get(time_base_index) else {
            return Err(ClientError::InvalidArgument(format!(
                "unknown timeBaseIndex {time_base_index}"
            )));
        };
        if !record.is_subscribed() {
            return Err(ClientError::InvalidArgument(format!(
                "not subscribed to timeBaseIndex {time_base_index}"
            )));
        }
        if !self.probe_liveness() {
            return Ok(ClockStatus::LostConnection);
        }

        let (result, status) = record.wait(WaitTimeout::from_seconds(timeout_secs));
        Ok(match result {
            WaitResult::EventDetected => ClockStatus::EventDetected(status),
            WaitResult::NoEventDetected => ClockStatus::NoEventDetected(status),
        })
    }

    /// The cached raw snapshot for a time base, independent of any
    /// subscription's derived booleans. Reads the snapshot only — unlike
    /// `status_wait`, this must never drain the transition counters, or
    /// a `getTime` call would silently eat events a following
    /// `status_wait` is owed.
    pub fn get_time(&self, time_base_index: u32) -> Option<clkmgr_core::timebase::TimeBaseSnapshot> {
        self.registry.get(time_base_index).map(|record| record.raw_snapshot())
    }

    pub fn disconnect(self) {
        self.listener_registry.stop_all();
        self.listener_registry.finalize_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_waiter_times_out_without_a_set() {
        let waiter: ReplyWaiter<u32> = ReplyWaiter::new();
        assert_eq!(waiter.wait(Duration::from_millis(20)), None);
    }

    #[test]
    fn reply_waiter_delivers_a_set_value() {
        let waiter = Arc::new(ReplyWaiter::<u32>::new());
        let setter = Arc::clone(&waiter);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            setter.set(42);
        });
        assert_eq!(waiter.wait(Duration::from_secs(1)), Some(42));
    }
}
