//! Turns a decoded request `Message` into a reply and the registry
//! side effects it implies. Kept as free functions operating on
//! `&ProxyState` rather than methods reaching into private fields of a
//! handler object, per spec.md section 9's REDESIGN FLAG against
//! "raw pointer friend classes used for handler field access".

use std::sync::Arc;

use log::{info, warn};

use clkmgr_core::message::{AckKind, ConnectBody, Header, SubscribeBody, INVALID_SESSION_ID};
use clkmgr_core::timebase::TimeBaseCfg;
use clkmgr_core::transport::{QueueTransport, Transport};
use clkmgr_core::Message;

use crate::aggregator::TimeBaseAggregator;
use crate::session::SessionRegistry;

/// Everything a dispatched request needs: the session table, the
/// per-time-base aggregator, and the static configuration handed out
/// on `Connect`.
pub struct ProxyState {
    pub sessions: Arc<SessionRegistry>,
    pub aggregator: Arc<TimeBaseAggregator>,
    pub timebases: Vec<TimeBaseCfg>,
}

/// Opens (without creating) the requesting client's inbound queue so
/// the reply can be sent back.
fn reply_transport(client_id: &str) -> Result<Arc<dyn Transport>, clkmgr_core::ClkmgrError> {
    Ok(Arc::new(QueueTransport::connect(client_id)?))
}

pub fn handle_connect(state: &ProxyState, header: &Header, _body: &ConnectBody) {
    let client_id = header.client_id_str();
    let transport = match reply_transport(&client_id) {
        Ok(t) => t,
        Err(e) => {
            warn!("connect from {client_id}: could not open reply queue: {e}");
            return;
        }
    };

    let session_id = state
        .sessions
        .connect(header.session_id, client_id.clone(), Arc::clone(&transport));

    let (ack_kind, timebases) = if session_id != INVALID_SESSION_ID {
        (AckKind::Success, state.timebases.clone())
    } else {
        (AckKind::Failure, Vec::new())
    };

    let reply = Message::Connect {
        header: Header {
            ack_kind,
            session_id,
            client_id: header.client_id,
        },
        body: ConnectBody { timebases },
    };
    if let Err(e) = transport.send(&reply) {
        warn!("connect reply to {client_id} failed: {e}");
    } else {
        info!("connect from {client_id} -> session {session_id:#06x} ({ack_kind:?})");
    }
}

pub fn handle_subscribe(state: &ProxyState, header: &Header, body: &SubscribeBody) {
    let client_id = header.client_id_str();
    let transport = match state.sessions.get_transport(header.session_id) {
        Some(t) => t,
        None => match reply_transport(&client_id) {
            Ok(t) => t,
            Err(e) => {
                warn!("subscribe from {client_id}: could not open reply queue: {e}");
                return;
            }
        },
    };

    let known = state.aggregator.known_index(body.time_base_index);
    let subscribed = known
        && state
            .sessions
            .subscribe(header.session_id, body.time_base_index)
            .is_ok();

    let (ack_kind, snapshot) = if subscribed {
        (AckKind::Success, state.aggregator.snapshot(body.time_base_index))
    } else {
        (AckKind::Failure, None)
    };

    let reply = Message::Subscribe {
        header: Header {
            ack_kind,
            session_id: header.session_id,
            client_id: header.client_id,
        },
        body: SubscribeBody {
            time_base_index: body.time_base_index,
            event_mask: body.event_mask,
            composite_mask: body.composite_mask,
            thresholds: Vec::new(),
            snapshot,
        },
    };
    if let Err(e) = transport.send(&reply) {
        warn!("subscribe reply to {client_id} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clkmgr_core::message::CLIENT_ID_LEN;
    use clkmgr_core::ClkmgrError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingTransport {
        replies: Mutex<Vec<Message>>,
        count: AtomicUsize,
    }

    impl Transport for RecordingTransport {
        fn send(&self, msg: &Message) -> Result<(), ClkmgrError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    fn header_with_session(session_id: u16) -> Header {
        Header {
            ack_kind: AckKind::None,
            session_id,
            client_id: [0u8; CLIENT_ID_LEN],
        }
    }

    #[test]
    fn subscribe_to_unknown_index_fails_without_mutating_state() {
        let sessions = Arc::new(SessionRegistry::new());
        let aggregator = Arc::new(TimeBaseAggregator::new(sessions.clone(), [1]));
        let transport = Arc::new(RecordingTransport {
            replies: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        let session_id = sessions.connect(INVALID_SESSION_ID, "c".into(), transport.clone());

        let state = ProxyState {
            sessions: sessions.clone(),
            aggregator,
            timebases: Vec::new(),
        };
        let header = header_with_session(session_id);
        let body = SubscribeBody {
            time_base_index: 99,
            event_mask: Default::default(),
            composite_mask: Default::default(),
            thresholds: Vec::new(),
            snapshot: None,
        };
        handle_subscribe(&state, &header, &body);

        assert_eq!(sessions.subscribers_for(99), Vec::<u16>::new());
        let replies = transport.replies.lock().unwrap();
        match &replies[0] {
            Message::Subscribe { header, .. } => assert_eq!(header.ack_kind, AckKind::Failure),
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
