//! Bidirectional datagram transport over named kernel-managed message
//! queues (spec.md section 4.3).

pub mod queue;
pub mod registry;

pub use queue::{open_queue, MAX_CLIENT_COUNT, PROXY_QUEUE_NAME};
pub use registry::{Listener, ListenerRegistry, MessageHandler};

use crate::error::ClkmgrError;
use crate::message::Message;

/// The send half of a transport endpoint. Non-blocking: on `EAGAIN` or
/// an unreachable peer the call fails immediately rather than queuing,
/// which the proxy uses as its session-liveness signal.
pub trait Transport: Send + Sync {
    fn send(&self, msg: &Message) -> Result<(), ClkmgrError>;
}

/// A transport endpoint bound to a single named outbound queue (the
/// well-known proxy queue, or one client's inbound queue).
pub struct QueueTransport {
    mq: posixmq::PosixMq,
}

impl QueueTransport {
    /// Opens an existing queue for sending; does not create it — the
    /// receiving side is always the queue's owner.
    pub fn connect(name: &str) -> Result<Self, ClkmgrError> {
        Ok(QueueTransport {
            mq: open_queue(name, false, true)?,
        })
    }
}

impl Transport for QueueTransport {
    fn send(&self, msg: &Message) -> Result<(), ClkmgrError> {
        let bytes = msg.build()?;
        queue::send_nonblocking(&self.mq, &bytes)
    }
}
