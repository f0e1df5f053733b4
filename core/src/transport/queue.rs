//! Named POSIX message queue primitives. Grounded on
//! `original_source/clkmgr/common/msgq_tport.hpp`'s `Queue` class, which
//! wraps `mqueue.h` `mqd_t` handles; the direct Rust analogue is the
//! `posixmq` crate instead of a hand-rolled FFI binding.

use std::time::Duration;

use crate::codec::MAX_BUFFER_LEN;
use crate::error::ClkmgrError;

/// Queue depth, carried from spec.md section 4.3's `MAX_CLIENT_COUNT`.
pub const MAX_CLIENT_COUNT: usize = 8;

/// The well-known proxy-inbound queue name.
pub const PROXY_QUEUE_NAME: &str = "/clkmgr";

fn queue_error(context: &str, e: std::io::Error) -> ClkmgrError {
    ClkmgrError::QueueUnreachable(format!("{context}: {e}"))
}

/// Opens (creating if necessary) a message queue sized for clkmgr
/// datagrams. `nonblocking` must be set on handles `send_nonblocking`
/// will write through (`O_NONBLOCK` is what turns a full queue into an
/// immediate `EAGAIN` instead of a stall) and left unset on handles a
/// `Listener` polls with `recv_timeout`, whose timed receive is only
/// honored when the queue is opened blocking.
pub fn open_queue(name: &str, create: bool, nonblocking: bool) -> Result<posixmq::PosixMq, ClkmgrError> {
    let mut opts = posixmq::OpenOptions::readwrite();
    opts.max_msg_len(MAX_BUFFER_LEN).capacity(MAX_CLIENT_COUNT);
    if create {
        opts.create();
    }
    if nonblocking {
        opts.nonblocking();
    }
    opts.open(name)
        .map_err(|e| queue_error(&format!("opening queue {name}"), e))
}

/// Non-blocking send; callers treat `EAGAIN`/unreachable as the
/// transport's liveness signal per spec.md section 4.3. Requires `mq`
/// to have been opened via `open_queue(.., nonblocking: true)` —
/// otherwise this blocks on a full queue instead of failing.
pub fn send_nonblocking(mq: &posixmq::PosixMq, bytes: &[u8]) -> Result<(), ClkmgrError> {
    mq.send(0, bytes)
        .map_err(|e| ClkmgrError::TransportSend(e.to_string()))
}

/// Blocking-with-timeout receive, used by listener threads so they can
/// observe a `stop` request between polls instead of blocking forever.
pub fn recv_timeout(
    mq: &posixmq::PosixMq,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<Option<usize>, ClkmgrError> {
    match mq.recv_timeout(buf, timeout) {
        Ok((len, _priority)) => Ok(Some(len)),
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
        Err(e) => Err(ClkmgrError::TransportReceive(e.to_string())),
    }
}

/// Removes a queue's kernel-held name. The proxy is the unique creator
/// of its inbound queue and unlinks it on shutdown (spec.md section 5).
pub fn unlink_queue(name: &str) -> Result<(), ClkmgrError> {
    posixmq::remove_queue(name).map_err(|e| queue_error(&format!("unlinking queue {name}"), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_depth_matches_max_client_count() {
        assert_eq!(MAX_CLIENT_COUNT, 8);
    }
}
