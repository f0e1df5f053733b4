use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace: transport,
/// protocol, capacity, liveness, and argument failures, matching the
/// categories the wire protocol and the client facade need to distinguish.
#[derive(Debug, Error)]
pub enum ClkmgrError {
    #[error("transport send failed: {0}")]
    TransportSend(String),

    #[error("transport receive failed: {0}")]
    TransportReceive(String),

    #[error("queue unreachable: {0}")]
    QueueUnreachable(String),

    #[error("truncated datagram: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("buffer overflow: message would exceed {max} bytes")]
    BufferOverflow { max: usize },

    #[error("unknown msg_id {0}")]
    UnknownMsgId(u8),

    #[error("unknown ack_kind {0}")]
    UnknownAckKind(u8),

    #[error("invalid session_id {0:#06x}")]
    InvalidSessionId(u16),

    #[error("unknown timeBaseIndex {0}")]
    UnknownTimeBase(u32),

    #[error("invalid threshold: upper ({upper}) must be > lower ({lower})")]
    InvalidThreshold { upper: i32, lower: i32 },

    #[error("malformed field: {0}")]
    MalformedField(String),

    #[error("session table exhausted")]
    SessionTableExhausted,

    #[error("subscribe table full")]
    SubscribeTableFull,

    #[error("no notification within liveness window and probe timed out")]
    LivenessTimeout,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl ClkmgrError {
    /// Whether this error should be reported back to a peer as a
    /// `Failure` ack rather than silently dropped.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            ClkmgrError::UnknownMsgId(_)
                | ClkmgrError::UnknownAckKind(_)
                | ClkmgrError::InvalidSessionId(_)
                | ClkmgrError::UnknownTimeBase(_)
                | ClkmgrError::InvalidThreshold { .. }
                | ClkmgrError::MalformedField(_)
                | ClkmgrError::Truncated { .. }
        )
    }

    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            ClkmgrError::SessionTableExhausted | ClkmgrError::SubscribeTableFull
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_are_classified() {
        assert!(ClkmgrError::UnknownMsgId(7).is_protocol());
        assert!(!ClkmgrError::SessionTableExhausted.is_protocol());
    }

    #[test]
    fn capacity_errors_are_classified() {
        assert!(ClkmgrError::SubscribeTableFull.is_capacity());
        assert!(!ClkmgrError::LivenessTimeout.is_capacity());
    }
}
