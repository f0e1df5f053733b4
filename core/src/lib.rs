//! Wire protocol, codec, data model, and queue transport shared by the
//! clkmgr proxy and client. Both binaries depend on this crate so the
//! wire format and types can never drift between the two sides.

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod interval;
pub mod message;
pub mod timebase;
pub mod transport;

pub use error::ClkmgrError;
pub use events::{CompositeMask, EventMask};
pub use message::{AckKind, ConnectBody, Header, Message, MsgId, NotifyBody, SubscribeBody};
pub use timebase::{PtpSnapshot, SysSnapshot, Threshold, ThresholdKind, TimeBaseCfg, TimeBaseSnapshot};
