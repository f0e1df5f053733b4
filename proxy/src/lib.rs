//! Proxy-side library: session registry, per-time-base aggregator, and
//! the daemon monitor threads that feed it.

pub mod aggregator;
pub mod dispatch;
pub mod logging;
pub mod monitor;
pub mod session;

pub use aggregator::TimeBaseAggregator;
pub use dispatch::ProxyState;
pub use monitor::{DaemonMonitor, InitBarrier, PtpSource, SysClockSource};
pub use session::SessionRegistry;
